//! Text cleaning and token stripping applied around the rewrite pass

use crate::lexicon::is_word_char;
use std::borrow::Cow;

/// Line-break placeholder found in exported abstracts.
pub const LINE_BREAK_MARKER: &str = "#r##n##r##n#";

/// Characters stripped from both ends of every token by [`tokenize`].
const TOKEN_STRIP: &[char] = &[',', '.', '"', '!', '?', ':', ';', '(', ')', '\''];

/// Normalize raw corpus text before concept rewriting.
///
/// Literal `\uXXXX` escapes are decoded, every character other than word
/// characters, whitespace and `-` becomes a space, whitespace is collapsed,
/// and [`LINE_BREAK_MARKER`] turns into a newline.
pub fn clean_text(text: &str) -> String {
    let decoded = decode_unicode_escapes(text);
    decoded
        .split(LINE_BREAK_MARKER)
        .map(clean_segment)
        .collect::<Vec<_>>()
        .join("\n")
}

fn clean_segment(segment: &str) -> String {
    let replaced: String = segment
        .chars()
        .map(|c| {
            if is_word_char(c) || c.is_whitespace() || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_unicode_escapes(text: &str) -> Cow<'_, str> {
    if !text.contains("\\u") {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("\\u") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        let decoded = after
            .get(..4)
            .filter(|hex| hex.chars().all(|c| c.is_ascii_hexdigit()))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32);
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &after[4..];
            }
            None => {
                out.push_str("\\u");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Split a line into lowercase tokens for embedding training.
pub fn tokenize(line: &str) -> Vec<String> {
    line.to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(TOKEN_STRIP))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}
