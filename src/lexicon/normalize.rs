//! Token normalization shared by the lexicon and the rewriter

/// Characters that belong to a word: alphanumerics and the joiner `_`.
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Normalize a raw concept label into lowercase tokens.
///
/// Underscores count as whitespace so a label can never produce a token that
/// looks like an already-joined form. Each token loses its leading and
/// trailing non-alphanumeric characters; tokens left empty are dropped.
pub fn normalize_tokens(raw: &str) -> Vec<String> {
    raw.to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '_')
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalize one already-tokenized token, such as a mined collocation part.
///
/// Only case changes: inner and boundary punctuation are kept so the token
/// still equals what the tokenizer produced. Returns `None` for tokens that
/// are empty, contain whitespace, or hold no word character.
pub fn normalize_token(token: &str) -> Option<String> {
    if token.is_empty() || token.contains(char::is_whitespace) || !token.contains(is_word_char) {
        return None;
    }
    Some(token.to_lowercase())
}

/// Byte range of the word core inside a whitespace-delimited chunk.
///
/// Returns `None` for chunks made entirely of punctuation.
pub fn word_core(chunk: &str) -> Option<(usize, usize)> {
    let start = chunk.find(is_word_char)?;
    let end = chunk
        .char_indices()
        .rev()
        .find(|(_, c)| is_word_char(*c))
        .map(|(i, c)| i + c.len_utf8())?;
    Some((start, end))
}
