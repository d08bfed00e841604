//! Concept rewriting
//!
//! Replaces every occurrence of a lexicon phrase with its joined form.
//!
//! Matching is whole-word: text is split into whitespace-delimited chunks,
//! each chunk's word core is compared case-insensitively against phrase
//! tokens, and a phrase may only continue across chunks that carry no
//! punctuation between them. All occurrences of all phrases are collected
//! with one trie walk per start position; candidates are then accepted in
//! lexicon rank order (ties by position), skipping any that overlap an
//! accepted match. This is the same result as replacing phrases one at a
//! time, longest first, over the progressively rewritten text.
//!
//! Joined forms of multi-word phrases contain `_`, which no lexicon token
//! built by [`ConceptLexicon::build`] does, so rewriting is idempotent.

mod clean;

pub use clean::{clean_text, tokenize, LINE_BREAK_MARKER};

use crate::corpus::Document;
use crate::lexicon::{word_core, ConceptLexicon, PhraseTrie};
use crate::phrases::MinedPhrases;

/// A word token located in the source text.
struct TextToken {
    /// Byte range of the word core
    start: usize,
    end: usize,
    lower: String,
    /// Punctuation sits between this token and the next one
    breaks_after: bool,
}

/// An accepted phrase occurrence over `len` tokens starting at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Match {
    start: usize,
    len: usize,
    rank: usize,
}

/// Result of rewriting a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub text: String,
    /// Surface form of each replaced phrase, in text order
    pub replaced: Vec<String>,
}

impl RewriteOutcome {
    pub fn changed(&self) -> bool {
        !self.replaced.is_empty()
    }
}

fn scan_tokens(text: &str) -> Vec<TextToken> {
    let mut tokens: Vec<TextToken> = Vec::new();
    let mut offset = 0;
    for chunk in text.split_inclusive(char::is_whitespace) {
        let base = offset;
        offset += chunk.len();
        let chunk = chunk.trim_end_matches(char::is_whitespace);
        if chunk.is_empty() {
            continue;
        }
        match word_core(chunk) {
            Some((s, e)) => {
                if s > 0 {
                    if let Some(prev) = tokens.last_mut() {
                        prev.breaks_after = true;
                    }
                }
                tokens.push(TextToken {
                    start: base + s,
                    end: base + e,
                    lower: chunk[s..e].to_lowercase(),
                    breaks_after: e < chunk.len(),
                });
            }
            None => {
                if let Some(prev) = tokens.last_mut() {
                    prev.breaks_after = true;
                }
            }
        }
    }
    tokens
}

/// Find the non-overlapping phrase occurrences to replace.
///
/// `joinable(i)` reports whether a phrase may continue from token `i` to
/// token `i + 1`.
fn select_matches<S, F>(lexicon: &ConceptLexicon, tokens: &[S], joinable: F) -> Vec<Match>
where
    S: AsRef<str>,
    F: Fn(usize) -> bool,
{
    if lexicon.is_empty() || tokens.is_empty() {
        return Vec::new();
    }
    let trie = lexicon.trie();
    let mut candidates = Vec::new();
    for start in 0..tokens.len() {
        let mut node = PhraseTrie::ROOT;
        let mut pos = start;
        while let Some(next) = trie.step(node, tokens[pos].as_ref()) {
            node = next;
            if let Some(rank) = trie.terminal(node) {
                candidates.push(Match {
                    start,
                    len: pos - start + 1,
                    rank,
                });
            }
            if pos + 1 >= tokens.len() || !joinable(pos) {
                break;
            }
            pos += 1;
        }
    }
    if candidates.is_empty() {
        return candidates;
    }

    candidates.sort_by_key(|m| (m.rank, m.start));
    let mut consumed = vec![false; tokens.len()];
    let mut accepted = Vec::new();
    for m in candidates {
        let span = m.start..m.start + m.len;
        if consumed[span.clone()].iter().any(|&c| c) {
            continue;
        }
        consumed[span].iter_mut().for_each(|c| *c = true);
        accepted.push(m);
    }
    accepted.sort_by_key(|m| m.start);
    accepted
}

/// Rewrite one piece of text against a lexicon.
pub fn rewrite_text(text: &str, lexicon: &ConceptLexicon) -> RewriteOutcome {
    let tokens = scan_tokens(text);
    let lowered: Vec<&str> = tokens.iter().map(|t| t.lower.as_str()).collect();
    let matches = select_matches(lexicon, &lowered, |i| !tokens[i].breaks_after);

    if matches.is_empty() {
        return RewriteOutcome {
            text: text.to_string(),
            replaced: Vec::new(),
        };
    }

    let mut out = String::with_capacity(text.len());
    let mut replaced = Vec::with_capacity(matches.len());
    let mut cursor = 0;
    for m in matches {
        let phrase = &lexicon.phrases()[m.rank];
        let start = tokens[m.start].start;
        let end = tokens[m.start + m.len - 1].end;
        out.push_str(&text[cursor..start]);
        out.push_str(phrase.joined_form());
        replaced.push(phrase.text().to_string());
        cursor = end;
    }
    out.push_str(&text[cursor..]);

    RewriteOutcome {
        text: out,
        replaced,
    }
}

/// Rewrite an already-tokenized sentence; every adjacent pair is joinable.
pub fn rewrite_tokens<S: AsRef<str>>(tokens: &[S], lexicon: &ConceptLexicon) -> Vec<String> {
    let lowered: Vec<String> = tokens.iter().map(|t| t.as_ref().to_lowercase()).collect();
    let matches = select_matches(lexicon, &lowered, |_| true);
    if matches.is_empty() {
        return tokens.iter().map(|t| t.as_ref().to_string()).collect();
    }

    let mut out = Vec::with_capacity(tokens.len());
    let mut cursor = 0;
    for m in matches {
        out.extend(tokens[cursor..m.start].iter().map(|t| t.as_ref().to_string()));
        out.push(lexicon.phrases()[m.rank].joined_form().to_string());
        cursor = m.start + m.len;
    }
    out.extend(tokens[cursor..].iter().map(|t| t.as_ref().to_string()));
    out
}

/// Rewrite a document's title and abstract independently.
pub fn rewrite(document: &Document, lexicon: &ConceptLexicon) -> Document {
    Document {
        id: document.id,
        title: rewrite_text(&document.title, lexicon).text,
        abstract_text: rewrite_text(&document.abstract_text, lexicon).text,
    }
}

/// A document together with the concepts replaced in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRewrite {
    pub document: Document,
    pub replaced: Vec<String>,
}

/// Applies the ontology lexicon, then each mined-phrase level, to documents.
///
/// Mined levels always run after the ontology pass and only see the text the
/// ontology pass produced.
#[derive(Debug, Clone)]
pub struct ConceptRewriter {
    ontology: ConceptLexicon,
    mined: Vec<ConceptLexicon>,
    clean: bool,
}

impl ConceptRewriter {
    pub fn new(ontology: ConceptLexicon) -> Self {
        Self {
            ontology,
            mined: Vec::new(),
            clean: false,
        }
    }

    /// Add mined phrase levels, applied in order after the ontology pass.
    pub fn with_mined(mut self, mined: MinedPhrases) -> Self {
        self.mined.extend(mined.into_levels());
        self
    }

    /// Run [`clean_text`] over each field before rewriting.
    pub fn with_cleaning(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    pub fn ontology(&self) -> &ConceptLexicon {
        &self.ontology
    }

    pub fn mined_levels(&self) -> usize {
        self.mined.len()
    }

    fn rewrite_field(&self, text: &str, replaced: &mut Vec<String>) -> String {
        let mut current = if self.clean {
            clean_text(text)
        } else {
            text.to_string()
        };
        for lexicon in std::iter::once(&self.ontology).chain(self.mined.iter()) {
            let outcome = rewrite_text(&current, lexicon);
            if outcome.changed() {
                replaced.extend(outcome.replaced);
                current = outcome.text;
            }
        }
        current
    }

    pub fn rewrite_document(&self, document: &Document) -> DocumentRewrite {
        let mut replaced = Vec::new();
        let title = self.rewrite_field(&document.title, &mut replaced);
        let abstract_text = self.rewrite_field(&document.abstract_text, &mut replaced);
        DocumentRewrite {
            document: Document {
                id: document.id,
                title,
                abstract_text,
            },
            replaced,
        }
    }
}
