//! Concept lexicon
//!
//! The lexicon is built once per run from raw ontology labels and is immutable
//! afterwards. Phrases are normalized (lowercase, whitespace-collapsed,
//! boundary punctuation stripped), deduplicated, and ranked by descending
//! token count so that "large language models" always outranks
//! "language models".

mod normalize;
mod trie;

pub use normalize::{is_word_char, normalize_token, normalize_tokens, word_core};
pub use trie::{NodeIndex, PhraseTrie};

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Errors raised while building a lexicon.
///
/// These are never fatal to a build: rejected phrases are collected in
/// [`LexiconBuild::rejected`] and counted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexiconError {
    #[error("phrase normalizes to an empty string: {raw:?}")]
    InvalidPhrase { raw: String },
}

/// Underscore-concatenated single-token rendering of a phrase.
pub fn joined_form<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("_")
}

/// A normalized concept phrase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Phrase {
    tokens: Vec<String>,
    joined: String,
    text: String,
    char_len: usize,
}

impl Phrase {
    fn from_tokens(tokens: Vec<String>) -> Self {
        let joined = joined_form(&tokens);
        let text = tokens.join(" ");
        let char_len = text.chars().count();
        Self {
            tokens,
            joined,
            text,
            char_len,
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// The single-token form written into rewritten text.
    pub fn joined_form(&self) -> &str {
        &self.joined
    }

    /// Space-separated surface form.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of [`Phrase::text`] in characters.
    pub fn char_len(&self) -> usize {
        self.char_len
    }

    /// Lexicon order: more tokens first, then longer text, then lexical.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .token_count()
            .cmp(&self.token_count())
            .then_with(|| other.char_len.cmp(&self.char_len))
            .then_with(|| self.text.cmp(&other.text))
    }
}

/// Outcome of [`ConceptLexicon::build`].
#[derive(Debug, Clone)]
pub struct LexiconBuild {
    pub lexicon: ConceptLexicon,
    /// Raw phrases that normalized to nothing
    pub rejected: Vec<LexiconError>,
    /// Raw phrases that normalized onto an already-seen phrase
    pub duplicates: usize,
}

impl LexiconBuild {
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

/// Normalized, deduplicated, rank-ordered set of concept phrases.
///
/// Index `i` in [`ConceptLexicon::phrases`] is the phrase's rank: lower ranks
/// are matched first.
#[derive(Debug, Clone, Default)]
pub struct ConceptLexicon {
    phrases: Vec<Phrase>,
    trie: PhraseTrie,
}

impl ConceptLexicon {
    /// Build a lexicon from raw ontology labels.
    pub fn build<I, S>(raw_phrases: I) -> LexiconBuild
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rejected = Vec::new();
        let mut seen = HashSet::new();
        let mut duplicates = 0;
        let mut phrases = Vec::new();

        for raw in raw_phrases {
            let raw = raw.as_ref();
            let tokens = normalize_tokens(raw);
            if tokens.is_empty() {
                rejected.push(LexiconError::InvalidPhrase {
                    raw: raw.to_string(),
                });
                continue;
            }
            let phrase = Phrase::from_tokens(tokens);
            if seen.insert(phrase.text.clone()) {
                phrases.push(phrase);
            } else {
                duplicates += 1;
            }
        }

        if !rejected.is_empty() {
            tracing::warn!(rejected = rejected.len(), "skipped empty concept phrases");
        }

        let lexicon = Self::from_phrases(phrases);
        tracing::debug!(
            phrases = lexicon.len(),
            duplicates,
            "built concept lexicon"
        );

        LexiconBuild {
            lexicon,
            rejected,
            duplicates,
        }
    }

    /// Build a lexicon from pre-tokenized phrases, e.g. mined collocations.
    ///
    /// Unlike [`ConceptLexicon::build`], tokens are only lowercased: they keep
    /// their `_` joiners and inner punctuation so a phrase matches the tokens
    /// it was mined from. A sequence with any unusable token is dropped whole.
    pub fn from_token_sequences<I, T, S>(sequences: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let phrases = sequences
            .into_iter()
            .filter_map(|seq| {
                seq.into_iter()
                    .map(|t| normalize_token(t.as_ref()))
                    .collect::<Option<Vec<_>>>()
            })
            .filter(|tokens| !tokens.is_empty())
            .map(Phrase::from_tokens)
            .filter(|p| seen.insert(p.text.clone()))
            .collect();
        Self::from_phrases(phrases)
    }

    fn from_phrases(mut phrases: Vec<Phrase>) -> Self {
        phrases.sort_by(Phrase::rank_cmp);
        let mut trie = PhraseTrie::new();
        for (rank, phrase) in phrases.iter().enumerate() {
            trie.insert(&phrase.tokens, rank);
        }
        Self { phrases, trie }
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Phrases in rank order.
    pub fn phrases(&self) -> &[Phrase] {
        &self.phrases
    }

    pub fn get(&self, rank: usize) -> Option<&Phrase> {
        self.phrases.get(rank)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Phrase> {
        self.phrases.iter()
    }

    /// Whether a raw label normalizes onto a phrase in this lexicon.
    pub fn contains(&self, raw: &str) -> bool {
        self.rank_of(raw).is_some()
    }

    /// Rank of the phrase a raw label normalizes onto.
    pub fn rank_of(&self, raw: &str) -> Option<usize> {
        let tokens = normalize_tokens(raw);
        if tokens.is_empty() {
            return None;
        }
        let mut node = PhraseTrie::ROOT;
        for token in &tokens {
            node = self.trie.step(node, token)?;
        }
        self.trie.terminal(node)
    }

    /// Largest token count of any phrase.
    pub fn max_tokens(&self) -> usize {
        self.phrases.first().map_or(0, Phrase::token_count)
    }

    pub(crate) fn trie(&self) -> &PhraseTrie {
        &self.trie
    }
}

/// Read ontology labels, one per line.
///
/// Accepts a single-column CSV with an optional `Label` header. One pair of
/// surrounding quotes is removed and `""` unescaped; blank lines are skipped.
/// Labels with embedded newlines are not supported: each physical line is
/// read as its own label.
pub fn read_labels(path: impl AsRef<Path>) -> io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut labels = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let field = line.trim();
        let label = match field.strip_prefix('"').and_then(|f| f.strip_suffix('"')) {
            Some(quoted) => quoted.replace("\"\"", "\""),
            None => field.to_string(),
        };
        let label = label.trim();
        if label.is_empty() || (i == 0 && label.eq_ignore_ascii_case("label")) {
            continue;
        }
        labels.push(label.to_string());
    }
    Ok(labels)
}
