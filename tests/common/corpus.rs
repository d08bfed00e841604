//! Corpus and lexicon fixtures
//!
//! Writes small paired-lines corpora and label files into temp directories
//! and generates seeded random text over a fixed word list.

use conceptlink::{ConceptLexicon, CorpusSource, Document};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};

/// Words drawn for random text. Several are prefixes or parts of the
/// phrases in [`PHRASE_POOL`].
pub const WORDS: &[&str] = &[
    "large", "language", "models", "web", "search", "webinar", "computer", "science", "neural",
    "network", "networks", "deep", "learning", "the", "a", "of", "semantic",
];

/// Candidate concept phrases, overlapping on purpose.
pub const PHRASE_POOL: &[&str] = &[
    "large language models",
    "language models",
    "web",
    "web search",
    "semantic web",
    "computer science",
    "neural network",
    "deep learning",
    "learning",
    "science",
    "a a",
    "models web",
];

/// Deterministic generator for property tests.
pub fn seeded(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn lexicon(phrases: &[&str]) -> ConceptLexicon {
    ConceptLexicon::build(phrases.iter().copied()).lexicon
}

/// A lexicon over a random non-empty subset of [`PHRASE_POOL`].
pub fn random_lexicon(rng: &mut StdRng) -> ConceptLexicon {
    let count = rng.gen_range(1..=PHRASE_POOL.len());
    let phrases: Vec<&str> = PHRASE_POOL.choose_multiple(rng, count).copied().collect();
    lexicon(&phrases)
}

/// Lowercase words from [`WORDS`] separated by single spaces.
pub fn random_words(rng: &mut StdRng, max_words: usize) -> String {
    let count = rng.gen_range(0..=max_words);
    (0..count)
        .map(|_| *WORDS.choose(rng).unwrap_or(&"the"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Like [`random_words`] but with mixed case and punctuation attached to
/// some words.
pub fn random_prose(rng: &mut StdRng, max_words: usize) -> String {
    const MARKS: &[&str] = &[",", ".", ";", ")", "!"];
    let count = rng.gen_range(0..=max_words);
    let mut words = Vec::with_capacity(count);
    for _ in 0..count {
        let mut word = WORDS.choose(rng).unwrap_or(&"the").to_string();
        if rng.gen_bool(0.2) {
            word = word.to_uppercase();
        }
        if rng.gen_bool(0.1) {
            word = format!("({}", word);
        }
        if rng.gen_bool(0.15) {
            word.push_str(MARKS.choose(rng).unwrap_or(&","));
        }
        words.push(word);
    }
    words.join(" ")
}

pub fn random_documents(rng: &mut StdRng, count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| Document::new(i as u64, random_words(rng, 4), random_words(rng, 20)))
        .collect()
}

/// Write documents as title/abstract line pairs.
pub fn write_paired_corpus(dir: &Path, documents: &[Document]) -> CorpusSource {
    let path = dir.join("abstracts.txt");
    let mut text = String::new();
    for doc in documents {
        text.push_str(&doc.title);
        text.push('\n');
        text.push_str(&doc.abstract_text);
        text.push('\n');
    }
    fs::write(&path, text).unwrap();
    CorpusSource::paired_lines(path)
}

/// Write a single-column label CSV with a header row.
pub fn write_labels(dir: &Path, labels: &[&str]) -> PathBuf {
    let path = dir.join("labels.csv");
    let mut text = String::from("Label\n");
    for label in labels {
        text.push_str(&format!("\"{}\"\n", label));
    }
    fs::write(&path, text).unwrap();
    path
}
