//! Statistical phrase mining
//!
//! Mined phrases are a lower-priority supplement to the ontology: each level
//! becomes its own lexicon and is applied after the ontology pass. The
//! [`PhraseDetector`] trait is the seam; [`CollocationMiner`] is the
//! count-based detector used by the pipeline.
//!
//! A pair `a b` is a phrase when it occurs at least `min_count` times and
//!
//! ```text
//! (count(a b) - min_count) / (count(a) * count(b)) * vocab_size > threshold
//! ```
//!
//! where `vocab_size` counts distinct unigrams and bigrams. Level `n` is mined
//! over sentences already joined by levels `0..n`, so level 1 finds trigrams
//! such as `neural_network training`.

use crate::corpus::SentenceSource;
use crate::lexicon::ConceptLexicon;
use crate::rewrite::rewrite_tokens;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while mining or persisting phrases.
#[derive(Debug, Error)]
pub enum PhraseError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for phrase operations
pub type PhraseResult<T> = Result<T, PhraseError>;

/// Something that proposes multi-word phrases from tokenized sentences.
pub trait PhraseDetector {
    fn detect(&self, corpus: &dyn SentenceSource) -> PhraseResult<MinedPhrases>;
}

/// Mined phrase levels, applied in order after the ontology pass.
#[derive(Debug, Clone, Default)]
pub struct MinedPhrases {
    levels: Vec<ConceptLexicon>,
}

/// On-disk form: one list of token sequences per level.
#[derive(Debug, Serialize, Deserialize)]
struct MinedPhrasesFile {
    levels: Vec<Vec<Vec<String>>>,
}

impl MinedPhrases {
    pub fn from_levels(levels: Vec<ConceptLexicon>) -> Self {
        Self { levels }
    }

    pub fn levels(&self) -> &[ConceptLexicon] {
        &self.levels
    }

    pub fn into_levels(self) -> Vec<ConceptLexicon> {
        self.levels
    }

    /// Total phrases across levels.
    pub fn len(&self) -> usize {
        self.levels.iter().map(ConceptLexicon::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply every level to a tokenized sentence.
    pub fn apply(&self, tokens: &[String]) -> Vec<String> {
        let mut current = tokens.to_vec();
        for level in &self.levels {
            current = rewrite_tokens(&current, level);
        }
        current
    }

    pub fn save(&self, path: &Path) -> PhraseResult<()> {
        let file = MinedPhrasesFile {
            levels: self
                .levels
                .iter()
                .map(|level| level.iter().map(|p| p.tokens().to_vec()).collect())
                .collect(),
        };
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> PhraseResult<Self> {
        let file: MinedPhrasesFile = serde_json::from_str(&fs::read_to_string(path)?)?;
        Ok(Self {
            levels: file
                .levels
                .into_iter()
                .map(ConceptLexicon::from_token_sequences)
                .collect(),
        })
    }
}

/// Count-based bigram collocation detector, run for several levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollocationMiner {
    pub min_count: u64,
    pub threshold: f64,
    pub levels: usize,
}

impl Default for CollocationMiner {
    fn default() -> Self {
        Self {
            min_count: 5,
            threshold: 10.0,
            levels: 2,
        }
    }
}

#[derive(Default)]
struct PairCounts {
    unigrams: HashMap<String, u64>,
    bigrams: HashMap<(String, String), u64>,
}

impl PairCounts {
    fn observe(&mut self, tokens: &[String]) {
        for token in tokens {
            *self.unigrams.entry(token.clone()).or_insert(0) += 1;
        }
        for pair in tokens.windows(2) {
            *self
                .bigrams
                .entry((pair[0].clone(), pair[1].clone()))
                .or_insert(0) += 1;
        }
    }
}

impl CollocationMiner {
    pub fn new(min_count: u64, threshold: f64, levels: usize) -> Self {
        Self {
            min_count,
            threshold,
            levels,
        }
    }

    /// Collocation score of a pair; `None` when below `min_count`.
    pub fn score(&self, pair_count: u64, a_count: u64, b_count: u64, vocab_size: usize) -> Option<f64> {
        if pair_count < self.min_count || a_count == 0 || b_count == 0 {
            return None;
        }
        let score = (pair_count - self.min_count) as f64 / (a_count as f64 * b_count as f64)
            * vocab_size as f64;
        Some(score)
    }

    fn mine_level(&self, counts: &PairCounts) -> ConceptLexicon {
        let vocab_size = counts.unigrams.len() + counts.bigrams.len();
        let mut accepted: Vec<(&(String, String), f64)> = counts
            .bigrams
            .iter()
            .filter_map(|(pair, &count)| {
                let a = counts.unigrams.get(&pair.0).copied().unwrap_or(0);
                let b = counts.unigrams.get(&pair.1).copied().unwrap_or(0);
                self.score(count, a, b, vocab_size)
                    .filter(|s| *s > self.threshold)
                    .map(|s| (pair, s))
            })
            .collect();
        accepted.sort_by(|x, y| y.1.total_cmp(&x.1).then_with(|| x.0.cmp(y.0)));
        ConceptLexicon::from_token_sequences(
            accepted
                .into_iter()
                .map(|((a, b), _)| [a.as_str(), b.as_str()]),
        )
    }
}

impl PhraseDetector for CollocationMiner {
    fn detect(&self, corpus: &dyn SentenceSource) -> PhraseResult<MinedPhrases> {
        let mut mined = MinedPhrases::default();
        for level in 0..self.levels {
            let mut counts = PairCounts::default();
            let mut sentences = 0usize;
            for sentence in corpus.sentences()? {
                counts.observe(&mined.apply(&sentence?));
                sentences += 1;
            }
            let lexicon = self.mine_level(&counts);
            tracing::info!(
                level,
                sentences,
                phrases = lexicon.len(),
                "mined collocation level"
            );
            if lexicon.is_empty() {
                break;
            }
            mined.levels.push(lexicon);
        }
        Ok(mined)
    }
}
