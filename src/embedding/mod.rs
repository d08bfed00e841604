//! Embedding vector spaces
//!
//! Training is an external collaborator: anything that turns tokenized
//! sentences into a [`VectorSpace`] can stand behind [`EmbeddingTrainer`].
//! The linker only needs k-nearest-neighbor queries by cosine similarity.
//!
//! [`InMemoryVectorSpace`] is the brute-force implementation used for loaded
//! word2vec files and in tests. [`CooccurrenceTrainer`] is a small
//! count-based trainer for dry runs and fixtures.

pub mod word2vec;

use crate::corpus::SentenceSource;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io;
use std::sync::RwLock;

/// Error type for vector-space operations.
#[derive(Debug)]
pub enum EmbeddingError {
    /// The queried term is not in the vocabulary
    UnknownTerm(String),
    /// Backend query or training failed
    ModelError(String),
    /// A vector file could not be parsed
    Malformed { line: usize, reason: String },
    /// A vector's length differs from the space's dimension
    DimensionMismatch { expected: usize, found: usize },
    Io(io::Error),
}

impl fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingError::UnknownTerm(term) => write!(f, "term not in vocabulary: {}", term),
            EmbeddingError::ModelError(msg) => write!(f, "embedding model error: {}", msg),
            EmbeddingError::Malformed { line, reason } => {
                write!(f, "malformed vectors at line {}: {}", line, reason)
            }
            EmbeddingError::DimensionMismatch { expected, found } => write!(
                f,
                "vector dimension mismatch: expected {}, found {}",
                expected, found
            ),
            EmbeddingError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for EmbeddingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EmbeddingError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for EmbeddingError {
    fn from(e: io::Error) -> Self {
        EmbeddingError::Io(e)
    }
}

/// A vocabulary term near a query term.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub term: String,
    /// Cosine similarity to the query term
    pub similarity: f32,
}

impl Neighbor {
    pub fn new(term: impl Into<String>, similarity: f32) -> Self {
        Self {
            term: term.into(),
            similarity,
        }
    }
}

/// A trained vocabulary supporting nearest-neighbor queries.
pub trait VectorSpace: Send + Sync {
    /// Whether the term has a vector.
    fn contains(&self, term: &str) -> bool;

    /// The `k` terms most similar to `term`, most similar first.
    ///
    /// The term itself is never among its neighbors.
    fn nearest(&self, term: &str, k: usize) -> Result<Vec<Neighbor>, EmbeddingError>;

    /// All terms, in the space's own order.
    fn vocabulary(&self) -> Vec<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Something that trains a vector space from tokenized sentences.
pub trait EmbeddingTrainer {
    fn train(&self, corpus: &dyn SentenceSource) -> Result<InMemoryVectorSpace, EmbeddingError>;
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[derive(Default)]
struct Vectors {
    terms: Vec<String>,
    index: HashMap<String, usize>,
    vectors: Vec<Vec<f32>>,
    dimension: Option<usize>,
}

/// Brute-force in-memory vector space.
///
/// Thread-safe via RwLock. Neighbors with equal similarity are ordered by
/// term so queries are deterministic.
#[derive(Default)]
pub struct InMemoryVectorSpace {
    inner: RwLock<Vectors>,
}

impl InMemoryVectorSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a term's vector.
    ///
    /// The first vector fixes the space's dimension.
    pub fn insert(&self, term: impl Into<String>, vector: Vec<f32>) -> Result<(), EmbeddingError> {
        let term = term.into();
        let mut inner = self.inner.write().unwrap();
        match inner.dimension {
            Some(expected) if expected != vector.len() => {
                return Err(EmbeddingError::DimensionMismatch {
                    expected,
                    found: vector.len(),
                });
            }
            None => inner.dimension = Some(vector.len()),
            _ => {}
        }
        if let Some(&i) = inner.index.get(&term) {
            inner.vectors[i] = vector;
        } else {
            let i = inner.terms.len();
            inner.index.insert(term.clone(), i);
            inner.terms.push(term);
            inner.vectors.push(vector);
        }
        Ok(())
    }

    pub fn dimension(&self) -> Option<usize> {
        self.inner.read().unwrap().dimension
    }

    pub fn vector(&self, term: &str) -> Option<Vec<f32>> {
        let inner = self.inner.read().unwrap();
        inner.index.get(term).map(|&i| inner.vectors[i].clone())
    }

    /// Cosine similarity between two terms in the space.
    pub fn similarity(&self, a: &str, b: &str) -> Result<f32, EmbeddingError> {
        let inner = self.inner.read().unwrap();
        let lookup = |t: &str| {
            inner
                .index
                .get(t)
                .copied()
                .ok_or_else(|| EmbeddingError::UnknownTerm(t.to_string()))
        };
        let (ia, ib) = (lookup(a)?, lookup(b)?);
        Ok(cosine_similarity(&inner.vectors[ia], &inner.vectors[ib]))
    }
}

impl VectorSpace for InMemoryVectorSpace {
    fn contains(&self, term: &str) -> bool {
        self.inner.read().unwrap().index.contains_key(term)
    }

    fn nearest(&self, term: &str, k: usize) -> Result<Vec<Neighbor>, EmbeddingError> {
        let inner = self.inner.read().unwrap();
        let query = match inner.index.get(term) {
            Some(&i) => i,
            None => return Err(EmbeddingError::UnknownTerm(term.to_string())),
        };
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = &inner.vectors[query];
        let mut scored: Vec<(usize, f32)> = inner
            .vectors
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != query)
            .map(|(i, v)| (i, cosine_similarity(query_vec, v)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| inner.terms[a.0].cmp(&inner.terms[b.0]))
        });
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .map(|(i, sim)| Neighbor::new(inner.terms[i].clone(), sim))
            .collect())
    }

    fn vocabulary(&self) -> Vec<String> {
        self.inner.read().unwrap().terms.clone()
    }

    fn len(&self) -> usize {
        self.inner.read().unwrap().terms.len()
    }
}

/// Count-based trainer: a term's vector is its windowed co-occurrence
/// counts with every other vocabulary term.
///
/// Dimension equals vocabulary size, so this is only suitable for small
/// corpora.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooccurrenceTrainer {
    /// Tokens on each side counted as context
    pub window: usize,
    /// Terms seen fewer times are left out of the vocabulary
    pub min_count: u64,
}

impl Default for CooccurrenceTrainer {
    fn default() -> Self {
        Self {
            window: 2,
            min_count: 1,
        }
    }
}

impl EmbeddingTrainer for CooccurrenceTrainer {
    fn train(&self, corpus: &dyn SentenceSource) -> Result<InMemoryVectorSpace, EmbeddingError> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for sentence in corpus.sentences()? {
            for token in sentence? {
                *counts.entry(token).or_insert(0) += 1;
            }
        }
        let vocab: Vec<String> = counts
            .into_iter()
            .filter(|(_, c)| *c >= self.min_count)
            .map(|(t, _)| t)
            .collect();
        let index: HashMap<&str, usize> = vocab
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect();

        let mut matrix = vec![vec![0.0f32; vocab.len()]; vocab.len()];
        for sentence in corpus.sentences()? {
            let ids: Vec<Option<usize>> = sentence?
                .iter()
                .map(|t| index.get(t.as_str()).copied())
                .collect();
            for (pos, id) in ids.iter().enumerate() {
                let Some(row) = *id else { continue };
                let lo = pos.saturating_sub(self.window);
                let hi = (pos + self.window + 1).min(ids.len());
                for ctx in (lo..hi).filter(|&c| c != pos) {
                    if let Some(col) = ids[ctx] {
                        matrix[row][col] += 1.0;
                    }
                }
            }
        }

        let space = InMemoryVectorSpace::new();
        for (term, vector) in vocab.into_iter().zip(matrix) {
            space.insert(term, vector)?;
        }
        tracing::info!(terms = space.len(), "trained co-occurrence vectors");
        Ok(space)
    }
}
