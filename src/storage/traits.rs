//! Link cache trait definitions

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted entry could not be decoded or violates an entry invariant.
    /// Only the named term is affected.
    #[error("corrupt cache entry for {term:?}: {reason}")]
    Corrupt { term: String, reason: String },
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// An accepted association between a vocabulary term and a concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Concept surface form, as in the lexicon
    pub concept: String,
    /// Normalized string similarity in `[0, 1]`
    pub score: f64,
    /// Neighbor term whose string matched the concept
    #[serde(default)]
    pub via: String,
    /// Embedding similarity between the term and `via`
    #[serde(default)]
    pub via_similarity: f32,
}

impl Link {
    pub fn new(concept: impl Into<String>, score: f64) -> Self {
        Self {
            concept: concept.into(),
            score,
            via: String::new(),
            via_similarity: 0.0,
        }
    }

    pub fn with_via(mut self, via: impl Into<String>, similarity: f32) -> Self {
        self.via = via.into();
        self.via_similarity = similarity;
        self
    }
}

/// Cached links for one vocabulary term, best first.
///
/// An empty `links` list is a valid, cached result: nothing passed the
/// thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkCacheEntry {
    pub term: String,
    pub links: Vec<Link>,
}

impl LinkCacheEntry {
    pub fn new(term: impl Into<String>, links: Vec<Link>) -> Self {
        Self {
            term: term.into(),
            links,
        }
    }

    pub fn empty(term: impl Into<String>) -> Self {
        Self::new(term, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Concepts in link order.
    pub fn concepts(&self) -> impl Iterator<Item = &str> {
        self.links.iter().map(|l| l.concept.as_str())
    }

    /// Check the invariants a stored entry must satisfy: scores in `[0, 1]`,
    /// sorted descending, one link per concept.
    pub fn validate(&self) -> CacheResult<()> {
        let corrupt = |reason: String| CacheError::Corrupt {
            term: self.term.clone(),
            reason,
        };
        let mut seen = std::collections::HashSet::new();
        for (i, link) in self.links.iter().enumerate() {
            if link.concept.is_empty() {
                return Err(corrupt(format!("link {} has an empty concept", i)));
            }
            if !(0.0..=1.0).contains(&link.score) {
                return Err(corrupt(format!("link {} score {} out of range", i, link.score)));
            }
            if !seen.insert(link.concept.as_str()) {
                return Err(corrupt(format!("duplicate concept {:?}", link.concept)));
            }
            if i > 0 && self.links[i - 1].score < link.score {
                return Err(corrupt("links not sorted by score".to_string()));
            }
        }
        Ok(())
    }
}

/// Trait for link cache backends
///
/// Keyed uniquely by term. Implementations must be thread-safe
/// (Send + Sync); writes to distinct terms may interleave freely.
pub trait LinkCache: Send + Sync {
    /// Load the entry for a term.
    ///
    /// Returns [`CacheError::Corrupt`] when the stored entry cannot be used;
    /// other entries stay readable.
    fn get(&self, term: &str) -> CacheResult<Option<LinkCacheEntry>>;

    /// Insert or replace an entry, durably.
    fn put(&self, entry: &LinkCacheEntry) -> CacheResult<()>;

    /// Drop one term so it is recomputed; returns whether it was present.
    fn invalidate(&self, term: &str) -> CacheResult<bool>;

    /// Drop every entry; returns how many were removed.
    fn clear(&self) -> CacheResult<usize>;

    /// All cached terms, sorted.
    fn terms(&self) -> CacheResult<Vec<String>>;

    fn len(&self) -> CacheResult<usize>;

    fn contains(&self, term: &str) -> CacheResult<bool> {
        Ok(self.terms()?.binary_search_by(|t| t.as_str().cmp(term)).is_ok())
    }
}

/// Extension trait for opening caches from paths
pub trait OpenCache: LinkCache + Sized {
    /// Open or create a cache at the given path
    fn open(path: impl AsRef<Path>) -> CacheResult<Self>;

    /// Create an in-memory cache (useful for testing)
    fn open_in_memory() -> CacheResult<Self>;
}
