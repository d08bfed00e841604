//! Vocabulary–ontology linking
//!
//! A vocabulary term is linked to ontology concepts in two cheap filtering
//! stages: its embedding-space neighbors above `embedding_threshold`, then
//! for each neighbor the closest concept by normalized edit distance above
//! `string_threshold`. Only neighbors are ever compared against the
//! lexicon.
//!
//! Results go through a [`LinkCache`]: a cached term is returned as stored
//! and never recomputed. A corrupt cached entry is dropped and recomputed
//! for that term only. Query failures are not cached, so the term is retried
//! on the next run.

mod similarity;

pub use similarity::{best_concept, string_similarity, surface_form};

use crate::embedding::{EmbeddingError, Neighbor, VectorSpace};
use crate::lexicon::ConceptLexicon;
use crate::storage::{CacheError, Link, LinkCache, LinkCacheEntry};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Errors that can occur while linking a single term
#[derive(Debug, Error)]
pub enum LinkingError {
    #[error("vector-space query failed for {term:?}: {reason}")]
    Query { term: String, reason: String },

    #[error("term not in vector space: {0}")]
    UnknownTerm(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Result type for linking operations
pub type LinkingResult<T> = Result<T, LinkingError>;

/// Linking thresholds and limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Neighbors requested per term (`k`)
    pub neighbors: usize,
    /// Minimum cosine similarity for a neighbor to be considered
    pub embedding_threshold: f32,
    /// Minimum string similarity for a concept to be accepted
    pub string_threshold: f64,
    /// Also compare the term itself, as a neighbor at similarity 1.0
    pub include_self: bool,
    /// Log progress every this many terms
    pub progress_every: usize,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            neighbors: 10,
            embedding_threshold: 0.7,
            string_threshold: 0.9,
            include_self: true,
            progress_every: 1000,
        }
    }
}

/// How a term's entry was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Returned from the cache
    Hit,
    /// Computed and stored
    Computed,
    /// Cached entry was corrupt; recomputed and stored
    Recovered,
}

fn query_error(term: &str, e: EmbeddingError) -> LinkingError {
    match e {
        EmbeddingError::UnknownTerm(t) => LinkingError::UnknownTerm(t),
        other => LinkingError::Query {
            term: term.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Compute links for a term without consulting any cache.
pub fn compute_links(
    term: &str,
    space: &dyn VectorSpace,
    lexicon: &ConceptLexicon,
    config: &LinkerConfig,
) -> LinkingResult<Vec<Link>> {
    let mut neighbors = Vec::with_capacity(config.neighbors + 1);
    if config.include_self {
        if !space.contains(term) {
            return Err(LinkingError::UnknownTerm(term.to_string()));
        }
        neighbors.push(Neighbor::new(term, 1.0));
    }
    let found = space
        .nearest(term, config.neighbors)
        .map_err(|e| query_error(term, e))?;
    neighbors.extend(
        found
            .into_iter()
            .filter(|n| n.similarity >= config.embedding_threshold),
    );

    // concept text -> (token count, link)
    let mut best: HashMap<&str, (usize, Link)> = HashMap::new();
    for neighbor in &neighbors {
        let query = surface_form(&neighbor.term);
        let Some((phrase, score)) = best_concept(&query, lexicon, config.string_threshold) else {
            continue;
        };
        let candidate =
            Link::new(phrase.text(), score).with_via(neighbor.term.clone(), neighbor.similarity);
        match best.get_mut(phrase.text()) {
            Some((_, kept)) => {
                if score > kept.score
                    || (score == kept.score && neighbor.similarity > kept.via_similarity)
                {
                    *kept = candidate;
                }
            }
            None => {
                best.insert(phrase.text(), (phrase.token_count(), candidate));
            }
        }
    }

    let mut ranked: Vec<(usize, Link)> = best.into_values().collect();
    ranked.sort_by(|(ta, a), (tb, b)| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| ta.cmp(tb))
            .then_with(|| a.concept.cmp(&b.concept))
    });
    Ok(ranked.into_iter().map(|(_, link)| link).collect())
}

fn resolve(
    term: &str,
    space: &dyn VectorSpace,
    lexicon: &ConceptLexicon,
    cache: &dyn LinkCache,
    config: &LinkerConfig,
) -> LinkingResult<(LinkCacheEntry, Resolution)> {
    let resolution = match cache.get(term) {
        Ok(Some(entry)) => return Ok((entry, Resolution::Hit)),
        Ok(None) => Resolution::Computed,
        Err(CacheError::Corrupt { reason, .. }) => {
            tracing::warn!(term = %term, reason = %reason, "recomputing corrupt cache entry");
            cache.invalidate(term)?;
            Resolution::Recovered
        }
        Err(e) => return Err(e.into()),
    };

    let links = compute_links(term, space, lexicon, config)?;
    let entry = LinkCacheEntry::new(term, links);
    cache.put(&entry)?;
    Ok((entry, resolution))
}

/// Link one term, consulting and updating the cache.
pub fn link(
    term: &str,
    space: &dyn VectorSpace,
    lexicon: &ConceptLexicon,
    cache: &dyn LinkCache,
    config: &LinkerConfig,
) -> LinkingResult<LinkCacheEntry> {
    resolve(term, space, lexicon, cache, config).map(|(entry, _)| entry)
}

/// Counters for a linker's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub hits: usize,
    pub computed: usize,
    pub recovered: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Counters {
    hits: AtomicUsize,
    computed: AtomicUsize,
    recovered: AtomicUsize,
    failed: AtomicUsize,
}

/// Outcome of [`Linker::link_all`].
#[derive(Debug, Clone, Default)]
pub struct LinkReport {
    /// One entry per input term, in input order. Failed terms have an empty
    /// entry that was not cached.
    pub entries: Vec<LinkCacheEntry>,
    /// Failed terms with the error message
    pub failures: Vec<(String, String)>,
    pub stats: LinkStats,
}

impl LinkReport {
    /// Terms with at least one link.
    pub fn linked(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_empty()).count()
    }

    pub fn total_links(&self) -> usize {
        self.entries.iter().map(|e| e.links.len()).sum()
    }
}

/// Links vocabulary terms against one vector space, lexicon and cache.
///
/// A linker computes each term at most once per cache. That guarantee does
/// not extend across linkers running in parallel on one cache: two of them
/// can both miss on a term and both write it. Parallel callers must give
/// each term to exactly one linker, e.g. with [`shard_terms`].
pub struct Linker<'a> {
    space: &'a dyn VectorSpace,
    lexicon: &'a ConceptLexicon,
    cache: &'a dyn LinkCache,
    config: LinkerConfig,
    counters: Counters,
}

impl<'a> Linker<'a> {
    pub fn new(
        space: &'a dyn VectorSpace,
        lexicon: &'a ConceptLexicon,
        cache: &'a dyn LinkCache,
        config: LinkerConfig,
    ) -> Self {
        Self {
            space,
            lexicon,
            cache,
            config,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            computed: self.counters.computed.load(Ordering::Relaxed),
            recovered: self.counters.recovered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Link one term.
    pub fn link(&self, term: &str) -> LinkingResult<LinkCacheEntry> {
        match resolve(term, self.space, self.lexicon, self.cache, &self.config) {
            Ok((entry, resolution)) => {
                let counter = match resolution {
                    Resolution::Hit => &self.counters.hits,
                    Resolution::Computed => &self.counters.computed,
                    Resolution::Recovered => &self.counters.recovered,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(entry)
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Link every term, continuing past per-term failures.
    pub fn link_all<I, S>(&self, terms: I) -> LinkReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = LinkReport::default();
        let every = self.config.progress_every.max(1);
        let mut matched = 0usize;
        for (i, term) in terms.into_iter().enumerate() {
            let term = term.as_ref();
            match self.link(term) {
                Ok(entry) => {
                    if !entry.is_empty() {
                        matched += 1;
                    }
                    report.entries.push(entry);
                }
                Err(e) => {
                    tracing::warn!(term = %term, error = %e, "linking failed, skipping term");
                    report.failures.push((term.to_string(), e.to_string()));
                    report.entries.push(LinkCacheEntry::empty(term));
                }
            }
            if (i + 1) % every == 0 {
                tracing::info!(processed = i + 1, matched, "linking progress");
            }
        }
        report.stats = self.stats();
        tracing::info!(
            terms = report.entries.len(),
            matched,
            hits = report.stats.hits,
            failed = report.stats.failed,
            "linking finished"
        );
        report
    }

    /// Link the whole vocabulary of the vector space.
    pub fn link_vocabulary(&self) -> LinkReport {
        self.link_all(self.space.vocabulary())
    }
}

/// Split `terms` into `shards` disjoint groups for parallel linkers.
///
/// A term lands in the same shard however often it repeats, so every cache
/// key has a single writer. Order within a shard follows `terms`.
pub fn shard_terms<S: AsRef<str>>(terms: &[S], shards: usize) -> Vec<Vec<String>> {
    let shards = shards.max(1);
    let mut out = vec![Vec::new(); shards];
    for term in terms {
        let term = term.as_ref();
        let mut hasher = DefaultHasher::new();
        term.hash(&mut hasher);
        out[(hasher.finish() % shards as u64) as usize].push(term.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::InMemoryVectorSpace;
    use crate::storage::{InMemoryLinkCache, OpenCache, SqliteLinkCache};
    use std::sync::Arc;

    /// Shared call counter for verifying at-most-once computation.
    #[derive(Clone)]
    struct CallCounter(Arc<AtomicUsize>);

    impl CallCounter {
        fn new() -> Self {
            Self(Arc::new(AtomicUsize::new(0)))
        }
        fn get(&self) -> usize {
            self.0.load(Ordering::Relaxed)
        }
        fn increment(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Vector space that counts neighbor queries.
    struct CountingSpace {
        inner: InMemoryVectorSpace,
        queries: CallCounter,
    }

    impl VectorSpace for CountingSpace {
        fn contains(&self, term: &str) -> bool {
            self.inner.contains(term)
        }
        fn nearest(&self, term: &str, k: usize) -> Result<Vec<Neighbor>, EmbeddingError> {
            self.queries.increment();
            self.inner.nearest(term, k)
        }
        fn vocabulary(&self) -> Vec<String> {
            self.inner.vocabulary()
        }
        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    /// Vector space whose queries fail for one term.
    struct FlakySpace {
        inner: InMemoryVectorSpace,
        failing: &'static str,
    }

    impl VectorSpace for FlakySpace {
        fn contains(&self, term: &str) -> bool {
            self.inner.contains(term)
        }
        fn nearest(&self, term: &str, k: usize) -> Result<Vec<Neighbor>, EmbeddingError> {
            if term == self.failing {
                return Err(EmbeddingError::ModelError("index offline".to_string()));
            }
            self.inner.nearest(term, k)
        }
        fn vocabulary(&self) -> Vec<String> {
            self.inner.vocabulary()
        }
        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    fn test_space() -> InMemoryVectorSpace {
        let space = InMemoryVectorSpace::new();
        space.insert("deep_learning", vec![0.9, 0.3, 0.1]).unwrap();
        space.insert("neural_nets", vec![0.85, 0.35, 0.15]).unwrap();
        space.insert("machine_learnin", vec![0.88, 0.32, 0.12]).unwrap();
        space.insert("democracy", vec![0.1, 0.2, 0.95]).unwrap();
        space
    }

    fn test_lexicon() -> ConceptLexicon {
        ConceptLexicon::build(["deep learning", "machine learning", "neural networks", "democracy"])
            .lexicon
    }

    fn counting_space() -> (CountingSpace, CallCounter) {
        let counter = CallCounter::new();
        (
            CountingSpace {
                inner: test_space(),
                queries: counter.clone(),
            },
            counter,
        )
    }

    #[test]
    fn test_links_self_and_neighbors() {
        let space = test_space();
        let links = compute_links("deep_learning", &space, &test_lexicon(), &LinkerConfig::default())
            .unwrap();
        let concepts: Vec<&str> = links.iter().map(|l| l.concept.as_str()).collect();
        assert_eq!(concepts, vec!["deep learning", "machine learning"]);
        assert_eq!(links[0].score, 1.0);
        assert_eq!(links[0].via, "deep_learning");
        assert_eq!(links[1].via, "machine_learnin");
        assert!(links[1].via_similarity > 0.9);
        // "democracy" is not an embedding neighbor and is never compared
        assert!(!concepts.contains(&"democracy"));
    }

    #[test]
    fn test_exclude_self() {
        let space = test_space();
        let config = LinkerConfig {
            include_self: false,
            ..LinkerConfig::default()
        };
        let links = compute_links("deep_learning", &space, &test_lexicon(), &config).unwrap();
        assert!(links.iter().all(|l| l.concept != "deep learning"));
    }

    #[test]
    fn test_links_sorted_and_deduplicated() {
        let space = InMemoryVectorSpace::new();
        space.insert("web", vec![1.0, 0.0]).unwrap();
        space.insert("webs", vec![0.99, 0.1]).unwrap();
        space.insert("the_web", vec![0.98, 0.12]).unwrap();
        let lexicon = ConceptLexicon::build(["web", "the web"]).lexicon;
        let config = LinkerConfig {
            string_threshold: 0.7,
            ..LinkerConfig::default()
        };
        let links = compute_links("web", &space, &lexicon, &config).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].concept, "web");
        assert_eq!(links[0].via, "web");
        assert_eq!(links[1].concept, "the web");
        assert!(links.windows(2).all(|w| w[0].score >= w[1].score));
        let entry = LinkCacheEntry::new("web", links);
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn test_cache_hit_computes_at_most_once() {
        let (space, queries) = counting_space();
        let lexicon = test_lexicon();
        let cache = InMemoryLinkCache::new();
        let config = LinkerConfig::default();

        let first = link("deep_learning", &space, &lexicon, &cache, &config).unwrap();
        assert_eq!(queries.get(), 1);
        let second = link("deep_learning", &space, &lexicon, &cache, &config).unwrap();
        assert_eq!(queries.get(), 1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_result_is_cached() {
        let (space, queries) = counting_space();
        let cache = InMemoryLinkCache::new();
        let lexicon = ConceptLexicon::build(["semantic web"]).lexicon;
        let config = LinkerConfig::default();

        let entry = link("democracy", &space, &lexicon, &cache, &config).unwrap();
        assert!(entry.is_empty());
        link("democracy", &space, &lexicon, &cache, &config).unwrap();
        assert_eq!(queries.get(), 1);
    }

    #[test]
    fn test_corrupt_entry_recomputed_for_that_term_only() {
        let space = test_space();
        let lexicon = test_lexicon();
        let cache = SqliteLinkCache::open_in_memory().unwrap();
        let linker = Linker::new(&space, &lexicon, &cache, LinkerConfig::default());

        linker.link("neural_nets").unwrap();
        cache.put_raw("deep_learning", "[{\"concept\":").unwrap();

        let entry = linker.link("deep_learning").unwrap();
        assert_eq!(entry.links[0].concept, "deep learning");
        assert_eq!(cache.get("deep_learning").unwrap(), Some(entry));
        assert!(cache.get("neural_nets").unwrap().is_some());

        let stats = linker.stats();
        assert_eq!(stats.recovered, 1);
        assert_eq!(stats.computed, 1);
    }

    #[test]
    fn test_query_failure_skips_term_and_continues() {
        let space = FlakySpace {
            inner: test_space(),
            failing: "neural_nets",
        };
        let lexicon = test_lexicon();
        let cache = InMemoryLinkCache::new();
        let linker = Linker::new(&space, &lexicon, &cache, LinkerConfig::default());

        let report = linker.link_all(["deep_learning", "neural_nets", "democracy"]);
        assert_eq!(report.entries.len(), 3);
        assert!(report.entries[1].is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "neural_nets");
        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.stats.computed, 2);
        assert_eq!(report.linked(), 2);
        // Failed term is not cached, so a later run retries it
        assert!(!cache.contains("neural_nets").unwrap());
    }

    #[test]
    fn test_unknown_term_error() {
        let space = test_space();
        let cache = InMemoryLinkCache::new();
        let err = link(
            "missing",
            &space,
            &test_lexicon(),
            &cache,
            &LinkerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, LinkingError::UnknownTerm(t) if t == "missing"));
    }

    #[test]
    fn test_raising_thresholds_never_adds_links() {
        let space = test_space();
        let lexicon = test_lexicon();
        let loose = LinkerConfig {
            embedding_threshold: 0.5,
            string_threshold: 0.6,
            ..LinkerConfig::default()
        };
        let strict = LinkerConfig {
            embedding_threshold: 0.99,
            string_threshold: 0.95,
            ..LinkerConfig::default()
        };
        for term in space.vocabulary() {
            let a = compute_links(&term, &space, &lexicon, &loose).unwrap();
            let b = compute_links(&term, &space, &lexicon, &strict).unwrap();
            assert!(b.len() <= a.len(), "{}", term);
        }
    }

    #[test]
    fn test_link_vocabulary_reports_hits_on_second_pass() {
        let space = test_space();
        let lexicon = test_lexicon();
        let cache = InMemoryLinkCache::new();

        let first = Linker::new(&space, &lexicon, &cache, LinkerConfig::default()).link_vocabulary();
        assert_eq!(first.stats.computed, 4);

        let second = Linker::new(&space, &lexicon, &cache, LinkerConfig::default()).link_vocabulary();
        assert_eq!(second.stats.hits, 4);
        assert_eq!(second.stats.computed, 0);
        assert_eq!(first.entries, second.entries);
    }

    #[test]
    fn test_shard_terms_gives_each_term_one_shard() {
        let terms = ["web", "ontology", "web", "deep_learning", "semantic_web", "ontology"];
        let shards = shard_terms(&terms, 3);
        assert_eq!(shards.len(), 3);
        assert_eq!(shards.iter().map(Vec::len).sum::<usize>(), terms.len());
        for term in terms {
            let holding = shards.iter().filter(|s| s.iter().any(|t| t == term)).count();
            assert_eq!(holding, 1, "{} split across shards", term);
        }
        assert_eq!(shard_terms(&terms, 0), vec![terms.map(String::from).to_vec()]);
    }
}
