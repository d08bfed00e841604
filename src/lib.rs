//! Conceptlink: Ontology Concept Rewriting and Vocabulary Linking
//!
//! Prepares a paper corpus for embedding training by rewriting multi-word
//! ontology concepts into single underscore-joined tokens, then links the
//! trained vocabulary back to ontology concepts by combining embedding-space
//! neighbors with string-edit similarity.
//!
//! # Core Concepts
//!
//! - **Lexicon**: normalized, deduplicated concept phrases ordered longest first
//! - **Rewriter**: longest-match, word-boundary safe, idempotent phrase joining
//! - **Partitions**: memory-bounded, order-preserving slices of the corpus
//! - **Link cache**: persistent term → concept links, computed at most once
//!
//! # Example
//!
//! ```
//! use conceptlink::{rewrite_text, ConceptLexicon};
//!
//! let lexicon = ConceptLexicon::build(["computer science", "web"]).lexicon;
//! let out = rewrite_text("recent advances in computer science improved web search", &lexicon);
//! assert_eq!(out.text, "recent advances in computer_science improved web search");
//! ```

pub mod config;
pub mod corpus;
pub mod embedding;
pub mod lexicon;
pub mod linking;
pub mod phrases;
pub mod pipeline;
pub mod rewrite;
pub mod storage;

pub use config::{ConfigError, PipelineConfig};
pub use corpus::{
    for_each_partition, read_partition, write_partition, CorpusSource, Document, Partition,
    PartitionBudget, PartitionError, PartitionStream,
};
pub use embedding::{EmbeddingError, EmbeddingTrainer, InMemoryVectorSpace, Neighbor, VectorSpace};
pub use lexicon::{joined_form, ConceptLexicon, LexiconBuild, LexiconError, Phrase};
pub use linking::{link, LinkReport, Linker, LinkerConfig, LinkingError};
pub use phrases::{CollocationMiner, MinedPhrases, PhraseDetector};
pub use rewrite::{rewrite, rewrite_text, ConceptRewriter, RewriteOutcome};
pub use storage::{
    CacheError, CacheResult, InMemoryLinkCache, Link, LinkCache, LinkCacheEntry, OpenCache,
    SqliteLinkCache,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
