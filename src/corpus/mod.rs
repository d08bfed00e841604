//! Corpus documents, sources, and memory-bounded partitions
//!
//! The corpus is never loaded whole: a [`PartitionStream`] surveys the source
//! once to plan partition sizes, then yields partitions lazily in corpus
//! order. Partitions are written atomically so a later read never observes a
//! half-written file.

mod partition;
mod sentences;
mod source;

pub use partition::{
    for_each_partition, list_partitions, partition_path, prune_partitions, read_partition,
    write_partition, Partition, PartitionBudget, PartitionError, PartitionPlan, PartitionResult,
    PartitionStream, Partitions,
};
pub use sentences::{write_sentences, SentenceFile, SentenceSource, Sentences};
pub use source::{CorpusSource, DocumentReader, SourceError, SourceFormat};

use serde::{Deserialize, Serialize};

/// A paper record. Identity is stable across partitioning and rewriting;
/// only the text fields change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: u64,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
}

impl Document {
    pub fn new(id: u64, title: impl Into<String>, abstract_text: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            abstract_text: abstract_text.into(),
        }
    }

    /// Approximate in-memory size, used by byte budgets.
    pub fn byte_len(&self) -> u64 {
        (self.title.len() + self.abstract_text.len()) as u64
    }

    /// Title and abstract joined into one training line.
    pub fn combined_text(&self) -> String {
        if self.title.is_empty() {
            self.abstract_text.clone()
        } else if self.abstract_text.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.abstract_text)
        }
    }
}
