//! Pipeline configuration
//!
//! Loaded from YAML. Every section has defaults, so a partial file (or no
//! file at all) is valid:
//!
//! ```yaml
//! partition:
//!   max_records: 5000
//! linking:
//!   neighbors: 20
//!   string_threshold: 0.85
//! ```

use crate::corpus::PartitionBudget;
use crate::linking::LinkerConfig;
use crate::phrases::CollocationMiner;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid option {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Input and output locations. Command-line arguments override these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Ontology label file, one label per line
    pub labels: Option<PathBuf>,
    /// Corpus source (paired lines or JSON lines)
    pub corpus: Option<PathBuf>,
    /// Directory for partitions and intermediate files
    pub work_dir: PathBuf,
    /// Trained vectors in word2vec format
    pub vectors: Option<PathBuf>,
    /// Link cache database
    pub cache: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            labels: None,
            corpus: None,
            work_dir: PathBuf::from("work"),
            vectors: None,
            cache: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Run the text cleaner before concept rewriting
    pub clean_text: bool,
    /// Leave partitions whose output already exists
    pub skip_existing: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            clean_text: true,
            skip_existing: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhraseConfig {
    /// Minimum occurrences of a mined phrase
    pub min_count: u64,
    /// Collocation score threshold
    pub threshold: f64,
    /// Mining passes; 2 yields bigrams and trigrams
    pub levels: usize,
}

impl Default for PhraseConfig {
    fn default() -> Self {
        let miner = CollocationMiner::default();
        Self {
            min_count: miner.min_count,
            threshold: miner.threshold,
            levels: miner.levels,
        }
    }
}

impl PhraseConfig {
    pub fn miner(&self) -> CollocationMiner {
        CollocationMiner::new(self.min_count, self.threshold, self.levels)
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub partition: PartitionBudget,
    pub rewrite: RewriteConfig,
    pub phrases: PhraseConfig,
    pub linking: LinkerConfig,
}

impl PipelineConfig {
    /// Load and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        // An empty document deserializes as unit, not as an empty map
        let config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |field, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };

        if self.partition.max_records == 0 {
            return invalid("partition.max_records", "must be at least 1");
        }
        if self.partition.max_bytes == Some(0) {
            return invalid("partition.max_bytes", "must be at least 1 when set");
        }
        if self.phrases.min_count == 0 {
            return invalid("phrases.min_count", "must be at least 1");
        }
        if self.phrases.levels == 0 {
            return invalid("phrases.levels", "must be at least 1");
        }
        if !self.phrases.threshold.is_finite() {
            return invalid("phrases.threshold", "must be finite");
        }
        if self.linking.neighbors == 0 {
            return invalid("linking.neighbors", "must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.linking.embedding_threshold) {
            return invalid("linking.embedding_threshold", "must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.linking.string_threshold) {
            return invalid("linking.string_threshold", "must be within [0, 1]");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.partition.max_records, 12_500);
        assert_eq!(config.partition.max_bytes, None);
        assert_eq!(config.partition.min_partitions, 4);
        assert!(config.rewrite.clean_text);
        assert_eq!(config.phrases.min_count, 5);
        assert_eq!(config.phrases.threshold, 10.0);
        assert_eq!(config.phrases.levels, 2);
        assert_eq!(config.linking.neighbors, 10);
        assert_eq!(config.linking.embedding_threshold, 0.7);
        assert_eq!(config.linking.string_threshold, 0.9);
        assert!(config.linking.include_self);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let config = PipelineConfig::from_yaml_str(
            "partition:\n  max_records: 100\nlinking:\n  neighbors: 3\n",
        )
        .unwrap();
        assert_eq!(config.partition.max_records, 100);
        assert_eq!(config.partition.min_partitions, 4);
        assert_eq!(config.linking.neighbors, 3);
        assert_eq!(config.linking.string_threshold, 0.9);
        assert_eq!(config.paths.work_dir, PathBuf::from("work"));
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(
            PipelineConfig::from_yaml_str("").unwrap(),
            PipelineConfig::default()
        );
    }

    #[test]
    fn test_out_of_range_thresholds_rejected() {
        let err = PipelineConfig::from_yaml_str("linking:\n  string_threshold: 1.5\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "linking.string_threshold", .. }
        ));
        assert!(PipelineConfig::from_yaml_str("linking:\n  embedding_threshold: -0.1\n").is_err());
        assert!(PipelineConfig::from_yaml_str("linking:\n  neighbors: 0\n").is_err());
        assert!(PipelineConfig::from_yaml_str("partition:\n  max_bytes: 0\n").is_err());
        assert!(PipelineConfig::from_yaml_str("phrases:\n  levels: 0\n").is_err());
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            PipelineConfig::from_yaml_str("partition: [unclosed"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_yaml_round_trip_via_file() {
        let mut config = PipelineConfig::default();
        config.phrases.min_count = 9;
        config.paths.corpus = Some(PathBuf::from("abstracts.txt"));
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, config.to_yaml_string().unwrap()).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = PipelineConfig::load("/nonexistent/config.yaml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/config.yaml"));
    }
}
