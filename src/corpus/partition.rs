//! Partition stream and atomic partition files
//!
//! Opening a stream performs one counting pass over the source to plan the
//! partition sizes; iteration then reads the source sequentially, holding at
//! most one partition in memory. Iterating again re-reads the source from the
//! start, so the stream is restartable.
//!
//! Partition files are JSON lines named `part-NNNNN.jsonl` and are written
//! through a temp file in the destination directory followed by a rename.

use super::source::{CorpusSource, DocumentReader, SourceError};
use super::Document;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

const PARTITION_PREFIX: &str = "part-";
const PARTITION_SUFFIX: &str = ".jsonl";

/// Errors that can occur while reading or writing partitions.
///
/// Every per-partition variant names the failing partition so it can be
/// retried on its own.
#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("corpus source not found: {0}")]
    MissingSource(PathBuf),

    #[error("failed to survey corpus source: {0}")]
    Survey(#[source] SourceError),

    #[error("failed to read partition {partition}: {source}")]
    Read {
        partition: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to write partition {partition}: {source}")]
    Write {
        partition: usize,
        #[source]
        source: io::Error,
    },

    #[error("malformed record in partition {partition} at line {line}: {reason}")]
    Malformed {
        partition: usize,
        line: usize,
        reason: String,
    },

    #[error("not a partition file: {0}")]
    UnrecognizedFile(PathBuf),
}

impl PartitionError {
    /// Index of the partition that failed, if the error is partition-scoped.
    pub fn partition(&self) -> Option<usize> {
        match self {
            PartitionError::Read { partition, .. }
            | PartitionError::Write { partition, .. }
            | PartitionError::Malformed { partition, .. } => Some(*partition),
            _ => None,
        }
    }

    fn from_source(partition: usize, err: SourceError) -> Self {
        match err {
            SourceError::Io(source) => PartitionError::Read { partition, source },
            SourceError::Malformed { line, reason } => PartitionError::Malformed {
                partition,
                line,
                reason,
            },
        }
    }
}

/// Result type for partition operations
pub type PartitionResult<T> = Result<T, PartitionError>;

/// Memory budget for one partition.
///
/// The record budget is the default; a byte budget replaces it when set.
/// `min_partitions` keeps per-partition memory bounded on small machines even
/// when the whole corpus would fit one budget. It is capped at the record
/// count so no partition is ever empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionBudget {
    pub max_records: usize,
    pub max_bytes: Option<u64>,
    pub min_partitions: usize,
}

impl Default for PartitionBudget {
    fn default() -> Self {
        Self {
            max_records: 12_500,
            max_bytes: None,
            min_partitions: 4,
        }
    }
}

impl PartitionBudget {
    pub fn records(max_records: usize) -> Self {
        Self {
            max_records,
            max_bytes: None,
            min_partitions: 1,
        }
    }

    pub fn bytes(max_bytes: u64) -> Self {
        Self {
            max_bytes: Some(max_bytes),
            min_partitions: 1,
            ..Self::default()
        }
    }

    pub fn with_min_partitions(mut self, min_partitions: usize) -> Self {
        self.min_partitions = min_partitions;
        self
    }
}

/// How partition boundaries are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cut {
    /// Sizes differ by at most one: the first `extra` partitions get `base + 1`
    Records { base: usize, extra: usize },
    /// Close a partition once it holds at least `target` bytes
    Bytes { target: u64 },
}

/// Partition layout derived from the survey pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    pub total_records: usize,
    pub total_bytes: u64,
    /// Planned partition count (exact for record budgets)
    pub partitions: usize,
    cut: Cut,
}

impl PartitionPlan {
    fn new(total_records: usize, total_bytes: u64, budget: &PartitionBudget) -> Self {
        let min = budget.min_partitions.max(1);
        if total_records == 0 {
            return Self {
                total_records,
                total_bytes,
                partitions: 0,
                cut: Cut::Records { base: 0, extra: 0 },
            };
        }
        match budget.max_bytes {
            Some(max_bytes) => {
                let max_bytes = max_bytes.max(1);
                let needed = total_bytes.div_ceil(max_bytes) as usize;
                let partitions = needed.max(min).min(total_records);
                // Capping at the record count can raise the even share above
                // the budget; the budget still bounds each partition.
                let target = total_bytes.div_ceil(partitions as u64).clamp(1, max_bytes);
                Self {
                    total_records,
                    total_bytes,
                    partitions,
                    cut: Cut::Bytes { target },
                }
            }
            None => {
                let needed = total_records.div_ceil(budget.max_records.max(1));
                let partitions = needed.max(min).min(total_records);
                Self {
                    total_records,
                    total_bytes,
                    partitions,
                    cut: Cut::Records {
                        base: total_records / partitions,
                        extra: total_records % partitions,
                    },
                }
            }
        }
    }

    fn records_for(&self, index: usize) -> usize {
        match self.cut {
            Cut::Records { base, extra } => {
                if index < extra {
                    base + 1
                } else {
                    base.max(1)
                }
            }
            Cut::Bytes { .. } => usize::MAX,
        }
    }

    fn byte_target(&self) -> Option<u64> {
        match self.cut {
            Cut::Bytes { target } => Some(target),
            Cut::Records { .. } => None,
        }
    }
}

/// An ordered slice of the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub index: usize,
    pub documents: Vec<Document>,
}

impl Partition {
    pub fn new(index: usize, documents: Vec<Document>) -> Self {
        Self { index, documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// A planned, restartable partitioning of a corpus source.
#[derive(Debug, Clone)]
pub struct PartitionStream {
    source: CorpusSource,
    plan: PartitionPlan,
}

impl PartitionStream {
    /// Survey `source` and plan partitions for `budget`.
    pub fn open(source: CorpusSource, budget: PartitionBudget) -> PartitionResult<Self> {
        if !source.exists() {
            return Err(PartitionError::MissingSource(source.path().to_path_buf()));
        }
        let reader = source
            .open()
            .map_err(|e| PartitionError::Survey(SourceError::Io(e)))?;
        let mut total_records = 0;
        let mut total_bytes = 0;
        for doc in reader {
            let doc = doc.map_err(PartitionError::Survey)?;
            total_records += 1;
            total_bytes += doc.byte_len();
        }
        let plan = PartitionPlan::new(total_records, total_bytes, &budget);
        tracing::info!(
            source = %source.path().display(),
            records = total_records,
            bytes = total_bytes,
            partitions = plan.partitions,
            "planned corpus partitions"
        );
        Ok(Self { source, plan })
    }

    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    pub fn source(&self) -> &CorpusSource {
        &self.source
    }

    /// Start a fresh pass over the source.
    pub fn iter(&self) -> PartitionResult<Partitions> {
        let reader = self
            .source
            .open()
            .map_err(|source| PartitionError::Read { partition: 0, source })?;
        Ok(Partitions {
            reader,
            plan: self.plan,
            next_index: 0,
            failed: false,
        })
    }
}

/// Plan `source` for `budget` and return a lazy pass over its partitions.
pub fn for_each_partition(source: CorpusSource, budget: PartitionBudget) -> PartitionResult<Partitions> {
    PartitionStream::open(source, budget)?.iter()
}

/// Lazy sequence of partitions in corpus order.
///
/// Stops after the first error; the failing partition index is in the error.
pub struct Partitions {
    reader: DocumentReader,
    plan: PartitionPlan,
    next_index: usize,
    failed: bool,
}

impl Iterator for Partitions {
    type Item = PartitionResult<Partition>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let index = self.next_index;
        let max_records = self.plan.records_for(index);
        let byte_target = self.plan.byte_target();
        let mut documents = Vec::new();
        let mut bytes = 0;

        while documents.len() < max_records && byte_target.map_or(true, |t| bytes < t) {
            match self.reader.next() {
                Some(Ok(doc)) => {
                    bytes += doc.byte_len();
                    documents.push(doc);
                }
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(PartitionError::from_source(index, e)));
                }
                None => break,
            }
        }

        if documents.is_empty() {
            return None;
        }
        self.next_index += 1;
        tracing::debug!(partition = index, documents = documents.len(), bytes, "read partition");
        Some(Ok(Partition::new(index, documents)))
    }
}

/// File path for partition `index` under `dir`.
pub fn partition_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("{}{:05}{}", PARTITION_PREFIX, index, PARTITION_SUFFIX))
}

fn partition_index(path: &Path) -> Option<usize> {
    path.file_name()?
        .to_str()?
        .strip_prefix(PARTITION_PREFIX)?
        .strip_suffix(PARTITION_SUFFIX)?
        .parse()
        .ok()
}

/// Atomically persist a partition under `dir`, returning the file path.
pub fn write_partition(partition: &Partition, dir: &Path) -> PartitionResult<PathBuf> {
    let index = partition.index;
    let write_err = |source: io::Error| PartitionError::Write {
        partition: index,
        source,
    };

    fs::create_dir_all(dir).map_err(write_err)?;
    let path = partition_path(dir, index);
    let tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        for doc in &partition.documents {
            serde_json::to_writer(&mut writer, doc).map_err(|e| write_err(e.into()))?;
            writer.write_all(b"\n").map_err(write_err)?;
        }
        writer.flush().map_err(write_err)?;
    }
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(&path).map_err(|e| write_err(e.error))?;
    Ok(path)
}

/// Read a partition file written by [`write_partition`].
pub fn read_partition(path: &Path) -> PartitionResult<Partition> {
    let index =
        partition_index(path).ok_or_else(|| PartitionError::UnrecognizedFile(path.to_path_buf()))?;
    let file = File::open(path).map_err(|source| PartitionError::Read {
        partition: index,
        source,
    })?;
    let mut documents = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| PartitionError::Read {
            partition: index,
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let doc = serde_json::from_str(&line).map_err(|e| PartitionError::Malformed {
            partition: index,
            line: i + 1,
            reason: e.to_string(),
        })?;
        documents.push(doc);
    }
    Ok(Partition::new(index, documents))
}

/// Partition files under `dir`, sorted by partition index.
///
/// Temp files and unrelated files are ignored.
pub fn list_partitions(dir: &Path) -> PartitionResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|_| PartitionError::MissingSource(dir.to_path_buf()))?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| PartitionError::Read {
            partition: found.len(),
            source,
        })?;
        let path = entry.path();
        if let Some(index) = partition_index(&path) {
            found.push((index, path));
        }
    }
    found.sort_by_key(|(index, _)| *index);
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

/// Delete partition files under `dir` whose index `keep` rejects.
///
/// A missing directory holds nothing to prune. Returns the number removed.
pub fn prune_partitions(
    dir: &Path,
    mut keep: impl FnMut(usize) -> bool,
) -> PartitionResult<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for path in list_partitions(dir)? {
        let Some(index) = partition_index(&path) else {
            continue;
        };
        if keep(index) {
            continue;
        }
        fs::remove_file(&path).map_err(|source| PartitionError::Write {
            partition: index,
            source,
        })?;
        tracing::debug!(partition = index, path = %path.display(), "removed stale partition");
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::TempDir;

    fn paired_source(dir: &TempDir, count: usize) -> CorpusSource {
        let path = dir.path().join("abstracts.txt");
        let mut file = File::create(&path).unwrap();
        for i in 0..count {
            writeln!(file, "Title {}", i).unwrap();
            writeln!(file, "Abstract number {}", i).unwrap();
        }
        CorpusSource::paired_lines(path)
    }

    fn collect(stream: &PartitionStream) -> Vec<Partition> {
        stream.iter().unwrap().collect::<Result<_, _>>().unwrap()
    }

    #[test]
    fn test_plan_respects_min_partitions() {
        let dir = TempDir::new().unwrap();
        let budget = PartitionBudget::records(100).with_min_partitions(4);
        let stream = PartitionStream::open(paired_source(&dir, 10), budget).unwrap();
        assert_eq!(stream.plan().partitions, 4);

        let sizes: Vec<usize> = collect(&stream).iter().map(Partition::len).collect();
        assert_eq!(sizes, vec![3, 3, 2, 2]);
    }

    #[test]
    fn test_min_partitions_capped_at_record_count() {
        let dir = TempDir::new().unwrap();
        let budget = PartitionBudget::records(100).with_min_partitions(8);
        let stream = PartitionStream::open(paired_source(&dir, 3), budget).unwrap();
        let parts = collect(&stream);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.len() == 1));
    }

    #[test]
    fn test_record_budget_splits_evenly() {
        let dir = TempDir::new().unwrap();
        let stream = PartitionStream::open(paired_source(&dir, 10), PartitionBudget::records(4)).unwrap();
        let sizes: Vec<usize> = collect(&stream).iter().map(Partition::len).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
    }

    #[test]
    fn test_byte_budget_bounds_partitions() {
        let dir = TempDir::new().unwrap();
        let source = paired_source(&dir, 20);
        let stream = PartitionStream::open(source, PartitionBudget::bytes(100)).unwrap();
        let parts = collect(&stream);
        assert!(parts.len() > 1);
        let total: usize = parts.iter().map(Partition::len).sum();
        assert_eq!(total, 20);
    }

    #[test]
    fn test_partitions_preserve_order_and_are_restartable() {
        let dir = TempDir::new().unwrap();
        let stream = PartitionStream::open(paired_source(&dir, 7), PartitionBudget::records(2)).unwrap();
        let first: Vec<u64> = collect(&stream)
            .into_iter()
            .flat_map(|p| p.documents)
            .map(|d| d.id)
            .collect();
        assert_eq!(first, (0..7).collect::<Vec<u64>>());

        let second: Vec<u64> = collect(&stream)
            .into_iter()
            .flat_map(|p| p.documents)
            .map(|d| d.id)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_source_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let stream = PartitionStream::open(paired_source(&dir, 0), PartitionBudget::default()).unwrap();
        assert_eq!(stream.plan().partitions, 0);
        assert!(collect(&stream).is_empty());
    }

    #[test]
    fn test_missing_source() {
        let err = PartitionStream::open(
            CorpusSource::paired_lines("/nonexistent/abstracts.txt"),
            PartitionBudget::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PartitionError::MissingSource(_)));
        assert_eq!(err.partition(), None);
    }

    #[test]
    fn test_write_then_read_partition() {
        let dir = TempDir::new().unwrap();
        let partition = Partition::new(
            2,
            vec![Document::new(4, "t", "a \"quoted\"\nline"), Document::new(5, "", "")],
        );
        let path = write_partition(&partition, dir.path()).unwrap();
        assert_eq!(path, dir.path().join("part-00002.jsonl"));
        assert_eq!(read_partition(&path).unwrap(), partition);
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        write_partition(&Partition::new(0, vec![Document::new(0, "old", "")]), dir.path()).unwrap();
        let path =
            write_partition(&Partition::new(0, vec![Document::new(0, "new", "")]), dir.path()).unwrap();
        assert_eq!(read_partition(&path).unwrap().documents[0].title, "new");
    }

    #[test]
    fn test_list_partitions_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for index in [10, 2, 0] {
            write_partition(&Partition::new(index, vec![]), dir.path()).unwrap();
        }
        File::create(dir.path().join("notes.txt")).unwrap();

        let listed = list_partitions(dir.path()).unwrap();
        let indexes: Vec<usize> = listed.iter().filter_map(|p| partition_index(p)).collect();
        assert_eq!(indexes, vec![0, 2, 10]);
    }

    #[test]
    fn test_prune_removes_rejected_indexes_only() {
        let dir = TempDir::new().unwrap();
        for index in 0..5 {
            write_partition(&Partition::new(index, vec![]), dir.path()).unwrap();
        }
        File::create(dir.path().join("notes.txt")).unwrap();

        assert_eq!(prune_partitions(dir.path(), |index| index < 2).unwrap(), 3);
        let indexes: Vec<usize> = list_partitions(dir.path())
            .unwrap()
            .iter()
            .filter_map(|p| partition_index(p))
            .collect();
        assert_eq!(indexes, vec![0, 1]);
        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(prune_partitions(&dir.path().join("absent"), |_| false).unwrap(), 0);
    }

    #[test]
    fn test_read_malformed_partition_names_index() {
        let dir = TempDir::new().unwrap();
        let path = partition_path(dir.path(), 3);
        fs::write(&path, "{\"id\":1,\"title\":\"t\",\"abstract\":\"a\"}\n{broken\n").unwrap();
        match read_partition(&path).unwrap_err() {
            PartitionError::Malformed { partition, line, .. } => {
                assert_eq!(partition, 3);
                assert_eq!(line, 2);
            }
            other => panic!("expected malformed error, got {:?}", other),
        }
    }
}
