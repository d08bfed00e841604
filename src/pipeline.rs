//! Step driver
//!
//! Each step reads the previous step's persisted output and writes its own,
//! so any step can be rerun on its own. Layout under the work directory:
//!
//! ```text
//! partitions/part-NNNNN.jsonl   raw corpus partitions
//! rewritten/part-NNNNN.jsonl    concept-rewritten partitions
//! sentences.jsonl               tokenized documents
//! phrases.json                  mined phrase levels
//! phrased.jsonl                 sentences with mined phrases joined
//! ```
//!
//! `phrased.jsonl` is the input for external embedding training. Linking
//! runs once trained vectors are available.

use crate::config::{ConfigError, PhraseConfig, PipelineConfig};
use crate::corpus::{
    list_partitions, partition_path, prune_partitions, read_partition, write_partition,
    write_sentences,
    CorpusSource, Partition, PartitionBudget, PartitionError, PartitionStream, SentenceFile,
};
use crate::embedding::{word2vec, EmbeddingError, VectorSpace};
use crate::lexicon::{read_labels, ConceptLexicon};
use crate::linking::{LinkReport, Linker, LinkerConfig};
use crate::phrases::{MinedPhrases, PhraseDetector, PhraseError};
use crate::rewrite::{tokenize, ConceptRewriter};
use crate::storage::{CacheError, LinkCache, OpenCache, SqliteLinkCache};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Rewritten documents logged per partition as before/after samples
const SAMPLES_PER_PARTITION: usize = 2;

/// Pipeline-fatal errors. Per-term linking failures never reach this type.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot read concept labels {path}: {source}")]
    Lexicon {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Partition(#[from] PartitionError),

    #[error(transparent)]
    Phrases(#[from] PhraseError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("missing input: {0}")]
    MissingInput(&'static str),
}

/// Result type for pipeline steps
pub type PipelineResult<T> = Result<T, PipelineError>;

/// File layout of a work directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partitions(&self) -> PathBuf {
        self.root.join("partitions")
    }

    pub fn rewritten(&self) -> PathBuf {
        self.root.join("rewritten")
    }

    pub fn sentences(&self) -> PathBuf {
        self.root.join("sentences.jsonl")
    }

    pub fn phrases(&self) -> PathBuf {
        self.root.join("phrases.json")
    }

    pub fn phrased(&self) -> PathBuf {
        self.root.join("phrased.jsonl")
    }
}

/// Elapsed time per named step, in run order.
#[derive(Debug, Clone, Default)]
pub struct StepTimings {
    steps: Vec<(String, Duration)>,
}

impl StepTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: impl Into<String>, elapsed: Duration) {
        let step = step.into();
        tracing::info!(step = %step, elapsed_ms = elapsed.as_millis() as u64, "step finished");
        self.steps.push((step, elapsed));
    }

    /// Run `f` and record its elapsed time under `step`.
    pub fn time<T>(&mut self, step: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record(step, start.elapsed());
        out
    }

    pub fn steps(&self) -> &[(String, Duration)] {
        &self.steps
    }

    pub fn total(&self) -> Duration {
        self.steps.iter().map(|(_, d)| *d).sum()
    }

    pub fn slowest(&self) -> Option<(&str, Duration)> {
        self.steps
            .iter()
            .max_by_key(|(_, d)| *d)
            .map(|(s, d)| (s.as_str(), *d))
    }

    pub fn log_summary(&self) {
        if let Some((step, elapsed)) = self.slowest() {
            tracing::info!(
                total_ms = self.total().as_millis() as u64,
                slowest = %step,
                slowest_ms = elapsed.as_millis() as u64,
                "pipeline timing"
            );
        }
    }
}

/// Build the ontology lexicon from a label file.
pub fn load_lexicon(labels: &Path) -> PipelineResult<ConceptLexicon> {
    let raw = read_labels(labels).map_err(|source| PipelineError::Lexicon {
        path: labels.to_path_buf(),
        source,
    })?;
    let build = ConceptLexicon::build(&raw);
    tracing::info!(
        labels = raw.len(),
        phrases = build.lexicon.len(),
        rejected = build.rejected_count(),
        duplicates = build.duplicates,
        "loaded concept lexicon"
    );
    Ok(build.lexicon)
}

/// Counts from writing a set of partitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionSummary {
    pub partitions: usize,
    pub documents: usize,
    /// Partitions left alone because their output already existed
    pub skipped: usize,
    /// Documents with at least one concept replaced
    pub changed: usize,
    /// Concept occurrences replaced
    pub replacements: usize,
}

/// Split the corpus into partition files under `out_dir`.
///
/// Partition files left over from an earlier, larger run are removed.
pub fn partition_corpus(
    source: &CorpusSource,
    budget: PartitionBudget,
    out_dir: &Path,
) -> PipelineResult<PartitionSummary> {
    let stream = PartitionStream::open(source.clone(), budget)?;
    let mut summary = PartitionSummary::default();
    for partition in stream.iter()? {
        let partition = partition?;
        write_partition(&partition, out_dir)?;
        summary.partitions += 1;
        summary.documents += partition.len();
    }
    let stale = prune_partitions(out_dir, |index| index < summary.partitions)?;
    tracing::info!(
        partitions = summary.partitions,
        documents = summary.documents,
        stale,
        dir = %out_dir.display(),
        "partitioned corpus"
    );
    Ok(summary)
}

fn rewrite_partition(
    partition: &Partition,
    rewriter: &ConceptRewriter,
    summary: &mut PartitionSummary,
) -> Partition {
    let mut samples = 0;
    let documents = partition
        .documents
        .iter()
        .map(|doc| {
            let out = rewriter.rewrite_document(doc);
            if !out.replaced.is_empty() {
                summary.changed += 1;
                summary.replacements += out.replaced.len();
                if samples < SAMPLES_PER_PARTITION {
                    samples += 1;
                    tracing::debug!(
                        partition = partition.index,
                        id = doc.id,
                        before = %doc.abstract_text,
                        after = %out.document.abstract_text,
                        "sample rewrite"
                    );
                }
            }
            out.document
        })
        .collect();
    Partition::new(partition.index, documents)
}

fn write_rewritten(
    partition: &Partition,
    rewriter: &ConceptRewriter,
    out_dir: &Path,
    skip_existing: bool,
    summary: &mut PartitionSummary,
) -> PipelineResult<()> {
    if skip_existing && partition_path(out_dir, partition.index).exists() {
        tracing::info!(partition = partition.index, "output exists, skipping");
        summary.skipped += 1;
        return Ok(());
    }
    tracing::info!(partition = partition.index, documents = partition.len(), "rewriting partition");
    let rewritten = rewrite_partition(partition, rewriter, summary);
    write_partition(&rewritten, out_dir)?;
    summary.partitions += 1;
    summary.documents += rewritten.len();
    Ok(())
}

/// Rewrite the corpus straight from its source, one partition at a time.
///
/// With `skip_existing`, partitions whose output file exists are left alone,
/// so a failed run resumes at the partition that failed. Outputs beyond the
/// corpus's current partition count are removed.
pub fn rewrite_corpus(
    source: &CorpusSource,
    budget: PartitionBudget,
    rewriter: &ConceptRewriter,
    out_dir: &Path,
    skip_existing: bool,
) -> PipelineResult<PartitionSummary> {
    let stream = PartitionStream::open(source.clone(), budget)?;
    let mut summary = PartitionSummary::default();
    let mut partitions = 0;
    for partition in stream.iter()? {
        write_rewritten(&partition?, rewriter, out_dir, skip_existing, &mut summary)?;
        partitions += 1;
    }
    prune_partitions(out_dir, |index| index < partitions)?;
    log_rewrite_summary(&summary);
    Ok(summary)
}

/// Rewrite partition files from `in_dir` into `out_dir`.
///
/// Outputs with no matching input partition are removed.
pub fn rewrite_partitions(
    in_dir: &Path,
    rewriter: &ConceptRewriter,
    out_dir: &Path,
    skip_existing: bool,
) -> PipelineResult<PartitionSummary> {
    let mut summary = PartitionSummary::default();
    let mut inputs = HashSet::new();
    for path in list_partitions(in_dir)? {
        let partition = read_partition(&path)?;
        inputs.insert(partition.index);
        write_rewritten(&partition, rewriter, out_dir, skip_existing, &mut summary)?;
    }
    prune_partitions(out_dir, |index| inputs.contains(&index))?;
    log_rewrite_summary(&summary);
    Ok(summary)
}

fn log_rewrite_summary(summary: &PartitionSummary) {
    tracing::info!(
        partitions = summary.partitions,
        skipped = summary.skipped,
        documents = summary.documents,
        changed = summary.changed,
        replacements = summary.replacements,
        "rewrote corpus"
    );
}

/// Tokenize every document in `dir`'s partitions, in corpus order, into one
/// sentence per document.
pub fn tokenize_partitions(dir: &Path, out: &Path) -> PipelineResult<usize> {
    let paths = list_partitions(dir)?;
    let sentences = paths.iter().flat_map(|path| match read_partition(path) {
        Ok(partition) => partition
            .documents
            .iter()
            .map(|doc| Ok(tokenize(&doc.combined_text())))
            .collect::<Vec<_>>(),
        Err(e) => vec![Err(io::Error::new(io::ErrorKind::Other, e))],
    });
    let count = write_sentences(out, sentences)?;
    tracing::info!(sentences = count, out = %out.display(), "tokenized corpus");
    Ok(count)
}

/// Mine phrase levels from a sentence file and save them to `out`.
pub fn mine_phrases(
    sentences: &SentenceFile,
    config: &PhraseConfig,
    out: &Path,
) -> PipelineResult<MinedPhrases> {
    let mined = config.miner().detect(sentences)?;
    mined.save(out)?;
    tracing::info!(
        levels = mined.levels().len(),
        phrases = mined.len(),
        out = %out.display(),
        "saved mined phrases"
    );
    Ok(mined)
}

/// Join mined phrases in every sentence of `input`, writing to `out`.
pub fn apply_phrases(input: &SentenceFile, mined: &MinedPhrases, out: &Path) -> PipelineResult<usize> {
    use crate::corpus::SentenceSource;

    let sentences = input
        .sentences()?
        .map(|sentence| sentence.map(|tokens| mined.apply(&tokens)));
    let count = write_sentences(out, sentences)?;
    tracing::info!(sentences = count, out = %out.display(), "applied mined phrases");
    Ok(count)
}

/// Link the whole vocabulary of `space`.
pub fn link_vocabulary(
    space: &dyn VectorSpace,
    lexicon: &ConceptLexicon,
    cache: &dyn LinkCache,
    config: LinkerConfig,
) -> LinkReport {
    tracing::info!(terms = space.len(), concepts = lexicon.len(), "linking vocabulary");
    Linker::new(space, lexicon, cache, config).link_vocabulary()
}

/// Outcome of [`run`].
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub partitioned: PartitionSummary,
    pub rewritten: PartitionSummary,
    pub sentences: usize,
    pub mined_phrases: usize,
    /// Present when trained vectors were configured
    pub linking: Option<LinkReport>,
    pub timings: StepTimings,
}

/// Run every step the configuration has inputs for.
///
/// Linking needs trained vectors (`paths.vectors`) and a cache path; without
/// them the run stops after writing the training sentences.
pub fn run(config: &PipelineConfig) -> PipelineResult<RunSummary> {
    let labels = config
        .paths
        .labels
        .as_deref()
        .ok_or(PipelineError::MissingInput("paths.labels"))?;
    let corpus = config
        .paths
        .corpus
        .as_deref()
        .ok_or(PipelineError::MissingInput("paths.corpus"))?;
    let work = WorkDir::new(&config.paths.work_dir);
    let mut summary = RunSummary::default();
    let mut timings = StepTimings::new();

    let lexicon = timings.time("lexicon", || load_lexicon(labels))?;
    let source = CorpusSource::detect(corpus);
    summary.partitioned = timings.time("partition", || {
        partition_corpus(&source, config.partition, &work.partitions())
    })?;

    let rewriter = ConceptRewriter::new(lexicon).with_cleaning(config.rewrite.clean_text);
    summary.rewritten = timings.time("rewrite", || {
        rewrite_partitions(
            &work.partitions(),
            &rewriter,
            &work.rewritten(),
            config.rewrite.skip_existing,
        )
    })?;

    summary.sentences =
        timings.time("tokenize", || tokenize_partitions(&work.rewritten(), &work.sentences()))?;

    let sentences = SentenceFile::new(work.sentences());
    let mined = timings.time("mine", || {
        mine_phrases(&sentences, &config.phrases, &work.phrases())
    })?;
    summary.mined_phrases = mined.len();
    timings.time("apply_phrases", || {
        apply_phrases(&sentences, &mined, &work.phrased())
    })?;

    match (&config.paths.vectors, &config.paths.cache) {
        (Some(vectors), Some(cache_path)) => {
            let space = timings.time("load_vectors", || word2vec::load(vectors))?;
            let cache = SqliteLinkCache::open(cache_path)?;
            let report = timings.time("link", || {
                link_vocabulary(&space, rewriter.ontology(), &cache, config.linking)
            });
            summary.linking = Some(report);
        }
        _ => tracing::info!(
            sentences = %work.phrased().display(),
            "no trained vectors configured; train on the phrased sentences, then run linking"
        ),
    }

    timings.log_summary();
    summary.timings = timings;
    Ok(summary)
}
