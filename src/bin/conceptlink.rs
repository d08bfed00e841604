//! Conceptlink CLI: concept rewriting and vocabulary linking.
//!
//! Usage:
//!   conceptlink partition --corpus abstracts.txt --out work/partitions
//!   conceptlink rewrite --labels concepts.csv --partitions work/partitions --out work/rewritten
//!   conceptlink tokenize --partitions work/rewritten --out work/sentences.jsonl
//!   conceptlink mine --sentences work/sentences.jsonl --out work/phrases.json
//!   conceptlink link --labels concepts.csv --vectors model.bin [--cache links.db]
//!   conceptlink export --out links.json [--cache links.db]
//!   conceptlink run --config pipeline.yaml

use clap::{Parser, Subcommand};
use conceptlink::config::PipelineConfig;
use conceptlink::corpus::{CorpusSource, SentenceFile};
use conceptlink::embedding::word2vec;
use conceptlink::linking::Linker;
use conceptlink::phrases::MinedPhrases;
use conceptlink::pipeline::{self, StepTimings};
use conceptlink::storage::{export_json, LinkCache, OpenCache, SqliteLinkCache};
use conceptlink::ConceptRewriter;
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "conceptlink",
    version,
    about = "Ontology concept rewriting and vocabulary linking"
)]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a corpus into partition files
    Partition {
        /// Corpus source (paired lines, or .jsonl documents)
        #[arg(long)]
        corpus: Option<PathBuf>,
        /// Output directory
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Rewrite ontology concepts into joined tokens
    Rewrite {
        /// Ontology labels, one per line
        #[arg(long)]
        labels: Option<PathBuf>,
        /// Read from a corpus source
        #[arg(long, conflicts_with = "partitions")]
        corpus: Option<PathBuf>,
        /// Read from a partition directory
        #[arg(long)]
        partitions: Option<PathBuf>,
        /// Also apply mined phrases saved by `mine`
        #[arg(long)]
        phrases: Option<PathBuf>,
        /// Output directory
        #[arg(long)]
        out: Option<PathBuf>,
        /// Leave partitions whose output already exists
        #[arg(long)]
        skip_existing: bool,
    },
    /// Tokenize rewritten partitions into training sentences
    Tokenize {
        #[arg(long)]
        partitions: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Mine bigram/trigram phrases from training sentences
    Mine {
        #[arg(long)]
        sentences: Option<PathBuf>,
        /// Where to save the mined phrases
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also write the sentences with phrases joined
        #[arg(long)]
        apply: Option<PathBuf>,
    },
    /// Link trained vocabulary to ontology concepts
    Link {
        #[arg(long)]
        labels: Option<PathBuf>,
        /// Trained vectors (word2vec text, or .bin)
        #[arg(long)]
        vectors: Option<PathBuf>,
        /// Link cache database
        #[arg(long)]
        cache: Option<PathBuf>,
        /// Link only these terms and print their entries
        #[arg(long = "term")]
        terms: Vec<String>,
        /// Drop cached entries first
        #[arg(long)]
        refresh: bool,
    },
    /// Export the link cache as JSON
    Export {
        #[arg(long)]
        cache: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
        /// Include terms with no links
        #[arg(long)]
        include_empty: bool,
    },
    /// Run every configured step
    Run,
}

/// Get the default cache path (~/.local/share/conceptlink/links.db)
fn default_cache_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("conceptlink").join("links.db")
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, String> {
    match path {
        Some(p) => PipelineConfig::load(p).map_err(|e| format!("Failed to load config: {}", e)),
        None => Ok(PipelineConfig::default()),
    }
}

/// Command-line value, else the configured one.
fn pick(arg: Option<PathBuf>, configured: &Option<PathBuf>, name: &str) -> Result<PathBuf, String> {
    arg.or_else(|| configured.clone())
        .ok_or_else(|| format!("missing --{} (or paths.{} in the config)", name, name))
}

fn report(result: Result<(), String>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_partition(config: &PipelineConfig, corpus: Option<PathBuf>, out: Option<PathBuf>) -> Result<(), String> {
    let corpus = pick(corpus, &config.paths.corpus, "corpus")?;
    let out = out.unwrap_or_else(|| pipeline::WorkDir::new(&config.paths.work_dir).partitions());
    let summary = pipeline::partition_corpus(&CorpusSource::detect(corpus), config.partition, &out)
        .map_err(|e| e.to_string())?;
    println!(
        "Wrote {} partitions ({} documents) to {}",
        summary.partitions,
        summary.documents,
        out.display()
    );
    Ok(())
}

fn cmd_rewrite(
    config: &PipelineConfig,
    labels: Option<PathBuf>,
    corpus: Option<PathBuf>,
    partitions: Option<PathBuf>,
    phrases: Option<PathBuf>,
    out: Option<PathBuf>,
    skip_existing: bool,
) -> Result<(), String> {
    let labels = pick(labels, &config.paths.labels, "labels")?;
    let work = pipeline::WorkDir::new(&config.paths.work_dir);
    let out = out.unwrap_or_else(|| work.rewritten());
    let skip_existing = skip_existing || config.rewrite.skip_existing;

    let lexicon = pipeline::load_lexicon(&labels).map_err(|e| e.to_string())?;
    let mut rewriter = ConceptRewriter::new(lexicon).with_cleaning(config.rewrite.clean_text);
    if let Some(path) = phrases {
        let mined = MinedPhrases::load(&path).map_err(|e| e.to_string())?;
        rewriter = rewriter.with_mined(mined);
    }

    let summary = match corpus {
        Some(corpus) => pipeline::rewrite_corpus(
            &CorpusSource::detect(corpus),
            config.partition,
            &rewriter,
            &out,
            skip_existing,
        ),
        None => {
            let input = partitions.unwrap_or_else(|| work.partitions());
            pipeline::rewrite_partitions(&input, &rewriter, &out, skip_existing)
        }
    }
    .map_err(|e| e.to_string())?;

    println!(
        "Rewrote {} partitions ({} skipped): {} of {} documents changed, {} replacements",
        summary.partitions,
        summary.skipped,
        summary.changed,
        summary.documents,
        summary.replacements
    );
    Ok(())
}

fn cmd_tokenize(config: &PipelineConfig, partitions: Option<PathBuf>, out: Option<PathBuf>) -> Result<(), String> {
    let work = pipeline::WorkDir::new(&config.paths.work_dir);
    let partitions = partitions.unwrap_or_else(|| work.rewritten());
    let out = out.unwrap_or_else(|| work.sentences());
    let count = pipeline::tokenize_partitions(&partitions, &out).map_err(|e| e.to_string())?;
    println!("Wrote {} sentences to {}", count, out.display());
    Ok(())
}

fn cmd_mine(
    config: &PipelineConfig,
    sentences: Option<PathBuf>,
    out: Option<PathBuf>,
    apply: Option<PathBuf>,
) -> Result<(), String> {
    let work = pipeline::WorkDir::new(&config.paths.work_dir);
    let sentences = SentenceFile::new(sentences.unwrap_or_else(|| work.sentences()));
    let out = out.unwrap_or_else(|| work.phrases());
    let mined =
        pipeline::mine_phrases(&sentences, &config.phrases, &out).map_err(|e| e.to_string())?;
    println!(
        "Mined {} phrases over {} levels into {}",
        mined.len(),
        mined.levels().len(),
        out.display()
    );
    if let Some(apply) = apply {
        let count =
            pipeline::apply_phrases(&sentences, &mined, &apply).map_err(|e| e.to_string())?;
        println!("Wrote {} phrased sentences to {}", count, apply.display());
    }
    Ok(())
}

fn cmd_link(
    config: &PipelineConfig,
    labels: Option<PathBuf>,
    vectors: Option<PathBuf>,
    cache: Option<PathBuf>,
    terms: Vec<String>,
    refresh: bool,
) -> Result<(), String> {
    let labels = pick(labels, &config.paths.labels, "labels")?;
    let vectors = pick(vectors, &config.paths.vectors, "vectors")?;
    let cache_path = cache
        .or_else(|| config.paths.cache.clone())
        .unwrap_or_else(default_cache_path);

    let lexicon = pipeline::load_lexicon(&labels).map_err(|e| e.to_string())?;
    let space = word2vec::load(&vectors).map_err(|e| format!("Failed to load vectors: {}", e))?;
    let cache = SqliteLinkCache::open(&cache_path)
        .map_err(|e| format!("Failed to open link cache: {}", e))?;
    if refresh {
        let dropped = cache.clear().map_err(|e| e.to_string())?;
        tracing::info!(dropped, "cleared link cache");
    }

    let mut timings = StepTimings::new();
    if terms.is_empty() {
        let report = timings.time("link", || {
            pipeline::link_vocabulary(&space, &lexicon, &cache, config.linking)
        });
        println!(
            "Linked {} of {} terms ({} links, {} cached, {} failed) into {}",
            report.linked(),
            report.entries.len(),
            report.total_links(),
            report.stats.hits,
            report.stats.failed,
            cache_path.display()
        );
    } else {
        let linker = Linker::new(&space, &lexicon, &cache, config.linking);
        let report = timings.time("link", || linker.link_all(&terms));
        for entry in &report.entries {
            let line = serde_json::to_string(entry).map_err(|e| e.to_string())?;
            println!("{}", line);
        }
    }
    timings.log_summary();
    Ok(())
}

fn cmd_export(config: &PipelineConfig, cache: Option<PathBuf>, out: &Path, include_empty: bool) -> Result<(), String> {
    let cache_path = cache
        .or_else(|| config.paths.cache.clone())
        .unwrap_or_else(default_cache_path);
    let cache = SqliteLinkCache::open(&cache_path)
        .map_err(|e| format!("Failed to open link cache: {}", e))?;
    let count = export_json(&cache, out, include_empty).map_err(|e| e.to_string())?;
    println!("Exported {} terms to {}", count, out.display());
    Ok(())
}

fn cmd_run(config: &PipelineConfig) -> Result<(), String> {
    let summary = pipeline::run(config).map_err(|e| e.to_string())?;
    println!(
        "Partitioned {} documents, rewrote {} ({} changed), {} sentences, {} mined phrases",
        summary.partitioned.documents,
        summary.rewritten.documents,
        summary.rewritten.changed,
        summary.sentences,
        summary.mined_phrases
    );
    if let Some(report) = &summary.linking {
        println!(
            "Linked {} of {} terms ({} links)",
            report.linked(),
            report.entries.len(),
            report.total_links()
        );
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Partition { corpus, out } => cmd_partition(&config, corpus, out),
        Commands::Rewrite {
            labels,
            corpus,
            partitions,
            phrases,
            out,
            skip_existing,
        } => cmd_rewrite(&config, labels, corpus, partitions, phrases, out, skip_existing),
        Commands::Tokenize { partitions, out } => cmd_tokenize(&config, partitions, out),
        Commands::Mine {
            sentences,
            out,
            apply,
        } => cmd_mine(&config, sentences, out, apply),
        Commands::Link {
            labels,
            vectors,
            cache,
            terms,
            refresh,
        } => cmd_link(&config, labels, vectors, cache, terms, refresh),
        Commands::Export {
            cache,
            out,
            include_empty,
        } => cmd_export(&config, cache, &out, include_empty),
        Commands::Run => cmd_run(&config),
    };
    std::process::exit(report(result));
}
