//! Command line front-end: schema creation, corpus indexing, searching, and
//! index maintenance.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use duckdb::Connection;
use serde::Deserialize;
use tracing::info;

use crate::config::{IndexerConfig, ShardConfig};
use crate::error::Error;
use crate::hash::hash_query;
use crate::index_store;
use crate::indexer;
use crate::optimize::optimize_index;
use crate::search::{SearchMode, run_search};
use crate::stopwords::Stopwords;
use crate::text_store::{self, Document};

#[derive(Parser)]
#[command(name = "lexshard")]
#[command(about = "Lexical search over sharded SQL tables", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the index and text database schemas.
    Create {
        #[arg(long, default_value = "data/lexshard_index.db")]
        index_db: PathBuf,
        #[arg(long, default_value = "data/lexshard_texts.db")]
        text_db: PathBuf,
    },
    /// Index a JSONL corpus (one {"title", "date", "text"} object per line).
    Index {
        corpus: PathBuf,
        #[arg(long, default_value = "data/lexshard_index.db")]
        index_db: PathBuf,
        #[arg(long, default_value = "data/lexshard_texts.db")]
        text_db: PathBuf,
        /// stopwords-iso JSON file; bundled Bulgarian ∪ English when omitted.
        #[arg(long)]
        stopword_file: Option<PathBuf>,
        /// Languages to take from the stopword file.
        #[arg(long, value_delimiter = ',', default_value = "bg,en")]
        languages: Vec<String>,
        /// Documents per read batch.
        #[arg(long, default_value = "25000")]
        batch_size: usize,
    },
    /// Search the index.
    Search {
        query: String,
        #[arg(short, long, value_enum, default_value = "exact-phrase")]
        mode: MatchMode,
        /// Maximum results; 0 means all.
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
        #[arg(long, default_value = "data/lexshard_index.db")]
        index_db: PathBuf,
        #[arg(long, default_value = "data/lexshard_texts.db")]
        text_db: PathBuf,
        #[arg(long)]
        stopword_file: Option<PathBuf>,
        #[arg(long, value_delimiter = ',', default_value = "bg,en")]
        languages: Vec<String>,
    },
    /// Rewrite the postings bins in sorted order for locality.
    Optimize {
        #[arg(long, default_value = "data/lexshard_index.db")]
        index_db: PathBuf,
    },
    /// Print indexed text and word totals.
    Stats {
        #[arg(long, default_value = "data/lexshard_index.db")]
        index_db: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MatchMode {
    /// Consecutive word sequences.
    ExactPhrase,
    /// All words, any order.
    AnyPosition,
}

impl From<MatchMode> for SearchMode {
    fn from(mode: MatchMode) -> Self {
        match mode {
            MatchMode::ExactPhrase => Self::ExactPhrase,
            MatchMode::AnyPosition => Self::AnyPosition,
        }
    }
}

/// One corpus line.
#[derive(Debug, Deserialize)]
pub struct CorpusDoc {
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_date")]
    pub date: String,
    pub text: String,
}

fn default_date() -> String {
    "1970-01-01".to_string()
}

/// Parse one JSONL corpus line. `line_number` is 1-based and carried into
/// the error so a bad line can be located in a multi-gigabyte corpus.
pub fn parse_corpus_line(line_number: usize, line: &str) -> Result<CorpusDoc, Error> {
    serde_json::from_str(line).map_err(|source| Error::Corpus {
        line: line_number,
        source,
    })
}

/// Run a parsed command.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Create { index_db, text_db } => create(&index_db, &text_db),
        Commands::Index {
            corpus,
            index_db,
            text_db,
            stopword_file,
            languages,
            batch_size,
        } => index(
            &corpus,
            &index_db,
            &text_db,
            stopword_file.as_deref(),
            &languages,
            batch_size,
        ),
        Commands::Search {
            query,
            mode,
            limit,
            index_db,
            text_db,
            stopword_file,
            languages,
        } => search(
            &query,
            mode,
            limit,
            &index_db,
            &text_db,
            stopword_file.as_deref(),
            &languages,
        ),
        Commands::Optimize { index_db } => optimize(&index_db),
        Commands::Stats { index_db } => stats(&index_db),
    }
}

fn load_stopwords(
    stopword_file: Option<&Path>,
    languages: &[String],
) -> anyhow::Result<Stopwords> {
    match stopword_file {
        Some(path) => {
            let languages: Vec<&str> = languages.iter().map(String::as_str).collect();
            Stopwords::from_json_file(path, &languages)
                .with_context(|| format!("loading stopwords from {}", path.display()))
        }
        None => Ok(Stopwords::bundled()),
    }
}

fn open_existing(path: &Path) -> anyhow::Result<Connection> {
    if !path.exists() {
        bail!("database file not found: {} (run `create` first)", path.display());
    }
    Connection::open(path).with_context(|| format!("opening {}", path.display()))
}

fn create(index_db: &Path, text_db: &Path) -> anyhow::Result<()> {
    let shards = ShardConfig::from_env()?;

    for path in [index_db, text_db] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let index_conn = Connection::open(index_db)?;
    index_store::create_index(&index_conn, shards.index_bins)?;

    let text_conn = Connection::open(text_db)?;
    text_store::create_text_db(&text_conn, shards.text_bins)?;

    info!(
        index_bins = shards.index_bins,
        text_bins = shards.text_bins,
        "schemas created"
    );
    Ok(())
}

fn index(
    corpus: &Path,
    index_db: &Path,
    text_db: &Path,
    stopword_file: Option<&Path>,
    languages: &[String],
    batch_size: usize,
) -> anyhow::Result<()> {
    let shards = ShardConfig::from_env()?;
    let indexer_config = IndexerConfig::from_env()?;
    let stopwords = load_stopwords(stopword_file, languages)?;

    let mut text_conn = open_existing(text_db)?;
    if !index_db.exists() {
        bail!(
            "database file not found: {} (run `create` first)",
            index_db.display()
        );
    }

    let reader = BufReader::new(
        File::open(corpus).with_context(|| format!("opening corpus {}", corpus.display()))?,
    );

    let started = Instant::now();
    let mut batch: Vec<CorpusDoc> = Vec::with_capacity(batch_size);
    let mut batch_number = 0usize;
    let mut texts_total = 0usize;
    let mut words_total = 0usize;

    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc = parse_corpus_line(line_number + 1, &line)
            .with_context(|| format!("reading corpus {}", corpus.display()))?;
        batch.push(doc);

        if batch.len() == batch_size {
            batch_number += 1;
            let summary = index_batch(
                &mut text_conn,
                index_db,
                &shards,
                &indexer_config,
                &stopwords,
                std::mem::take(&mut batch),
                batch_number,
            )?;
            texts_total += summary.0;
            words_total += summary.1;
        }
    }

    if !batch.is_empty() {
        batch_number += 1;
        let summary = index_batch(
            &mut text_conn,
            index_db,
            &shards,
            &indexer_config,
            &stopwords,
            batch,
            batch_number,
        )?;
        texts_total += summary.0;
        words_total += summary.1;
    }

    info!(
        batches = batch_number,
        texts = texts_total,
        words = words_total,
        elapsed = ?started.elapsed(),
        "corpus indexed"
    );
    Ok(())
}

/// Write one read batch: assign ids, store the texts, then index them, in
/// memory-bounded parts.
fn index_batch(
    text_conn: &mut Connection,
    index_db: &Path,
    shards: &ShardConfig,
    indexer_config: &IndexerConfig,
    stopwords: &Stopwords,
    batch: Vec<CorpusDoc>,
    batch_number: usize,
) -> anyhow::Result<(usize, usize)> {
    let part_size = batch.len().div_ceil(indexer_config.parts_per_bin).max(1);
    let mut texts_written = 0usize;
    let mut words_written = 0usize;

    for part in batch.chunks(part_size) {
        let started = Instant::now();
        let text_ids = text_store::next_text_ids(text_conn, part.len())?;

        let documents: Vec<Document> = text_ids
            .iter()
            .zip(part)
            .map(|(text_id, doc)| Document {
                text_id: *text_id,
                title: doc.title.clone(),
                date: doc.date.clone(),
                text: doc.text.clone(),
            })
            .collect();
        text_store::write_batch(text_conn, shards.text_bins, &documents)?;

        let texts: Vec<String> = part.iter().map(|doc| doc.text.clone()).collect();
        let summary = indexer::write_batch(
            index_db,
            &text_ids,
            &texts,
            shards.index_bins,
            stopwords,
            indexer_config.batch_maximum,
        )?;

        texts_written += summary.texts_written;
        words_written += summary.words_written;

        info!(
            batch = batch_number,
            texts = summary.texts_written,
            words = summary.words_written,
            elapsed = ?started.elapsed(),
            "batch part written and indexed"
        );
    }

    Ok((texts_written, words_written))
}

fn search(
    query: &str,
    mode: MatchMode,
    limit: usize,
    index_db: &Path,
    text_db: &Path,
    stopword_file: Option<&Path>,
    languages: &[String],
) -> anyhow::Result<()> {
    let shards = ShardConfig::from_env()?;
    let stopwords = load_stopwords(stopword_file, languages)?;

    let index_conn = open_existing(index_db)?;
    let text_conn = open_existing(text_db)?;

    let hashes = hash_query(&stopwords, query);

    let read_start = Instant::now();
    let postings = index_store::read_index(&index_conn, shards.index_bins, &hashes)?;
    let index_reading_seconds = read_start.elapsed().as_secs_f64();

    let rank_start = Instant::now();
    let hits = match &postings {
        Some(postings) => run_search(&index_conn, postings, mode.into(), limit)?,
        None => None,
    };
    let search_seconds = rank_start.elapsed().as_secs_f64();

    let extract_start = Instant::now();
    let matches = match &hits {
        Some(hits) => text_store::read_texts(&text_conn, shards.text_bins, hits)?,
        None => None,
    };
    let text_extraction_seconds = extract_start.elapsed().as_secs_f64();

    let timings = serde_json::json!({
        "index_reading_seconds": round3(index_reading_seconds),
        "search_seconds": round3(search_seconds),
        "text_extraction_seconds": round3(text_extraction_seconds),
        "total_seconds": round3(index_reading_seconds + search_seconds + text_extraction_seconds),
    });
    println!("{}", serde_json::to_string_pretty(&timings)?);

    match matches {
        Some(matches) => println!("{}", serde_json::to_string_pretty(&matches)?),
        None => println!("No matching texts were found."),
    }
    Ok(())
}

fn round3(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

fn optimize(index_db: &Path) -> anyhow::Result<()> {
    let shards = ShardConfig::from_env()?;
    let mut conn = open_existing(index_db)?;

    let outcome = optimize_index(&mut conn, shards.index_bins)?;
    if outcome.bins_failed > 0 {
        bail!(
            "{} of {} bins failed to reorder",
            outcome.bins_failed,
            outcome.bins_total
        );
    }
    Ok(())
}

fn stats(index_db: &Path) -> anyhow::Result<()> {
    let conn = open_existing(index_db)?;
    let stats = index_store::index_stats(&conn)?;
    println!(
        "{}",
        serde_json::json!({
            "texts_total": stats.texts_total,
            "words_total": stats.words_total,
        })
    );
    Ok(())
}
