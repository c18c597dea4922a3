//! Centralized error handling with typed error enums.
//!
//! Errors follow the engine's failure taxonomy:
//!
//! ```text
//! Error (top-level)
//! ├── Config(ConfigError)  - Environment/configuration validation
//! ├── Ingest(IngestError)  - Batch indexing failures (the whole batch fails)
//! ├── Query(QueryError)    - Malformed search input
//! ├── Database             - SQL engine errors
//! ├── Io                   - Filesystem errors (stopword files, corpora)
//! └── Corpus               - Malformed corpus input lines
//! ```
//!
//! Read paths report "no match" and "unresolvable query hash" as `Ok(None)`,
//! never as an error.

use std::path::PathBuf;
use thiserror::Error;

/// A specialized Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for all engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors (missing/invalid bin counts, batch sizes, paths).
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Batch indexing errors.
    #[error("{0}")]
    Ingest(#[from] IngestError),

    /// Search input errors.
    #[error("{0}")]
    Query(#[from] QueryError),

    /// Errors surfaced by the embedded SQL engine.
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    /// Filesystem errors.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A corpus line that does not parse as a document.
    #[error("corpus line {line}: malformed document: {source}")]
    Corpus {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while validating configuration.
///
/// Configuration failures are detected before any state is created or
/// modified, so a failed operation leaves no partial schema behind.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing environment variable {name}")]
    MissingVar { name: &'static str },

    /// An environment variable holds something other than a positive integer.
    #[error("invalid value {value:?} for {name}: expected a positive integer")]
    InvalidVar { name: &'static str, value: String },

    /// A referenced database file does not exist.
    #[error("database file not found: {path}")]
    DatabaseNotFound { path: PathBuf },

    /// A stopword file was parsed but held no entries for the requested languages.
    #[error("stopword file {path} has no entries for languages {languages:?}")]
    EmptyStopwords {
        path: PathBuf,
        languages: Vec<String>,
    },

    /// A stopword file is not valid stopwords-iso JSON.
    #[error("malformed stopword file {path}: {source}")]
    MalformedStopwords {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by the batch indexer. Any of these fails the whole batch;
/// shards committed by earlier sub-batches remain in place.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The id and text slices passed to `write_batch` differ in length.
    #[error("batch length mismatch: {text_ids} text ids, {texts} texts")]
    LengthMismatch { text_ids: usize, texts: usize },

    /// A shard writer failed inside its transaction.
    #[error("shard {shard} write failed: {source}")]
    ShardWrite {
        shard: u32,
        #[source]
        source: duckdb::Error,
    },
}

/// Errors raised while resolving search input.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A hash string contains non-hexadecimal characters and cannot be routed.
    #[error("malformed hash {hash:?}: expected hexadecimal digits")]
    MalformedHash { hash: String },
}
