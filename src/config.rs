//! Environment-driven configuration.
//!
//! Bin counts are fixed at database creation and must match between the
//! process that created the schema and every later reader or writer; they are
//! therefore read from the environment rather than guessed from the catalog.
//! Validation is fail-fast: a missing or malformed variable aborts the
//! operation before any state is touched.

use std::env;

use crate::error::ConfigError;

/// `INDEX_BINS`: number of index shards (N).
pub const INDEX_BINS_VAR: &str = "INDEX_BINS";

/// `TEXT_BINS`: number of text shards (M).
pub const TEXT_BINS_VAR: &str = "TEXT_BINS";

/// `INDEXER_PARTS_PER_BIN`: how many parts a source batch is split into
/// before being held in memory.
pub const PARTS_PER_BIN_VAR: &str = "INDEXER_PARTS_PER_BIN";

/// `INDEXER_BATCH_MAXIMUM`: word budget of one hashing sub-batch.
pub const BATCH_MAXIMUM_VAR: &str = "INDEXER_BATCH_MAXIMUM";

/// Shard layout shared by the write and read paths.
#[derive(Debug, Clone, Copy)]
pub struct ShardConfig {
    /// Number of index shards (N).
    pub index_bins: u32,
    /// Number of text shards (M).
    pub text_bins: u32,
}

impl ShardConfig {
    /// Read `INDEX_BINS` and `TEXT_BINS` from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            index_bins: positive_u32(INDEX_BINS_VAR, env::var(INDEX_BINS_VAR).ok())?,
            text_bins: positive_u32(TEXT_BINS_VAR, env::var(TEXT_BINS_VAR).ok())?,
        })
    }
}

/// Memory policy of the batch indexer.
#[derive(Debug, Clone, Copy)]
pub struct IndexerConfig {
    /// Parts a source batch is split into before processing.
    pub parts_per_bin: usize,
    /// Maximum total words per hashing sub-batch.
    pub batch_maximum: usize,
}

impl IndexerConfig {
    /// Read `INDEXER_PARTS_PER_BIN` and `INDEXER_BATCH_MAXIMUM` from the
    /// environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            parts_per_bin: positive_usize(PARTS_PER_BIN_VAR, env::var(PARTS_PER_BIN_VAR).ok())?,
            batch_maximum: positive_usize(BATCH_MAXIMUM_VAR, env::var(BATCH_MAXIMUM_VAR).ok())?,
        })
    }
}

fn positive_u32(name: &'static str, value: Option<String>) -> Result<u32, ConfigError> {
    let value = value.ok_or(ConfigError::MissingVar { name })?;
    match value.trim().parse::<u32>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::InvalidVar { name, value }),
    }
}

fn positive_usize(name: &'static str, value: Option<String>) -> Result<usize, ConfigError> {
    positive_u32(name, value).map(|v| v as usize)
}
