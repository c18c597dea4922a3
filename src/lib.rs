#![warn(unreachable_pub)]
#![warn(dead_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod hash;
pub mod index_store;
pub mod indexer;
pub mod optimize;
pub mod search;
pub mod shard;
mod sql;
pub mod stopwords;
pub mod text_store;
pub mod tokenize;

// Re-export common types
pub use config::{IndexerConfig, ShardConfig};
pub use error::{ConfigError, Error, IngestError, QueryError, Result};
pub use index_store::{IndexStats, Posting, QueryPostings};
pub use indexer::BatchSummary;
pub use optimize::OptimizeOutcome;
pub use search::{SearchHit, SearchMode};
pub use stopwords::Stopwords;
pub use text_store::{Document, TextMatch};
