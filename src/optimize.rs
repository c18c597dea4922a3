//! Offline index optimization.
//!
//! Postings arrive in whatever order the batch writers produced them
//! (insertion order is deliberately not preserved). This pass rewrites each
//! bin's postings sorted by `hash_id`, then `text_id`, which clusters the
//! rows the read path scans together and helps the storage layer compress
//! runs of similar values. Row content is untouched and the dictionary is
//! never rewritten, so `(hash, hash_id)` assignments survive unchanged.
//!
//! A failing bin is recorded and skipped; the remaining bins are still
//! rewritten.

use std::time::Instant;

use duckdb::Connection;
use tracing::{error, info};

use crate::error::Result;
use crate::sql;

/// What an optimization pass touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeOutcome {
    pub bins_total: u32,
    pub bins_failed: u32,
    pub rows_rewritten: u64,
}

/// Rewrite every postings bin in sorted order, then checkpoint.
pub fn optimize_index(conn: &mut Connection, index_bins: u32) -> Result<OptimizeOutcome> {
    let started = Instant::now();
    let mut outcome = OptimizeOutcome {
        bins_total: index_bins,
        ..OptimizeOutcome::default()
    };

    for bin in 1..=index_bins {
        match rewrite_bin(conn, bin) {
            Ok(rows) => {
                outcome.rows_rewritten += rows;
                info!(bin, rows, "bin reordered");
            }
            Err(source) => {
                outcome.bins_failed += 1;
                error!(bin, %source, "bin reorder failed");
            }
        }
    }

    conn.execute_batch("CHECKPOINT")?;

    info!(
        bins = outcome.bins_total,
        failed = outcome.bins_failed,
        rows = outcome.rows_rewritten,
        elapsed = ?started.elapsed(),
        "index optimized"
    );

    Ok(outcome)
}

/// Rewrite one bin inside a transaction: copy sorted, delete, reinsert.
fn rewrite_bin(conn: &mut Connection, bin: u32) -> std::result::Result<u64, duckdb::Error> {
    let table = sql::postings_table(bin);
    let sorted = format!("sorted_bin_{bin}");

    let tx = conn.transaction()?;

    tx.execute_batch(&format!(
        "CREATE OR REPLACE TEMP TABLE {sorted} AS
         SELECT hash_id, text_id, positions
         FROM {table}
         ORDER BY hash_id ASC, text_id ASC"
    ))?;

    let rows: i64 = tx.query_row(&format!("SELECT COUNT(*) FROM {sorted}"), [], |row| {
        row.get(0)
    })?;

    tx.execute_batch(&format!("DELETE FROM {table}"))?;
    tx.execute_batch(&format!("INSERT INTO {table} SELECT * FROM {sorted}"))?;
    tx.execute_batch(&format!("DROP TABLE {sorted}"))?;

    tx.commit()?;
    Ok(rows as u64)
}
