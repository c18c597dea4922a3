//! The partitioned text store: document payloads and result extraction.
//!
//! Documents live in the text database, split over M tables selected by
//! [`crate::shard::text_shard`]:
//!
//! ```text
//! texts_bin_k(text_id INTEGER PRIMARY KEY, title VARCHAR, date DATE, text VARCHAR)
//! ```
//!
//! plus the `text_id_sequence` that hands out globally unique ids at
//! ingestion. Batches are partitioned in memory before insert, so the tables
//! never carry a routing column. Dates cross the API boundary as
//! `YYYY-MM-DD` strings and are cast at the SQL edge in both directions.

use ahash::AHashMap;
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::search::SearchHit;
use crate::shard::text_shard;
use crate::sql;

/// Ranked rows staged per INSERT while materializing the enrichment table.
const STAGE_CHUNK_ROWS: usize = 512;

/// A document as written to the text store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub text_id: i32,
    pub title: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub text: String,
}

/// A ranked search result joined back to its document payload.
#[derive(Debug, Clone, Serialize)]
pub struct TextMatch {
    pub matching_words: i64,
    pub words_total: i32,
    pub term_frequency: f64,
    pub text_id: i32,
    pub title: String,
    pub date: String,
    pub text: String,
}

/// Create the text schema. Idempotent.
pub fn create_text_db(conn: &Connection, text_bins: u32) -> Result<()> {
    conn.execute_batch("CREATE SEQUENCE IF NOT EXISTS text_id_sequence START 1")?;

    for bin in 1..=text_bins {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                text_id INTEGER PRIMARY KEY,
                title   VARCHAR,
                date    DATE,
                text    VARCHAR
            )",
            table = sql::texts_table(bin),
        ))?;
    }

    debug!(text_bins, "text schema ready");
    Ok(())
}

/// Draw `count` fresh document ids from the global sequence.
pub fn next_text_ids(conn: &Connection, count: usize) -> Result<Vec<i32>> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT CAST(NEXTVAL('text_id_sequence') AS INTEGER) FROM range({count})"
    ))?;
    let rows = stmt.query_map([], |row| row.get::<_, i32>(0))?;

    let mut ids = Vec::with_capacity(count);
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

/// Append a document batch, partitioned in memory by text bin, inside one
/// transaction spanning every touched bin.
pub fn write_batch(conn: &mut Connection, text_bins: u32, documents: &[Document]) -> Result<()> {
    if documents.is_empty() {
        return Ok(());
    }

    let mut by_bin: AHashMap<u32, Vec<&Document>> = AHashMap::new();
    for document in documents {
        by_bin
            .entry(text_shard(document.text_id, text_bins))
            .or_default()
            .push(document);
    }

    let tx = conn.transaction()?;
    for (bin, rows) in &by_bin {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {table} VALUES (?, ?, CAST(? AS DATE), ?)",
            table = sql::texts_table(*bin),
        ))?;
        for document in rows {
            stmt.execute(duckdb::params![
                document.text_id,
                document.title,
                document.date,
                document.text
            ])?;
        }
    }
    tx.commit()?;

    debug!(texts = documents.len(), bins = by_bin.len(), "text batch written");
    Ok(())
}

/// Fetch the documents behind ranked search hits and join the ranking
/// columns back on, ordered by `term_frequency` descending.
///
/// Returns `None` when none of the ids resolve to a stored document.
pub fn read_texts(
    conn: &Connection,
    text_bins: u32,
    ranked: &[SearchHit],
) -> Result<Option<Vec<TextMatch>>> {
    if ranked.is_empty() {
        return Ok(None);
    }

    // Partition the wanted ids by bin for the fan-out select.
    let mut by_bin: AHashMap<u32, Vec<i32>> = AHashMap::new();
    for hit in ranked {
        by_bin
            .entry(text_shard(hit.text_id, text_bins))
            .or_default()
            .push(hit.text_id);
    }

    let texts_query = by_bin
        .iter()
        .map(|(bin, ids)| {
            format!(
                "SELECT text_id, title, date, text
                 FROM {table}
                 WHERE text_id IN ({ids})",
                table = sql::texts_table(*bin),
                ids = sql::in_list_i32(ids.iter().copied()),
            )
        })
        .collect::<Vec<_>>()
        .join("\nUNION\n");

    // Stage the ranking columns so the join and final ordering happen in SQL.
    conn.execute_batch(
        "CREATE OR REPLACE TEMP TABLE ranked_hits (
            text_id        INTEGER,
            matching_words BIGINT,
            words_total    INTEGER,
            term_frequency DOUBLE
        )",
    )?;
    for chunk in ranked.chunks(STAGE_CHUNK_ROWS) {
        let values = chunk
            .iter()
            .map(|hit| {
                format!(
                    "({}, {}, {}, {})",
                    hit.text_id, hit.matching_words, hit.words_total, hit.term_frequency
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute_batch(&format!("INSERT INTO ranked_hits VALUES {values}"))?;
    }

    // Retrieved texts on the left: every stored document that matched comes
    // back, carrying its ranking columns (present by construction, since the
    // IN lists were built from the ranked rows).
    let query = format!(
        "SELECT
            rh.matching_words,
            rh.words_total,
            rh.term_frequency,
            tt.text_id,
            tt.title,
            CAST(tt.date AS VARCHAR) AS date,
            tt.text
        FROM
            ({texts_query}) AS tt
            LEFT JOIN ranked_hits AS rh
                ON rh.text_id = tt.text_id
        ORDER BY rh.term_frequency DESC"
    );

    let mut stmt = conn.prepare(&query)?;
    let rows = stmt.query_map([], |row| {
        Ok(TextMatch {
            matching_words: row.get(0)?,
            words_total: row.get(1)?,
            term_frequency: row.get(2)?,
            text_id: row.get(3)?,
            title: row.get(4)?,
            date: row.get(5)?,
            text: row.get(6)?,
        })
    })?;

    let mut matches = Vec::new();
    for row in rows {
        matches.push(row?);
    }

    conn.execute_batch("DROP TABLE ranked_hits")?;

    debug!(requested = ranked.len(), found = matches.len(), "texts read");

    if matches.is_empty() {
        Ok(None)
    } else {
        Ok(Some(matches))
    }
}
