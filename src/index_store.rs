//! The sharded inverted index: schema, read fan-out, and statistics.
//!
//! The index database holds one global `word_counts` table, one global
//! `hash_id_sequence`, and per bin a dictionary table mapping word hashes to
//! integer ids plus a postings table keyed by those ids:
//!
//! ```text
//! word_counts(text_id INTEGER PRIMARY KEY, words_total INTEGER)
//! bin_k_hash_dict(hash VARCHAR PRIMARY KEY, hash_id INTEGER UNIQUE)
//! bin_k_hash_index(hash_id INTEGER, text_id INTEGER, positions INTEGER[])
//! ```
//!
//! `hash_id`s come from the single global sequence, so they are unique across
//! bins even though each bin assigns its own. A hash is only ever written to
//! the bin [`crate::shard::index_shard`] routes it to, which is what lets the
//! read path fan out per-bin lookups and simply union the results.

use ahash::AHashMap;
use duckdb::Connection;
use tracing::debug;

use crate::error::Result;
use crate::shard::index_shard;
use crate::sql;

/// One postings row: a word (by id) occurring in a document at the listed
/// 0-based token positions, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub hash_id: i32,
    pub text_id: i32,
    pub positions: Vec<i32>,
}

/// The resolved form of a search request: every requested hash translated to
/// its `hash_id` (in query-term order, duplicates preserved) plus all
/// postings rows for those ids.
#[derive(Debug, Clone)]
pub struct QueryPostings {
    pub hash_ids: Vec<i32>,
    pub postings: Vec<Posting>,
}

impl QueryPostings {
    /// Number of distinct hash ids in the query.
    pub fn distinct_ids(&self) -> usize {
        let mut ids: Vec<i32> = self.hash_ids.clone();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

/// Create the index schema. Idempotent: existing tables and the sequence are
/// left untouched.
pub fn create_index(conn: &Connection, index_bins: u32) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS word_counts (
            text_id     INTEGER PRIMARY KEY,
            words_total INTEGER
        );
        CREATE SEQUENCE IF NOT EXISTS hash_id_sequence START 1;",
    )?;

    for bin in 1..=index_bins {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {dict} (
                hash    VARCHAR PRIMARY KEY,
                hash_id INTEGER UNIQUE
            );
            CREATE TABLE IF NOT EXISTS {postings} (
                hash_id   INTEGER,
                text_id   INTEGER,
                positions INTEGER[]
            );",
            dict = sql::dict_table(bin),
            postings = sql::postings_table(bin),
        ))?;
    }

    debug!(index_bins, "index schema ready");
    Ok(())
}

/// Resolve request hashes against the shard dictionaries and fetch their
/// postings.
///
/// Returns `None` when the request is empty or when any hash is missing from
/// its bin's dictionary: an unresolvable term means the query as a whole can
/// have no defined result, particularly under phrase semantics.
pub fn read_index(
    conn: &Connection,
    index_bins: u32,
    hashes: &[String],
) -> Result<Option<QueryPostings>> {
    if hashes.is_empty() {
        return Ok(None);
    }

    // Unique hashes grouped by the bin each one routes to.
    let mut unique: Vec<&str> = hashes.iter().map(String::as_str).collect();
    unique.sort_unstable();
    unique.dedup();

    let mut by_bin: AHashMap<u32, Vec<&str>> = AHashMap::new();
    for hash in &unique {
        let bin = index_shard(hash, index_bins)?;
        by_bin.entry(bin).or_default().push(hash);
    }

    // Dictionary lookups, one SELECT per bin, unioned.
    let mapping_query = by_bin
        .iter()
        .map(|(bin, bin_hashes)| {
            format!(
                "SELECT hash, hash_id
                 FROM {dict}
                 WHERE hash IN ({hashes})",
                dict = sql::dict_table(*bin),
                hashes = sql::in_list_str(bin_hashes.iter().copied()),
            )
        })
        .collect::<Vec<_>>()
        .join("\nUNION\n");

    let mut mapping: AHashMap<String, i32> = AHashMap::with_capacity(unique.len());
    {
        let mut stmt = conn.prepare(&mapping_query)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i32>(1)?))
        })?;
        for row in rows {
            let (hash, hash_id) = row?;
            mapping.insert(hash, hash_id);
        }
    }

    if mapping.len() < unique.len() {
        debug!(
            requested = unique.len(),
            resolved = mapping.len(),
            "query hash missing from dictionary"
        );
        return Ok(None);
    }

    // Safe: completeness was just checked.
    let hash_ids: Vec<i32> = hashes.iter().map(|h| mapping[h.as_str()]).collect();

    // Postings lookups through the resolved ids, one SELECT per bin, unioned.
    let postings_query = by_bin
        .iter()
        .map(|(bin, bin_hashes)| {
            let ids = bin_hashes.iter().map(|h| mapping[*h]);
            format!(
                "SELECT hash_id, text_id, CAST(positions AS VARCHAR) AS positions
                 FROM {postings}
                 WHERE hash_id IN ({ids})",
                postings = sql::postings_table(*bin),
                ids = sql::in_list_i32(ids),
            )
        })
        .collect::<Vec<_>>()
        .join("\nUNION\n");

    let mut postings = Vec::new();
    {
        let mut stmt = conn.prepare(&postings_query)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i32>(0)?,
                row.get::<_, i32>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (hash_id, text_id, positions_raw) = row?;
            postings.push(Posting {
                hash_id,
                text_id,
                positions: parse_positions(&positions_raw),
            });
        }
    }

    debug!(
        terms = hashes.len(),
        distinct = unique.len(),
        postings = postings.len(),
        "index read complete"
    );

    Ok(Some(QueryPostings { hash_ids, postings }))
}

/// Parse the VARCHAR rendering of an `INTEGER[]` column (`[0, 3, 7]`).
fn parse_positions(raw: &str) -> Vec<i32> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Corpus totals from `word_counts`, for front-end banners and logging.
#[derive(Debug, Clone, Copy)]
pub struct IndexStats {
    pub texts_total: i64,
    pub words_total: i64,
}

/// Count indexed texts and words.
pub fn index_stats(conn: &Connection) -> Result<IndexStats> {
    let stats = conn.query_row(
        "SELECT
            COUNT(text_id),
            CAST(COALESCE(SUM(words_total), 0) AS BIGINT)
         FROM word_counts",
        [],
        |row| {
            Ok(IndexStats {
                texts_total: row.get(0)?,
                words_total: row.get(1)?,
            })
        },
    )?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn positions_round_trip_from_varchar() {
        check!(parse_positions("[0, 3, 7]") == vec![0, 3, 7]);
        check!(parse_positions("[5]") == vec![5]);
        check!(parse_positions("[]") == Vec::<i32>::new());
    }

    #[test]
    fn distinct_ids_collapse_repeated_terms() {
        let postings = QueryPostings {
            hash_ids: vec![7, 9, 7],
            postings: Vec::new(),
        };
        check!(postings.distinct_ids() == 2);
    }

    #[test]
    fn empty_requests_resolve_to_none() {
        let conn = Connection::open_in_memory().unwrap();
        create_index(&conn, 2).unwrap();
        check!(read_index(&conn, 2, &[]).unwrap().is_none());
    }

    #[test]
    fn unknown_hashes_resolve_to_none() {
        let conn = Connection::open_in_memory().unwrap();
        create_index(&conn, 2).unwrap();
        let hashes = vec![crate::hash::hash_word("unseen")];
        check!(read_index(&conn, 2, &hashes).unwrap().is_none());
    }

    #[test]
    fn schema_creation_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_index(&conn, 4).unwrap();
        create_index(&conn, 4).unwrap();
        let stats = index_stats(&conn).unwrap();
        check!(stats.texts_total == 0);
        check!(stats.words_total == 0);
    }
}
