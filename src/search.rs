//! The three ranking algorithms, expressed in SQL.
//!
//! Each searcher stages the resolved query postings as a session temp table
//! and runs a single statement against it (joined with `word_counts` for the
//! denominator of the score). All three produce the same row shape:
//!
//! ```text
//! (text_id, matching_words, words_total, term_frequency)
//! ```
//!
//! where `term_frequency = matching_words / words_total`, rounded to five
//! decimals and used purely for ranking.
//!
//! The exact-phrase matcher is the offset method: every flattened
//! `(hash_id, position)` row is joined against the query's
//! `(hash_id, expected_offset)` pairs, and `position - expected_offset` is
//! constant across one phrase occurrence. A start position where all `L`
//! offsets are covered is a complete phrase, which handles repeated query
//! terms for free since a repeated term simply carries several expected
//! offsets.

use duckdb::Connection;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::index_store::{Posting, QueryPostings};
use crate::sql;

/// Rows staged per INSERT while materializing the temp table.
const STAGE_CHUNK_ROWS: usize = 512;

/// How matches are ranked when a query has more than one term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Terms must appear as a consecutive sequence.
    ExactPhrase,
    /// Terms may appear anywhere, in any order.
    AnyPosition,
}

/// One ranked search result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub text_id: i32,
    pub matching_words: i64,
    pub words_total: i32,
    pub term_frequency: f64,
}

/// Dispatch to the right searcher for the query shape: a single-term query
/// uses the single-word ranking regardless of the requested mode.
pub fn run_search(
    conn: &Connection,
    postings: &QueryPostings,
    mode: SearchMode,
    limit: usize,
) -> Result<Option<Vec<SearchHit>>> {
    if postings.hash_ids.len() == 1 {
        search_single(conn, postings, limit)
    } else {
        match mode {
            SearchMode::AnyPosition => search_any_position(conn, postings, limit),
            SearchMode::ExactPhrase => search_exact_phrase(conn, postings, limit),
        }
    }
}

/// Rank documents containing a single word by its frequency.
pub fn search_single(
    conn: &Connection,
    postings: &QueryPostings,
    limit: usize,
) -> Result<Option<Vec<SearchHit>>> {
    stage_postings(conn, &postings.postings)?;

    let query = format!(
        "SELECT
            qp.text_id,
            CAST(LEN(FIRST(qp.positions)) AS BIGINT) AS matching_words,
            FIRST(wc.words_total) AS words_total,
            ROUND(matching_words / FIRST(wc.words_total), 5) AS term_frequency
        FROM
            query_postings AS qp
            LEFT JOIN word_counts AS wc
                ON wc.text_id = qp.text_id
        GROUP BY qp.text_id
        ORDER BY term_frequency DESC{limit}",
        limit = sql::limit_clause(limit),
    );

    collect_hits(conn, &query, "single_word")
}

/// Rank documents containing *all* query terms, at any positions, by the
/// total number of matching tokens.
pub fn search_any_position(
    conn: &Connection,
    postings: &QueryPostings,
    limit: usize,
) -> Result<Option<Vec<SearchHit>>> {
    stage_postings(conn, &postings.postings)?;

    let query = format!(
        "WITH
            -- Keep only texts that contain every distinct query term:
            texts_with_all_hashes AS (
                SELECT text_id
                FROM query_postings
                GROUP BY text_id
                HAVING COUNT(DISTINCT hash_id) = {distinct}
            ),

            matched AS (
                SELECT
                    qp.text_id,
                    LEN(qp.positions) AS positions_total
                FROM
                    query_postings AS qp
                    INNER JOIN texts_with_all_hashes AS twa
                        ON twa.text_id = qp.text_id
            )

        SELECT
            m.text_id,
            CAST(SUM(m.positions_total) AS BIGINT) AS matching_words,
            FIRST(wc.words_total) AS words_total,
            ROUND(matching_words / FIRST(wc.words_total), 5) AS term_frequency
        FROM
            matched AS m
            LEFT JOIN word_counts AS wc
                ON wc.text_id = m.text_id
        GROUP BY m.text_id
        ORDER BY term_frequency DESC{limit}",
        distinct = postings.distinct_ids(),
        limit = sql::limit_clause(limit),
    );

    collect_hits(conn, &query, "any_position")
}

/// Rank documents containing the query terms as a consecutive sequence.
pub fn search_exact_phrase(
    conn: &Connection,
    postings: &QueryPostings,
    limit: usize,
) -> Result<Option<Vec<SearchHit>>> {
    stage_postings(conn, &postings.postings)?;

    let phrase_len = postings.hash_ids.len();
    let offsets = postings
        .hash_ids
        .iter()
        .enumerate()
        .map(|(offset, hash_id)| format!("({hash_id}, {offset})"))
        .collect::<Vec<_>>()
        .join(", ");

    let query = format!(
        "WITH
            -- The expected term sequence, as (hash_id, offset-from-start):
            query_offsets (hash_id, expected_offset) AS (
                VALUES {offsets}
            ),

            -- Keep only texts that contain every distinct query term:
            texts_with_all_hashes AS (
                SELECT text_id
                FROM query_postings
                GROUP BY text_id
                HAVING COUNT(DISTINCT hash_id) = {distinct}
            ),

            -- Flatten position arrays into individual rows:
            token_positions AS (
                SELECT
                    qp.hash_id,
                    qp.text_id,
                    UNNEST(qp.positions) AS position
                FROM
                    query_postings AS qp
                    INNER JOIN texts_with_all_hashes AS twa
                        ON twa.text_id = qp.text_id
            ),

            -- A phrase starting at p puts term k at position p + k, so
            -- position - expected_offset is the candidate start. A start
            -- covered by all {phrase_len} offsets is a complete occurrence:
            phrase_starts AS (
                SELECT
                    tp.text_id,
                    tp.position - qo.expected_offset AS phrase_start
                FROM
                    token_positions AS tp
                    INNER JOIN query_offsets AS qo
                        ON qo.hash_id = tp.hash_id
                GROUP BY
                    tp.text_id,
                    phrase_start
                HAVING COUNT(DISTINCT qo.expected_offset) = {phrase_len}
            )

        SELECT
            ps.text_id,
            CAST(COUNT(*) * {phrase_len} AS BIGINT) AS matching_words,
            FIRST(wc.words_total) AS words_total,
            ROUND(matching_words / FIRST(wc.words_total), 5) AS term_frequency
        FROM
            phrase_starts AS ps
            LEFT JOIN word_counts AS wc
                ON wc.text_id = ps.text_id
        GROUP BY ps.text_id
        ORDER BY term_frequency DESC{limit}",
        distinct = postings.distinct_ids(),
        limit = sql::limit_clause(limit),
    );

    collect_hits(conn, &query, "exact_phrase")
}

/// Materialize postings as the session temp table `query_postings`.
fn stage_postings(conn: &Connection, postings: &[Posting]) -> Result<()> {
    conn.execute_batch(
        "CREATE OR REPLACE TEMP TABLE query_postings (
            hash_id   INTEGER,
            text_id   INTEGER,
            positions INTEGER[]
        )",
    )?;

    for chunk in postings.chunks(STAGE_CHUNK_ROWS) {
        let values = chunk
            .iter()
            .map(|p| {
                format!(
                    "({}, {}, {})",
                    p.hash_id,
                    p.text_id,
                    sql::int_list(&p.positions)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute_batch(&format!("INSERT INTO query_postings VALUES {values}"))?;
    }

    Ok(())
}

/// Run a ranking query, translating an empty result set to `None`.
fn collect_hits(conn: &Connection, query: &str, searcher: &str) -> Result<Option<Vec<SearchHit>>> {
    let mut stmt = conn.prepare(query)?;
    let rows = stmt.query_map([], |row| {
        Ok(SearchHit {
            text_id: row.get(0)?,
            matching_words: row.get(1)?,
            words_total: row.get(2)?,
            term_frequency: row.get(3)?,
        })
    })?;

    let mut hits = Vec::new();
    for row in rows {
        hits.push(row?);
    }

    debug!(searcher, hits = hits.len(), "ranking complete");

    if hits.is_empty() {
        Ok(None)
    } else {
        Ok(Some(hits))
    }
}
