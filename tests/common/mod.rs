//! Shared fixtures: throwaway database pairs and a tiny corpus helper.
//!
//! DuckDB allows one live instance per database file, so every helper opens
//! a connection, does its work, and drops it before returning.

#![allow(dead_code)]

use std::path::PathBuf;

use duckdb::Connection;
use lexshard::search::{SearchHit, SearchMode, run_search};
use lexshard::text_store::{Document, TextMatch};
use lexshard::{Stopwords, hash, index_store, indexer, text_store};
use rstest::fixture;
use tempfile::TempDir;

pub const INDEX_BINS: u32 = 8;
pub const TEXT_BINS: u32 = 8;
pub const BATCH_MAXIMUM: usize = 1_000;

/// A fresh pair of index and text databases in a temp directory.
pub struct Corpus {
    _dir: TempDir,
    pub index_db: PathBuf,
    pub text_db: PathBuf,
}

#[fixture]
pub fn corpus() -> Corpus {
    Corpus::new()
}

impl Corpus {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let index_db = dir.path().join("index.db");
        let text_db = dir.path().join("texts.db");

        {
            let conn = Connection::open(&index_db).expect("open index db");
            index_store::create_index(&conn, INDEX_BINS).expect("create index schema");
        }
        {
            let conn = Connection::open(&text_db).expect("open text db");
            text_store::create_text_db(&conn, TEXT_BINS).expect("create text schema");
        }

        Self {
            _dir: dir,
            index_db,
            text_db,
        }
    }

    /// The stopword set used throughout the scenarios.
    pub fn stopwords() -> Stopwords {
        Stopwords::from_words(["the", "a", "is", "е"])
    }

    /// Store and index `texts` with sequence-assigned ids; returns the ids.
    pub fn index_texts(&self, texts: &[&str]) -> Vec<i32> {
        self.index_texts_with(texts, &Self::stopwords())
    }

    /// Store and index `texts` with a caller-chosen stopword set.
    pub fn index_texts_with(&self, texts: &[&str], stopwords: &Stopwords) -> Vec<i32> {
        let text_ids;
        {
            let mut conn = Connection::open(&self.text_db).expect("open text db");
            text_ids = text_store::next_text_ids(&conn, texts.len()).expect("draw ids");

            let documents: Vec<Document> = text_ids
                .iter()
                .zip(texts)
                .map(|(text_id, text)| Document {
                    text_id: *text_id,
                    title: format!("text {text_id}"),
                    date: "2024-06-01".to_string(),
                    text: (*text).to_string(),
                })
                .collect();
            text_store::write_batch(&mut conn, TEXT_BINS, &documents).expect("write texts");
        }

        let owned: Vec<String> = texts.iter().map(ToString::to_string).collect();
        indexer::write_batch(
            &self.index_db,
            &text_ids,
            &owned,
            INDEX_BINS,
            stopwords,
            BATCH_MAXIMUM,
        )
        .expect("index batch");

        text_ids
    }

    /// Hash, resolve, and rank a query; `None` mirrors the engine's no-match
    /// result.
    pub fn search(&self, query: &str, mode: SearchMode, limit: usize) -> Option<Vec<SearchHit>> {
        let conn = Connection::open(&self.index_db).expect("open index db");
        let hashes = hash::hash_query(&Self::stopwords(), query);
        let postings = index_store::read_index(&conn, INDEX_BINS, &hashes).expect("read index")?;
        run_search(&conn, &postings, mode, limit).expect("rank")
    }

    /// Full pipeline: search, then pull the matched documents.
    pub fn search_texts(
        &self,
        query: &str,
        mode: SearchMode,
        limit: usize,
    ) -> Option<Vec<TextMatch>> {
        let hits = self.search(query, mode, limit)?;
        let conn = Connection::open(&self.text_db).expect("open text db");
        text_store::read_texts(&conn, TEXT_BINS, &hits).expect("read texts")
    }

    /// Every stored posting across all bins as `(hash, text_id, positions)`,
    /// resolved back through the bin dictionaries.
    pub fn all_postings(&self) -> Vec<(String, i32, Vec<i32>)> {
        let conn = Connection::open(&self.index_db).expect("open index db");
        let mut rows = Vec::new();

        for bin in 1..=INDEX_BINS {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT hd.hash, hi.text_id, CAST(hi.positions AS VARCHAR)
                     FROM bin_{bin}_hash_index AS hi
                     JOIN bin_{bin}_hash_dict AS hd ON hd.hash_id = hi.hash_id"
                ))
                .expect("prepare postings scan");
            let bin_rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i32>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .expect("scan postings");
            for row in bin_rows {
                let (hash, text_id, positions) = row.expect("postings row");
                let positions: Vec<i32> = serde_json::from_str(&positions).expect("positions");
                rows.push((hash, text_id, positions));
            }
        }

        rows.sort();
        rows
    }

    /// `words_total` per text id from the `word_counts` table.
    pub fn word_counts(&self) -> Vec<(i32, i32)> {
        let conn = Connection::open(&self.index_db).expect("open index db");
        let mut stmt = conn
            .prepare("SELECT text_id, words_total FROM word_counts ORDER BY text_id")
            .expect("prepare word_counts");
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .expect("scan word_counts");
        rows.map(|row| row.expect("word_counts row")).collect()
    }
}
