//! The batch indexer: tokenize, hash, and write postings for a document batch.
//!
//! A batch moves through fixed phases:
//!
//! 1. Tokenize and stopword-filter every document.
//! 2. Cut the documents into sub-batches bounded by a total word budget,
//!    which caps the peak memory of the hashing phase.
//! 3. Hash the sub-batches in parallel. Each worker emits per-document word
//!    counts and, grouped by destination bin, one staged posting per
//!    (document, hash) pair carrying the ascending position list.
//! 4. Merge the per-bin groups from all workers.
//! 5. Insert `word_counts` in its own transaction.
//! 6. Write the bins, split across writer threads over *disjoint* bin
//!    subsets. Every bin is written inside one transaction that assigns
//!    `hash_id`s to previously unseen hashes from the global sequence before
//!    inserting the postings through the dictionary, so a posting can never
//!    reference an id its bin does not know.
//! 7. Checkpoint the database.
//!
//! The global sequence is the sole source of id uniqueness; writers on
//! disjoint bins cannot collide because routing sends each hash to exactly
//! one bin. Any worker error fails the whole batch; bins committed by
//! earlier sub-batches stay, which is why the caller treats a failed batch as
//! retryable from its own checkpoint, not as corruption.

use std::path::Path;
use std::thread;
use std::time::Instant;

use ahash::AHashMap;
use duckdb::Connection;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{ConfigError, Error, IngestError, Result};
use crate::hash::hash_word;
use crate::shard::index_shard;
use crate::sql;
use crate::stopwords::Stopwords;
use crate::tokenize::tokenize_filtered;

/// Staged posting rows inserted per statement while loading a bin.
const INSERT_CHUNK_ROWS: usize = 1024;

/// What a completed batch wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub texts_written: usize,
    pub words_written: usize,
}

/// A posting that has not met the dictionary yet: still keyed by hash.
struct StagedPosting {
    hash: String,
    text_id: i32,
    positions: Vec<i32>,
}

/// One memory-bounded hashing unit.
struct SubBatch {
    text_ids: Vec<i32>,
    word_lists: Vec<Vec<String>>,
}

/// Output of hashing one sub-batch.
struct HashedSubBatch {
    word_counts: Vec<(i32, i32)>,
    words_total: usize,
    bins: AHashMap<u32, Vec<StagedPosting>>,
}

/// Tokenize, hash, and durably index a document batch.
///
/// `text_ids` and `texts` are parallel slices; `batch_maximum` is the word
/// budget of one hashing sub-batch. Returns the number of texts and hashed
/// words written.
pub fn write_batch(
    index_db_path: &Path,
    text_ids: &[i32],
    texts: &[String],
    index_bins: u32,
    stopwords: &Stopwords,
    batch_maximum: usize,
) -> Result<BatchSummary> {
    if text_ids.len() != texts.len() {
        return Err(IngestError::LengthMismatch {
            text_ids: text_ids.len(),
            texts: texts.len(),
        }
        .into());
    }
    if !index_db_path.exists() {
        return Err(ConfigError::DatabaseNotFound {
            path: index_db_path.to_path_buf(),
        }
        .into());
    }
    if text_ids.is_empty() {
        return Ok(BatchSummary {
            texts_written: 0,
            words_written: 0,
        });
    }

    let started = Instant::now();

    // Phase 1+2: tokenize, then cut into word-budgeted sub-batches.
    let word_lists: Vec<Vec<String>> = texts
        .iter()
        .map(|text| tokenize_filtered(text, stopwords))
        .collect();
    let sub_batches = split_sub_batches(text_ids, word_lists, batch_maximum);

    debug!(
        texts = text_ids.len(),
        sub_batches = sub_batches.len(),
        "hashing batch"
    );

    // Phase 3: parallel hashing.
    let hashed: Vec<HashedSubBatch> = sub_batches
        .into_par_iter()
        .map(|sub_batch| hash_sub_batch(&sub_batch, index_bins))
        .collect::<Result<_>>()?;

    // Phase 4: single-writer merge of the per-bin groups.
    let mut word_counts: Vec<(i32, i32)> = Vec::with_capacity(text_ids.len());
    let mut words_written = 0usize;
    let mut bins: AHashMap<u32, Vec<StagedPosting>> = AHashMap::new();
    for sub_batch in hashed {
        word_counts.extend(sub_batch.word_counts);
        words_written += sub_batch.words_total;
        for (bin, mut rows) in sub_batch.bins {
            bins.entry(bin).or_default().append(&mut rows);
        }
    }

    let conn = Connection::open(index_db_path)?;
    conn.execute_batch("SET preserve_insertion_order = false")?;

    // Phase 5: word counts, committed on their own.
    write_word_counts(&conn, &word_counts)?;

    // Phase 6: bin writes, split across writer threads over disjoint bins.
    // A batch of stopword-only documents stages nothing.
    let mut bin_groups: Vec<(u32, Vec<StagedPosting>)> = bins.into_iter().collect();
    bin_groups.sort_unstable_by_key(|(bin, _)| *bin);

    if bin_groups.is_empty() {
        conn.execute_batch("CHECKPOINT")?;
        return Ok(BatchSummary {
            texts_written: text_ids.len(),
            words_written,
        });
    }

    let writer_count = thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1)
        .min(bin_groups.len().max(1));
    let group_size = bin_groups.len().div_ceil(writer_count);

    let mut writer_conns = Vec::with_capacity(writer_count);
    for _ in 0..writer_count {
        writer_conns.push(conn.try_clone()?);
    }

    let outcomes: Vec<Result<()>> = thread::scope(|scope| {
        let mut handles = Vec::new();
        for (writer_conn, group) in writer_conns.into_iter().zip(bin_groups.chunks(group_size)) {
            handles.push(scope.spawn(move || write_bin_group(writer_conn, group)));
        }
        handles
            .into_iter()
            .map(|handle| handle.join().expect("bin writer thread panicked"))
            .collect()
    });
    for outcome in outcomes {
        outcome?;
    }

    // Phase 7: flush everything to the database file.
    conn.execute_batch("CHECKPOINT")?;

    info!(
        texts = text_ids.len(),
        words = words_written,
        elapsed = ?started.elapsed(),
        "batch indexed"
    );

    Ok(BatchSummary {
        texts_written: text_ids.len(),
        words_written,
    })
}

/// Cut documents into sub-batches whose combined word count stays within
/// `batch_maximum`. A single document larger than the budget gets a
/// sub-batch of its own.
fn split_sub_batches(
    text_ids: &[i32],
    word_lists: Vec<Vec<String>>,
    batch_maximum: usize,
) -> Vec<SubBatch> {
    let mut sub_batches = Vec::new();
    let mut current = SubBatch {
        text_ids: Vec::new(),
        word_lists: Vec::new(),
    };
    let mut current_words = 0usize;

    for (text_id, word_list) in text_ids.iter().zip(word_lists) {
        let words = word_list.len();
        if !current.text_ids.is_empty() && current_words + words > batch_maximum {
            sub_batches.push(std::mem::replace(
                &mut current,
                SubBatch {
                    text_ids: Vec::new(),
                    word_lists: Vec::new(),
                },
            ));
            current_words = 0;
        }
        current.text_ids.push(*text_id);
        current.word_lists.push(word_list);
        current_words += words;
    }

    if !current.text_ids.is_empty() {
        sub_batches.push(current);
    }

    sub_batches
}

/// Hash every word of a sub-batch and group the resulting postings by bin.
///
/// Emits exactly one staged posting per (document, hash) pair; repeated
/// occurrences of a word extend its position list instead of adding rows.
fn hash_sub_batch(sub_batch: &SubBatch, index_bins: u32) -> Result<HashedSubBatch> {
    let mut word_counts = Vec::with_capacity(sub_batch.text_ids.len());
    let mut words_total = 0usize;
    let mut bins: AHashMap<u32, Vec<StagedPosting>> = AHashMap::new();

    for (text_id, word_list) in sub_batch.text_ids.iter().zip(&sub_batch.word_lists) {
        word_counts.push((*text_id, word_list.len() as i32));
        words_total += word_list.len();

        let mut positions: AHashMap<String, Vec<i32>> = AHashMap::new();
        for (position, word) in word_list.iter().enumerate() {
            positions
                .entry(hash_word(word))
                .or_default()
                .push(position as i32);
        }

        for (hash, positions) in positions {
            let bin = index_shard(&hash, index_bins)?;
            bins.entry(bin).or_default().push(StagedPosting {
                hash,
                text_id: *text_id,
                positions,
            });
        }
    }

    Ok(HashedSubBatch {
        word_counts,
        words_total,
        bins,
    })
}

/// Insert the batch's `word_counts` rows in one transaction.
fn write_word_counts(conn: &Connection, word_counts: &[(i32, i32)]) -> Result<()> {
    conn.execute_batch("BEGIN TRANSACTION")?;
    {
        let mut stmt = conn.prepare("INSERT INTO word_counts VALUES (?, ?)")?;
        for (text_id, words_total) in word_counts {
            stmt.execute(duckdb::params![text_id, words_total])?;
        }
    }
    conn.execute_batch("COMMIT")?;
    Ok(())
}

/// Write every bin in a group, one transaction per bin.
fn write_bin_group(mut conn: Connection, group: &[(u32, Vec<StagedPosting>)]) -> Result<()> {
    for (bin, rows) in group {
        write_bin(&mut conn, *bin, rows).map_err(|source| {
            Error::Ingest(IngestError::ShardWrite {
                shard: *bin,
                source,
            })
        })?;
        debug!(bin, postings = rows.len(), "bin written");
    }
    Ok(())
}

/// Load one bin: stage the batch postings, give unseen hashes ids from the
/// global sequence, then insert the postings through the dictionary.
///
/// Everything happens inside a single transaction so the postings insert can
/// never observe a dictionary missing one of its hashes.
fn write_bin(
    conn: &mut Connection,
    bin: u32,
    rows: &[StagedPosting],
) -> std::result::Result<(), duckdb::Error> {
    let dict = sql::dict_table(bin);
    let postings = sql::postings_table(bin);
    let stage = format!("batch_postings_{bin}");

    let tx = conn.transaction()?;

    tx.execute_batch(&format!(
        "CREATE OR REPLACE TEMP TABLE {stage} (
            hash      VARCHAR,
            text_id   INTEGER,
            positions INTEGER[]
        )"
    ))?;

    for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
        let values = chunk
            .iter()
            .map(|row| {
                format!(
                    "({}, {}, {})",
                    sql::quote_str(&row.hash),
                    row.text_id,
                    sql::int_list(&row.positions)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        tx.execute_batch(&format!("INSERT INTO {stage} VALUES {values}"))?;
    }

    // Unseen hashes draw from the global sequence. The batch may repeat a
    // hash across documents, so collapse it before the set difference.
    tx.execute_batch(&format!(
        "INSERT INTO {dict}
         SELECT hash, NEXTVAL('hash_id_sequence') AS hash_id
         FROM (
             SELECT hash FROM {stage} GROUP BY hash
             EXCEPT
             SELECT hash FROM {dict}
         ) AS unknown_hashes"
    ))?;

    tx.execute_batch(&format!(
        "INSERT INTO {postings}
         SELECT
             hd.hash_id AS hash_id,
             bp.text_id AS text_id,
             bp.positions AS positions
         FROM
             {stage} AS bp
             INNER JOIN {dict} AS hd
                 ON hd.hash = bp.hash"
    ))?;

    tx.execute_batch(&format!("DROP TABLE {stage}"))?;
    tx.commit()
}
