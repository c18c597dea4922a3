mod common;

use assert2::check;
use common::{BATCH_MAXIMUM, Corpus, INDEX_BINS, corpus};
use duckdb::Connection;
use lexshard::cli::parse_corpus_line;
use lexshard::{Error, Stopwords, hash, index_store, indexer, shard};
use rstest::rstest;

// --- Write-path invariants ---

/// `words_total` counts exactly the non-stopword tokens of each document.
#[rstest]
fn word_counts_match_filtered_token_counts(corpus: Corpus) {
    let ids = corpus.index_texts(&[
        "The quick brown fox",      // 3 after "the" is filtered
        "A slow brown dog",         // 3 after "a" is filtered
        "the a is",                 // nothing survives
    ]);

    let counts = corpus.word_counts();
    check!(counts == vec![(ids[0], 3), (ids[1], 3), (ids[2], 0)]);
}

/// The stored position list of every (document, word) pair is the ascending
/// list of its indices in the filtered token sequence.
#[rstest]
fn positions_record_filtered_token_indices(corpus: Corpus) {
    let ids = corpus.index_texts(&["x y the x z y x"]);

    let postings = corpus.all_postings();
    check!(postings.len() == 3);

    let by_hash = |word: &str| {
        postings
            .iter()
            .find(|(hash, _, _)| *hash == hash::hash_word(word))
            .map(|(_, text_id, positions)| (*text_id, positions.clone()))
            .expect("posting exists")
    };

    // "the" is filtered, so the remaining tokens renumber to x=0 y=1 x=2 z=3 y=4 x=5.
    check!(by_hash("x") == (ids[0], vec![0, 2, 5]));
    check!(by_hash("y") == (ids[0], vec![1, 4]));
    check!(by_hash("z") == (ids[0], vec![3]));
}

/// The word-count invariant holds per document: the position lists of a text
/// sum to its `words_total`.
#[rstest]
fn position_lists_sum_to_word_counts(corpus: Corpus) {
    corpus.index_texts(&[
        "one two three two one",
        "ab ab ab",
        "the quick brown fox jumps over",
    ]);

    let mut sums: std::collections::BTreeMap<i32, i32> = std::collections::BTreeMap::new();
    for (_, text_id, positions) in corpus.all_postings() {
        *sums.entry(text_id).or_insert(0) += positions.len() as i32;
    }

    for (text_id, words_total) in corpus.word_counts() {
        check!(sums.get(&text_id).copied().unwrap_or(0) == words_total);
    }
}

/// Every dictionary entry lives in the bin its hash routes to, and every
/// postings row resolves through its own bin's dictionary.
#[rstest]
fn hashes_stay_in_their_routed_bin(corpus: Corpus) {
    corpus.index_texts(&[
        "the quick brown fox jumps over a lazy dog",
        "София е столица на България",
        "numbers 2024 and 1989 are tokens too",
    ]);

    let conn = Connection::open(&corpus.index_db).unwrap();
    for bin in 1..=INDEX_BINS {
        let hashes: Vec<String> = conn
            .prepare(&format!("SELECT hash FROM bin_{bin}_hash_dict"))
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        for hash in hashes {
            check!(shard::index_shard(&hash, INDEX_BINS).unwrap() == bin);
        }

        let orphans: i64 = conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM bin_{bin}_hash_index
                     WHERE hash_id NOT IN (SELECT hash_id FROM bin_{bin}_hash_dict)"
                ),
                [],
                |row| row.get(0),
            )
            .unwrap();
        check!(orphans == 0);
    }
}

/// `hash_id`s never repeat across bins: one global sequence feeds them all.
#[rstest]
fn hash_ids_are_globally_unique(corpus: Corpus) {
    corpus.index_texts(&[
        "alpha beta gamma delta epsilon",
        "zeta eta theta iota kappa",
        "lambda mu nu xi omicron",
    ]);

    let conn = Connection::open(&corpus.index_db).unwrap();
    let mut ids: Vec<i32> = Vec::new();
    for bin in 1..=INDEX_BINS {
        let bin_ids: Vec<i32> = conn
            .prepare(&format!("SELECT hash_id FROM bin_{bin}_hash_dict"))
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        ids.extend(bin_ids);
    }

    let total = ids.len();
    ids.sort_unstable();
    ids.dedup();
    check!(ids.len() == total);
}

/// Indexing a second batch reuses dictionary entries instead of re-assigning
/// ids to known hashes.
#[rstest]
fn known_hashes_keep_their_ids_across_batches(corpus: Corpus) {
    corpus.index_texts(&["brown fox"]);

    let id_of = |corpus: &Corpus, word: &str| -> i32 {
        let conn = Connection::open(&corpus.index_db).unwrap();
        let hash = hash::hash_word(word);
        let bin = shard::index_shard(&hash, INDEX_BINS).unwrap();
        conn.query_row(
            &format!("SELECT hash_id FROM bin_{bin}_hash_dict WHERE hash = '{hash}'"),
            [],
            |row| row.get(0),
        )
        .unwrap()
    };

    let before = id_of(&corpus, "brown");
    corpus.index_texts(&["brown bear"]);
    check!(id_of(&corpus, "brown") == before);

    // Both texts resolve through the shared entry.
    let conn = Connection::open(&corpus.index_db).unwrap();
    let hashes = vec![hash::hash_word("brown")];
    let postings = index_store::read_index(&conn, INDEX_BINS, &hashes)
        .unwrap()
        .expect("resolved");
    check!(postings.postings.len() == 2);
}

/// Hashing a document's own text (with no stopwords anywhere) yields exactly
/// the hash set stored in its postings.
#[rstest]
fn query_hashing_round_trips_with_the_index(corpus: Corpus) {
    let text = "Quick brown foxes jump over lazy dogs in 2024";
    let ids = corpus.index_texts_with(&[text], &Stopwords::empty());

    let queried: std::collections::BTreeSet<String> =
        hash::hash_query(&Stopwords::empty(), text).into_iter().collect();
    let stored: std::collections::BTreeSet<String> = corpus
        .all_postings()
        .into_iter()
        .filter(|(_, text_id, _)| *text_id == ids[0])
        .map(|(hash, _, _)| hash)
        .collect();

    check!(queried == stored);
}

/// A corpus line that is not a valid document surfaces as a typed corpus
/// error carrying the offending line number, not as a generic failure.
#[test]
fn malformed_corpus_lines_surface_as_corpus_errors() {
    let err = parse_corpus_line(7, "{not json").unwrap_err();
    check!(matches!(err, Error::Corpus { line: 7, .. }));

    let err = parse_corpus_line(2, r#"{"title": "no body"}"#).unwrap_err();
    check!(matches!(err, Error::Corpus { line: 2, .. }));

    let doc = parse_corpus_line(
        1,
        r#"{"title": "t", "date": "2024-06-01", "text": "body"}"#,
    )
    .unwrap();
    check!(doc.title == "t");
    check!(doc.date == "2024-06-01");
    check!(doc.text == "body");
}

/// The same documents produce the same posting set no matter how they are
/// split into batches or how small the hashing sub-batches are.
#[rstest]
fn posting_sets_are_batch_order_independent(corpus: Corpus) {
    let texts = [
        "the quick brown fox",
        "ab ab ab",
        "София е столица",
        "numbers 2024 and 1989",
    ];

    // One batch, generous sub-batch budget.
    let one_batch = {
        let ids: Vec<i32> = vec![1, 2, 3, 4];
        let owned: Vec<String> = texts.iter().map(ToString::to_string).collect();
        indexer::write_batch(
            &corpus.index_db,
            &ids,
            &owned,
            INDEX_BINS,
            &Corpus::stopwords(),
            BATCH_MAXIMUM,
        )
        .unwrap();
        corpus.all_postings()
    };

    // Two batches in reverse order, one-word sub-batches.
    let other = Corpus::new();
    {
        let owned: Vec<String> = texts.iter().map(ToString::to_string).collect();
        indexer::write_batch(
            &other.index_db,
            &[3, 4],
            &owned[2..],
            INDEX_BINS,
            &Corpus::stopwords(),
            1,
        )
        .unwrap();
        indexer::write_batch(
            &other.index_db,
            &[1, 2],
            &owned[..2],
            INDEX_BINS,
            &Corpus::stopwords(),
            1,
        )
        .unwrap();
    }

    check!(one_batch == other.all_postings());
    check!(corpus.word_counts().len() == other.word_counts().len());
}
