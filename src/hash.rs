//! Word hashing.
//!
//! Tokens are never stored in the index as plain text: each one is mapped to
//! the lowercase hex digest of BLAKE2b with a 32-byte output. The digest is
//! the dictionary key, the shard-routing input, and the only representation
//! of a word the index ever sees, so it must be byte-for-byte reproducible
//! across runs and machines.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use crate::stopwords::Stopwords;
use crate::tokenize::tokenize_filtered;

type Blake2b256 = Blake2b<U32>;

/// Length of a word hash in hex characters (32 bytes, hex-encoded).
pub const HASH_HEX_LEN: usize = 64;

/// Hash a single normalized token.
pub fn hash_word(word: &str) -> String {
    hex::encode(Blake2b256::digest(word.as_bytes()))
}

/// Tokenize a search request and hash every surviving token, in order.
///
/// Repeated query terms produce repeated hashes; the exact-phrase matcher
/// relies on the duplicates to reconstruct the expected term sequence. An
/// empty result means the query held nothing but stopwords and separators.
pub fn hash_query(stopwords: &Stopwords, query: &str) -> Vec<String> {
    tokenize_filtered(query, stopwords)
        .iter()
        .map(|word| hash_word(word))
        .collect()
}
