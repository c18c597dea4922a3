//! Deterministic shard routing.
//!
//! A word hash lives in exactly one index bin and a document in exactly one
//! text bin. Both mappings are pure functions of the key and the bin count,
//! so any process that agrees on the bin counts agrees on the layout without
//! coordination. Bins are numbered from 1 to match the table names.

use crate::error::QueryError;

/// Route a hex word hash to its index bin: `(int(hash, 16) mod bins) + 1`.
///
/// The full digest is interpreted as an unsigned big integer; the remainder
/// is computed by Horner-style reduction over the hex digits so no big
/// integer arithmetic is needed.
pub fn index_shard(hash_hex: &str, index_bins: u32) -> Result<u32, QueryError> {
    if hash_hex.is_empty() {
        return Err(QueryError::MalformedHash {
            hash: hash_hex.to_string(),
        });
    }

    let modulus = u64::from(index_bins);
    let mut remainder: u64 = 0;

    for c in hash_hex.chars() {
        let digit = c.to_digit(16).ok_or_else(|| QueryError::MalformedHash {
            hash: hash_hex.to_string(),
        })?;
        remainder = (remainder * 16 + u64::from(digit)) % modulus;
    }

    Ok(remainder as u32 + 1)
}

/// Route a document id to its text bin: `(text_id mod bins) + 1`.
pub fn text_shard(text_id: i32, text_bins: u32) -> u32 {
    text_id.rem_euclid(text_bins as i32) as u32 + 1
}
