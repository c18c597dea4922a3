//! SQL literal and identifier builders.
//!
//! The sharded schema makes table names and some literal lists part of the
//! query text itself (one table per bin, staged batches inserted as VALUES
//! rows), so all string construction funnels through this module. Table
//! names are derived from validated bin numbers, strings go through
//! quote-doubling, and integer lists are formatted from typed slices; no
//! caller-supplied text is ever spliced into a statement verbatim.

use std::fmt::Write;

/// Dictionary table of an index bin: `bin_<k>_hash_dict`.
pub(crate) fn dict_table(bin: u32) -> String {
    format!("bin_{bin}_hash_dict")
}

/// Postings table of an index bin: `bin_<k>_hash_index`.
pub(crate) fn postings_table(bin: u32) -> String {
    format!("bin_{bin}_hash_index")
}

/// Text table of a text bin: `texts_bin_<k>`.
pub(crate) fn texts_table(bin: u32) -> String {
    format!("texts_bin_{bin}")
}

/// Quote a string literal, doubling any embedded single quotes.
pub(crate) fn quote_str(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' {
            quoted.push('\'');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

/// Format an `INTEGER[]` literal: `[0, 3, 7]`.
pub(crate) fn int_list(values: &[i32]) -> String {
    let mut list = String::from("[");
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            list.push_str(", ");
        }
        let _ = write!(list, "{v}");
    }
    list.push(']');
    list
}

/// Format the body of an `IN (...)` list of quoted strings.
pub(crate) fn in_list_str<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .map(quote_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format the body of an `IN (...)` list of integers.
pub(crate) fn in_list_i32<I>(values: I) -> String
where
    I: IntoIterator<Item = i32>,
{
    values
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format a `LIMIT` clause; a limit of 0 means unlimited and produces none.
pub(crate) fn limit_clause(limit: usize) -> String {
    if limit > 0 {
        format!("\nLIMIT {limit}")
    } else {
        String::new()
    }
}
