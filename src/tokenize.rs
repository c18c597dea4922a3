//! Text normalization and tokenization.
//!
//! Every string that enters the engine (document bodies at indexing time,
//! query strings at search time) goes through the same pipeline, so the two
//! sides always agree on token boundaries:
//!
//! 1. Unicode NFD decomposition, then removal of combining marks (accents).
//! 2. Lowercasing.
//! 3. Splitting into tokens: a token is a maximal run of alphabetic
//!    characters or a maximal run of numeric characters. Whitespace,
//!    punctuation, and symbols separate tokens and are dropped, so interior
//!    punctuation splits a word while digit runs like `2024` stay whole.
//! 4. Optional stopword filtering.
//!
//! A token's *position* is its index in the filtered output sequence: the
//! stopword filter runs before positions are assigned, which is what makes
//! phrase matching across removed stopwords behave the way the ranking
//! queries expect.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::stopwords::Stopwords;

/// NFD-decompose, strip combining marks, and lowercase `text`.
pub fn normalize(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Split normalized text into surface tokens.
///
/// Assumes `text` has already been through [`normalize`].
fn split_tokens(text: &str) -> Vec<String> {
    #[derive(PartialEq, Clone, Copy)]
    enum Kind {
        Letter,
        Digit,
    }

    fn kind_of(c: char) -> Option<Kind> {
        if c.is_alphabetic() {
            Some(Kind::Letter)
        } else if c.is_numeric() {
            Some(Kind::Digit)
        } else {
            None
        }
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut current_kind: Option<Kind> = None;

    for c in text.chars() {
        let kind = kind_of(c);
        match kind {
            Some(k) if current_kind == Some(k) => current.push(c),
            Some(k) => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                current.push(c);
                current_kind = Some(k);
            }
            None => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                current_kind = None;
            }
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Normalize and tokenize `text`, keeping stopwords.
pub fn tokenize(text: &str) -> Vec<String> {
    split_tokens(&normalize(text))
}

/// Normalize, tokenize, and drop stopwords.
///
/// The index of a token in the returned sequence is its position within the
/// document for the purposes of the postings lists.
pub fn tokenize_filtered(text: &str, stopwords: &Stopwords) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|token| !stopwords.contains(token))
        .collect()
}
