//! Stopword sets for the tokenizer.
//!
//! The engine indexes a mixed Bulgarian/English news corpus, so the bundled
//! set is the union of both languages. Callers with other corpora can load a
//! [stopwords-iso](https://github.com/stopwords-iso/stopwords-iso) JSON file
//! instead, or pass an empty set to index every token.
//!
//! Stopwords are matched against the *normalized* token (accent-stripped,
//! lowercase), so the bundled lists are stored in that form.

use std::fs;
use std::path::Path;

use ahash::AHashSet;
use serde_json::Value;

use crate::error::{ConfigError, Error, Result};

/// Common English stopwords, in normalized form.
pub const ENGLISH: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "am", "an", "and", "any", "are", "as", "at",
    "be", "because", "been", "before", "being", "below", "between", "both", "but", "by", "can",
    "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from", "further",
    "had", "has", "have", "having", "he", "her", "here", "hers", "him", "his", "how", "i", "if",
    "in", "into", "is", "it", "its", "itself", "just", "me", "more", "most", "my", "no", "nor",
    "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours", "out", "own",
    "same", "she", "should", "so", "some", "such", "than", "that", "the", "their", "theirs",
    "them", "then", "there", "these", "they", "this", "those", "through", "to", "too", "under",
    "until", "up", "very", "was", "we", "were", "what", "when", "where", "which", "while", "who",
    "whom", "why", "will", "with", "you", "your", "yours",
];

/// Common Bulgarian stopwords, in normalized form.
pub const BULGARIAN: &[&str] = &[
    "а", "ако", "ала", "бе", "без", "беше", "би", "бил", "била", "били", "било", "близо",
    "бъдат", "бъде", "бяха", "в", "вас", "ваш", "ваша", "вече", "ви", "вие", "винаги", "все",
    "всеки", "всички", "всичко", "всяка", "във", "въпреки", "върху", "ги", "го", "д", "да",
    "дали", "до", "докато", "докога", "дори", "досега", "доста", "е", "едва", "един", "една",
    "едно", "ето", "за", "зад", "заедно", "заради", "засега", "затова", "защо", "защото", "и",
    "из", "или", "им", "има", "имат", "иска", "й", "каза", "как", "каква", "какво", "както",
    "какъв", "като", "кога", "когато", "което", "които", "кой", "който", "колко", "която",
    "къде", "където", "към", "ли", "м", "между", "мен", "ми", "много", "мога", "могат", "може",
    "моля", "момента", "му", "н", "на", "над", "назад", "най", "направи", "напред", "например",
    "нас", "не", "него", "нея", "ни", "ние", "никой", "нито", "но", "някои", "някой", "няколко",
    "няма", "обаче", "около", "освен", "особено", "от", "отново", "още", "пак", "по", "повече",
    "повечето", "под", "поне", "поради", "после", "почти", "пред", "преди", "през", "при", "пък",
    "първи", "пъти", "с", "са", "само", "се", "сега", "си", "след", "сме", "според", "сред",
    "срещу", "сте", "съм", "със", "също", "тази", "така", "такива", "такъв", "там", "те",
    "тези", "ти", "то", "това", "тогава", "този", "той", "толкова", "точно", "трябва", "тук",
    "тъй", "тя", "тях", "у", "чрез", "ще", "щом", "я",
];

/// A set of tokens excluded from indexing and querying.
#[derive(Debug, Clone, Default)]
pub struct Stopwords {
    words: AHashSet<String>,
}

impl Stopwords {
    /// An empty set: every token is kept.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The bundled Bulgarian ∪ English union.
    pub fn bundled() -> Self {
        Self::from_words(BULGARIAN.iter().chain(ENGLISH.iter()).copied())
    }

    /// Build a set from arbitrary words.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words.into_iter().map(Into::into).collect(),
        }
    }

    /// Load the union of `languages` from a stopwords-iso JSON file, a map
    /// from ISO 639-1 code to word array.
    pub fn from_json_file(path: &Path, languages: &[&str]) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let parsed: Value =
            serde_json::from_str(&raw).map_err(|source| ConfigError::MalformedStopwords {
                path: path.to_path_buf(),
                source,
            })?;

        let mut words = AHashSet::new();
        for language in languages {
            let Some(entries) = parsed.get(language).and_then(Value::as_array) else {
                continue;
            };
            words.extend(entries.iter().filter_map(Value::as_str).map(str::to_string));
        }

        if words.is_empty() {
            return Err(Error::Config(ConfigError::EmptyStopwords {
                path: path.to_path_buf(),
                languages: languages.iter().map(ToString::to_string).collect(),
            }));
        }

        Ok(Self { words })
    }

    /// Whether `word` (already normalized) is a stopword.
    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;
    use std::io::Write;

    #[test]
    fn bundled_set_covers_both_languages() {
        let stopwords = Stopwords::bundled();
        check!(stopwords.contains("the"));
        check!(stopwords.contains("и"));
        check!(!stopwords.contains("brown"));
        check!(stopwords.len() >= ENGLISH.len());
    }

    #[test]
    fn empty_set_keeps_everything() {
        let stopwords = Stopwords::empty();
        check!(!stopwords.contains("the"));
        check!(stopwords.is_empty());
    }

    #[test]
    fn loads_language_union_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"bg": ["и", "на"], "en": ["the", "a"], "de": ["der"]}}"#
        )
        .unwrap();

        let stopwords = Stopwords::from_json_file(file.path(), &["bg", "en"]).unwrap();
        check!(stopwords.len() == 4);
        check!(stopwords.contains("the"));
        check!(stopwords.contains("на"));
        check!(!stopwords.contains("der"));
    }

    #[test]
    fn rejects_files_without_requested_languages() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"de": ["der"]}}"#).unwrap();

        let result = Stopwords::from_json_file(file.path(), &["bg", "en"]);
        check!(matches!(
            result,
            Err(Error::Config(ConfigError::EmptyStopwords { .. }))
        ));
    }
}
