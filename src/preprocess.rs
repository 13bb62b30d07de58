//! Text normalization applied to corpus fields and queries before vectorizing.
//!
//! The normalizer lowercases, replaces everything outside `[a-zA-Z ]` with a
//! space, splits on whitespace, drops English stopwords and joins the
//! remaining tokens with single spaces. It is pure and idempotent.

use std::collections::HashSet;

/// English stopword list (NLTK). Entries containing apostrophes are left out:
/// the normalizer turns `'` into a space before the stopword check, so those
/// forms can never be seen.
pub const ENGLISH_STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
    "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
    "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
    "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
    "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
    "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by",
    "for", "with", "about", "against", "between", "into", "through", "during", "before",
    "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over",
    "under", "again", "further", "then", "once", "here", "there", "when", "where", "why",
    "how", "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
    "nor", "not", "only", "own", "same", "so", "than", "too", "very", "s", "t", "can", "will",
    "just", "don", "should", "now", "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren",
    "couldn", "didn", "doesn", "hadn", "hasn", "haven", "isn", "ma", "mightn", "mustn",
    "needn", "shan", "shouldn", "wasn", "weren", "won", "wouldn",
];

/// Cleans raw text into the token stream the vector indexes are built from.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    stopwords: HashSet<String>,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextNormalizer {
    /// Create a normalizer using the English stopword list
    #[must_use]
    pub fn new() -> Self {
        Self {
            stopwords: english_stopwords(),
        }
    }

    /// Replace the stopword set
    #[must_use]
    pub fn with_stopwords(mut self, stopwords: HashSet<String>) -> Self {
        self.stopwords = stopwords;
        self
    }

    /// Check whether a (lowercase) token is a stopword
    #[must_use]
    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    /// Normalize a piece of text
    #[must_use]
    pub fn normalize(&self, text: &str) -> String {
        let lowered: String = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphabetic() || c == ' ' { c } else { ' ' })
            .collect();

        lowered
            .split_whitespace()
            .filter(|token| !self.stopwords.contains(*token))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Normalize a possibly missing value; missing yields an empty string
    #[must_use]
    pub fn normalize_opt(&self, text: Option<&str>) -> String {
        text.map(|t| self.normalize(t)).unwrap_or_default()
    }
}

/// The English stopword list as an owned set
#[must_use]
pub fn english_stopwords() -> HashSet<String> {
    ENGLISH_STOPWORDS.iter().map(|s| (*s).to_string()).collect()
}

/// Normalize with the default English stopword list
#[must_use]
pub fn normalize(text: &str) -> String {
    TextNormalizer::new().normalize(text)
}
