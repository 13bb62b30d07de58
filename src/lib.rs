//! Cinequote: TF-IDF retrieval over quote and movie corpora
//!
//! This crate cleans scraped quotes and crawled movie records, fits TF-IDF
//! vector indexes over their text fields, and answers keyword, tag, genre
//! and weighted hybrid queries against them.
//!
//! # Quick Start
//!
//! ```rust
//! use cinequote::{
//!     attribute::AttributeSet,
//!     index::{StopWords, VectorizerConfig},
//!     pipeline::QuoteSearcher,
//!     Quote,
//! };
//!
//! let quotes = vec![
//!     Quote::new("q0", "The cat sat on the mat.", "Anon", "cats"),
//!     Quote::new("q1", "A dog barked at night.", "Anon", "dogs"),
//!     Quote::new("q2", "The cat chased the dog.", "Anon", "cats, dogs"),
//! ];
//!
//! let config = VectorizerConfig::default().with_stop_words(StopWords::English);
//! let searcher = QuoteSearcher::build(quotes, &config).unwrap();
//!
//! // Keyword search (the query is normalized first)
//! let hits = searcher.search("Cat!", 2).unwrap();
//! assert_eq!(hits.len(), 2);
//! assert!(hits.iter().all(|h| h.record.clean_text.contains("cat")));
//!
//! // Tag recommendation: score is the number of shared tags
//! let recommended = searcher.recommend_by_tags(&AttributeSet::parse("cats, dogs"));
//! assert_eq!(recommended[0].record.id.as_str(), "q2");
//! ```
//!
//! # Movie search
//!
//! [`pipeline::MovieSearcher`] indexes titles (unigrams and bigrams) and
//! synopses separately and fuses them with genre overlap:
//! `0.4 * title + 0.4 * synopsis + 0.2 * genre`.
//!
//! ```rust
//! use cinequote::{
//!     attribute::AttributeSet,
//!     config::VectorizerSettings,
//!     pipeline::{HybridQuery, MovieSearcher},
//!     Movie,
//! };
//!
//! let movies = vec![
//!     Movie::new("1", "Toy Story", "Toys come alive.", "Animation, Comedy"),
//!     Movie::new("2", "Toy Soldiers", "Students fight back.", "Action"),
//!     Movie::new("3", "Space Jam", "Basketball in space.", "Animation"),
//! ];
//! let settings = VectorizerSettings::default();
//! let searcher = MovieSearcher::build(movies, &settings.titles, &settings.overviews).unwrap();
//!
//! let query = HybridQuery::new(2)
//!     .with_title("toy")
//!     .with_genres(AttributeSet::parse("Animation"));
//! let hits = searcher.search_hybrid(&query).unwrap();
//! assert_eq!(hits[0].record.title, "Toy Story");
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::float_cmp)]

pub mod attribute;
pub mod bundle;
pub mod config;
pub mod corpus;
pub mod error;
pub mod fusion;
pub mod index;
pub mod pipeline;
pub mod preprocess;
pub mod retrieve;

pub use attribute::{AttributeMatcher, AttributeSet};
pub use bundle::{Compression, IndexBundle};
pub use config::Settings;
pub use corpus::{Movie, Quote, Record};
pub use error::{Error, Result};
pub use fusion::HybridScorer;
pub use index::{SparseVector, TfidfIndex, TfidfVectorizer, VectorizerConfig};
pub use pipeline::{HybridQuery, IndexHandle, MovieSearcher, QuoteSearcher};
pub use preprocess::TextNormalizer;
pub use retrieve::Hit;

/// Document identifier
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create an identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
