//! Error types for cinequote

use std::path::PathBuf;
use thiserror::Error;

/// Result type for cinequote operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for indexing and retrieval
#[derive(Error, Debug)]
pub enum Error {
    /// Corpus has no documents, or filtering left an empty vocabulary
    #[error("empty corpus: {0}")]
    EmptyCorpus(String),

    /// Query vector and index live in different vector spaces
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the index
        expected: usize,
        /// Dimension of the offending input
        actual: usize,
    },

    /// Input file does not exist
    #[error("file not found: {}", .0.display())]
    MissingFile(PathBuf),

    /// Input file exists but could not be parsed
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Invalid configuration or vectorizer options
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Query violates a search precondition
    #[error("query error: {0}")]
    Query(String),

    /// Persisted index was built from a different corpus
    #[error("stale index: corpus fingerprint {actual:016x} does not match index {expected:016x}")]
    StaleIndex {
        /// Fingerprint recorded in the bundle
        expected: u64,
        /// Fingerprint of the corpus at hand
        actual: u64,
    },

    /// Bundle encoding error (bincode / compression)
    #[error("encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
