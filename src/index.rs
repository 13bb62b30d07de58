//! TF-IDF vector indexes: vectorizer options, fitting, sparse vectors and matrices.
//!
//! Fitting follows the usual smoothed TF-IDF recipe: raw term counts,
//! `idf = ln((1 + n) / (1 + df)) + 1`, then every row is L2-normalized.
//! Vocabulary columns are assigned in ascending term order, so the same
//! corpus and options always produce the same index.

use crate::{preprocess::ENGLISH_STOPWORDS, Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Default token pattern: runs of two or more word characters
pub const DEFAULT_TOKEN_PATTERN: &str = r"\b\w\w+\b";

/// Stop word filtering applied by the vectorizer after tokenization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopWords {
    /// Keep every token
    #[default]
    None,
    /// NLTK English list, shared with the text normalizer
    English,
    /// Caller-supplied list
    Custom(Vec<String>),
}

impl StopWords {
    fn to_set(&self) -> HashSet<String> {
        match self {
            Self::None => HashSet::new(),
            Self::English => ENGLISH_STOPWORDS.iter().map(|s| (*s).to_string()).collect(),
            Self::Custom(words) => words.iter().cloned().collect(),
        }
    }
}

/// Options controlling how a corpus is turned into a TF-IDF index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizerConfig {
    /// Stop word filter
    pub stop_words: StopWords,
    /// Inclusive (min, max) n-gram lengths
    pub ngram_range: (usize, usize),
    /// Minimum number of documents a term must appear in
    pub min_df: usize,
    /// Keep only the most frequent terms (by corpus term frequency)
    pub max_features: Option<usize>,
    /// Regex defining a token
    pub token_pattern: String,
    /// Lowercase text before tokenizing
    pub lowercase: bool,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            stop_words: StopWords::None,
            ngram_range: (1, 1),
            min_df: 1,
            max_features: None,
            token_pattern: DEFAULT_TOKEN_PATTERN.to_string(),
            lowercase: true,
        }
    }
}

impl VectorizerConfig {
    /// Set the stop word filter
    #[must_use]
    pub fn with_stop_words(mut self, stop_words: StopWords) -> Self {
        self.stop_words = stop_words;
        self
    }

    /// Set the n-gram range
    #[must_use]
    pub fn with_ngram_range(mut self, min: usize, max: usize) -> Self {
        self.ngram_range = (min, max);
        self
    }

    /// Set the minimum document frequency
    #[must_use]
    pub fn with_min_df(mut self, min_df: usize) -> Self {
        self.min_df = min_df;
        self
    }

    /// Cap the vocabulary size
    #[must_use]
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    /// Set the token pattern
    #[must_use]
    pub fn with_token_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.token_pattern = pattern.into();
        self
    }

    /// Toggle lowercasing
    #[must_use]
    pub fn with_lowercase(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    /// Check option ranges (the token pattern is checked when compiled)
    pub fn validate(&self) -> Result<()> {
        let (min_n, max_n) = self.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(Error::InvalidConfig(format!(
                "ngram_range must satisfy 1 <= min <= max, got ({min_n}, {max_n})"
            )));
        }
        if self.min_df == 0 {
            return Err(Error::InvalidConfig("min_df must be at least 1".to_string()));
        }
        if self.max_features == Some(0) {
            return Err(Error::InvalidConfig(
                "max_features must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tokenizer + stop word filter + n-gram expansion
#[derive(Debug, Clone)]
struct Analyzer {
    token_pattern: Regex,
    stopwords: HashSet<String>,
    ngram_range: (usize, usize),
    lowercase: bool,
}

impl Analyzer {
    fn new(config: &VectorizerConfig) -> Result<Self> {
        config.validate()?;
        let token_pattern = Regex::new(&config.token_pattern).map_err(|e| {
            Error::InvalidConfig(format!("invalid token_pattern {:?}: {e}", config.token_pattern))
        })?;
        Ok(Self {
            token_pattern,
            stopwords: config.stop_words.to_set(),
            ngram_range: config.ngram_range,
            lowercase: config.lowercase,
        })
    }

    fn analyze(&self, text: &str) -> Vec<String> {
        let text: Cow<'_, str> = if self.lowercase {
            Cow::Owned(text.to_lowercase())
        } else {
            Cow::Borrowed(text)
        };

        let tokens: Vec<&str> = self
            .token_pattern
            .find_iter(&text)
            .map(|m| m.as_str())
            .filter(|t| !self.stopwords.contains(*t))
            .collect();

        let (min_n, max_n) = self.ngram_range;
        let mut terms = Vec::with_capacity(tokens.len());
        for n in min_n..=max_n.min(tokens.len()) {
            for window in tokens.windows(n) {
                terms.push(window.join(" "));
            }
        }
        terms
    }

    fn term_counts(&self, text: &str) -> HashMap<String, u32> {
        let mut counts: HashMap<String, u32> = HashMap::new();
        for term in self.analyze(text) {
            *counts.entry(term).or_insert(0) += 1;
        }
        counts
    }
}

/// Sparse vector in a fixed-dimension space; indices are strictly increasing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SparseVectorState")]
pub struct SparseVector {
    dimension: usize,
    indices: Vec<u32>,
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct SparseVectorState {
    dimension: usize,
    indices: Vec<u32>,
    values: Vec<f32>,
}

impl TryFrom<SparseVectorState> for SparseVector {
    type Error = Error;

    fn try_from(state: SparseVectorState) -> Result<Self> {
        Self::new(state.dimension, state.indices, state.values)
    }
}

impl SparseVector {
    /// Create a sparse vector from sorted, in-range `(index, value)` pairs
    pub fn new(dimension: usize, indices: Vec<u32>, values: Vec<f32>) -> Result<Self> {
        if indices.len() != values.len() {
            return Err(Error::InvalidFormat(format!(
                "sparse vector has {} indices but {} values",
                indices.len(),
                values.len()
            )));
        }
        if indices.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidFormat(
                "sparse vector indices must be strictly increasing".to_string(),
            ));
        }
        if let Some(&last) = indices.last() {
            if last as usize >= dimension {
                return Err(Error::DimensionMismatch {
                    expected: dimension,
                    actual: last as usize + 1,
                });
            }
        }
        Ok(Self {
            dimension,
            indices,
            values,
        })
    }

    /// All-zero vector
    #[must_use]
    pub fn zeros(dimension: usize) -> Self {
        Self {
            dimension,
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Dimensionality of the space this vector lives in
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Column indices of the non-zero entries
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Values of the non-zero entries
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Number of stored entries
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// True when every entry is zero
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }

    /// Euclidean norm
    #[must_use]
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }
}

/// Compressed sparse row matrix (documents x terms)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseMatrix {
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
    values: Vec<f32>,
}

/// Borrowed view of one matrix row
#[derive(Debug, Clone, Copy)]
pub struct SparseRow<'a> {
    /// Column indices
    pub indices: &'a [u32],
    /// Weights
    pub values: &'a [f32],
}

impl SparseMatrix {
    fn from_rows(rows: Vec<(Vec<u32>, Vec<f32>)>, n_cols: usize) -> Self {
        let nnz = rows.iter().map(|(i, _)| i.len()).sum();
        let mut indptr = Vec::with_capacity(rows.len() + 1);
        let mut indices = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);
        indptr.push(0);
        for (row_indices, row_values) in rows {
            indices.extend(row_indices);
            values.extend(row_values);
            indptr.push(indices.len());
        }
        Self {
            n_cols,
            indptr,
            indices,
            values,
        }
    }

    /// Number of rows (documents)
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.indptr.len().saturating_sub(1)
    }

    /// Number of columns (terms)
    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Number of stored weights
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Row `i`, or `None` when out of range
    #[must_use]
    pub fn row(&self, i: usize) -> Option<SparseRow<'_>> {
        let start = *self.indptr.get(i)?;
        let end = *self.indptr.get(i + 1)?;
        Some(SparseRow {
            indices: &self.indices[start..end],
            values: &self.values[start..end],
        })
    }

    /// Iterate rows in document order
    pub fn rows(&self) -> impl Iterator<Item = SparseRow<'_>> {
        self.indptr.windows(2).map(move |w| SparseRow {
            indices: &self.indices[w[0]..w[1]],
            values: &self.values[w[0]..w[1]],
        })
    }

    fn check(&self) -> Result<()> {
        let consistent = self.indptr.first() == Some(&0)
            && self.indptr.windows(2).all(|w| w[0] <= w[1])
            && self.indptr.last() == Some(&self.indices.len())
            && self.indices.len() == self.values.len()
            && self.indices.iter().all(|&c| (c as usize) < self.n_cols);
        if consistent {
            Ok(())
        } else {
            Err(Error::InvalidFormat("corrupt sparse matrix layout".to_string()))
        }
    }
}

/// Fitted vectorizer state: vocabulary, idf weights and the options used
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ModelState")]
pub struct TfidfModel {
    config: VectorizerConfig,
    vocabulary: BTreeMap<String, u32>,
    idf: Vec<f32>,
    #[serde(skip_serializing)]
    analyzer: Analyzer,
}

/// Wire form of [`TfidfModel`]; field order must match its serialized fields
#[derive(Deserialize)]
struct ModelState {
    config: VectorizerConfig,
    vocabulary: BTreeMap<String, u32>,
    idf: Vec<f32>,
}

impl TryFrom<ModelState> for TfidfModel {
    type Error = Error;

    fn try_from(state: ModelState) -> Result<Self> {
        if state.idf.len() != state.vocabulary.len()
            || state
                .vocabulary
                .values()
                .any(|&col| col as usize >= state.idf.len())
        {
            return Err(Error::InvalidFormat(
                "vocabulary and idf weights disagree".to_string(),
            ));
        }
        let analyzer = Analyzer::new(&state.config)?;
        Ok(Self {
            config: state.config,
            vocabulary: state.vocabulary,
            idf: state.idf,
            analyzer,
        })
    }
}

impl TfidfModel {
    /// Weighted, L2-normalized `(column, weight)` pairs for a bag of terms
    fn weigh(&self, counts: &HashMap<String, u32>) -> (Vec<u32>, Vec<f32>) {
        let mut entries: Vec<(u32, f32)> = counts
            .iter()
            .filter_map(|(term, &count)| {
                self.vocabulary
                    .get(term)
                    .map(|&col| (col, count as f32 * self.idf[col as usize]))
            })
            .collect();
        entries.sort_unstable_by_key(|(col, _)| *col);

        let norm = entries.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for (_, w) in &mut entries {
                *w /= norm;
            }
        }
        entries.into_iter().unzip()
    }
}

/// Builds a [`TfidfIndex`] from a corpus of cleaned strings
#[derive(Debug, Clone, Default)]
pub struct TfidfVectorizer {
    config: VectorizerConfig,
}

impl TfidfVectorizer {
    /// Create a vectorizer with the given options
    #[must_use]
    pub fn new(config: VectorizerConfig) -> Self {
        Self { config }
    }

    /// The options this vectorizer fits with
    #[must_use]
    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    /// Fit the vocabulary and weights, returning the document x term index.
    ///
    /// Row `i` of the resulting matrix corresponds to `corpus[i]`.
    pub fn fit<S: AsRef<str>>(&self, corpus: &[S]) -> Result<TfidfIndex> {
        if corpus.is_empty() {
            return Err(Error::EmptyCorpus("corpus has no documents".to_string()));
        }
        let analyzer = Analyzer::new(&self.config)?;

        let counts: Vec<HashMap<String, u32>> = corpus
            .iter()
            .map(|doc| analyzer.term_counts(doc.as_ref()))
            .collect();

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        let mut term_freq: HashMap<&str, u64> = HashMap::new();
        for doc in &counts {
            for (term, &count) in doc {
                *doc_freq.entry(term.as_str()).or_insert(0) += 1;
                *term_freq.entry(term.as_str()).or_insert(0) += u64::from(count);
            }
        }

        let mut terms: Vec<&str> = doc_freq
            .iter()
            .filter(|(_, &df)| df >= self.config.min_df)
            .map(|(term, _)| *term)
            .collect();

        if let Some(max_features) = self.config.max_features {
            if terms.len() > max_features {
                terms.sort_unstable_by(|a, b| term_freq[b].cmp(&term_freq[a]).then_with(|| a.cmp(b)));
                terms.truncate(max_features);
            }
        }
        terms.sort_unstable();

        if terms.is_empty() {
            return Err(Error::EmptyCorpus(format!(
                "no terms remain after filtering {} documents",
                corpus.len()
            )));
        }

        let n = corpus.len() as f64;
        let idf: Vec<f32> = terms
            .iter()
            .map(|term| {
                let df = doc_freq[term] as f64;
                (((1.0 + n) / (1.0 + df)).ln() + 1.0) as f32
            })
            .collect();
        let vocabulary: BTreeMap<String, u32> = terms
            .iter()
            .enumerate()
            .map(|(col, term)| ((*term).to_string(), col as u32))
            .collect();

        let model = TfidfModel {
            config: self.config.clone(),
            vocabulary,
            idf,
            analyzer,
        };
        let rows: Vec<(Vec<u32>, Vec<f32>)> = counts.iter().map(|doc| model.weigh(doc)).collect();
        let matrix = SparseMatrix::from_rows(rows, model.vocabulary.len());

        tracing::info!(
            documents = matrix.n_rows(),
            features = matrix.n_cols(),
            nnz = matrix.nnz(),
            "fitted tf-idf index"
        );

        Ok(TfidfIndex { model, matrix })
    }
}

/// Fitted vectorizer plus the document x term weight matrix.
///
/// Immutable once built; a changed corpus needs a fresh [`TfidfVectorizer::fit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfIndex {
    model: TfidfModel,
    matrix: SparseMatrix,
}

impl TfidfIndex {
    /// Options the index was fitted with
    #[must_use]
    pub fn config(&self) -> &VectorizerConfig {
        &self.model.config
    }

    /// Term -> column mapping
    #[must_use]
    pub fn vocabulary(&self) -> &BTreeMap<String, u32> {
        &self.model.vocabulary
    }

    /// Column of a term, if it is in the vocabulary
    #[must_use]
    pub fn term_index(&self, term: &str) -> Option<u32> {
        self.model.vocabulary.get(term).copied()
    }

    /// Idf weight per column
    #[must_use]
    pub fn idf(&self) -> &[f32] {
        &self.model.idf
    }

    /// Document x term weights
    #[must_use]
    pub fn matrix(&self) -> &SparseMatrix {
        &self.matrix
    }

    /// Number of indexed documents
    #[must_use]
    pub fn n_documents(&self) -> usize {
        self.matrix.n_rows()
    }

    /// Vocabulary size (vector dimensionality)
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.model.vocabulary.len()
    }

    /// Project text into this index's vector space (L2-normalized)
    #[must_use]
    pub fn transform(&self, text: &str) -> SparseVector {
        let (indices, values) = self.model.weigh(&self.model.analyzer.term_counts(text));
        SparseVector {
            dimension: self.n_features(),
            indices,
            values,
        }
    }

    /// Check internal consistency, e.g. after loading from disk
    pub fn validate(&self) -> Result<()> {
        self.matrix.check()?;
        if self.matrix.n_cols() != self.n_features() {
            return Err(Error::DimensionMismatch {
                expected: self.n_features(),
                actual: self.matrix.n_cols(),
            });
        }
        Ok(())
    }
}
