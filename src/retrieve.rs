//! Similarity search over a fitted [`TfidfIndex`].
//!
//! Scores are cosine similarities clamped into `[0, 1]`. Ranking is a stable
//! descending sort, so equal scores keep corpus order and a larger `top_k`
//! always extends a smaller one.

use crate::{
    index::{SparseRow, SparseVector, TfidfIndex},
    Error, Result,
};
use serde::Serialize;
use std::cmp::Ordering;

/// One ranked search result, borrowing the record it points at.
///
/// Serializes as the record's own fields plus `rank` and `score`.
#[derive(Debug, Clone, Serialize)]
pub struct Hit<'a, T> {
    /// 1-based position in the result list
    pub rank: usize,
    /// Similarity or fused score
    pub score: f32,
    /// The matched record
    #[serde(flatten)]
    pub record: &'a T,
}

impl<'a, T> Hit<'a, T> {
    /// Pair ranked `(row, score)` results with the records they index.
    ///
    /// Rows outside `records` are skipped.
    #[must_use]
    pub fn from_ranked(ranked: &[(usize, f32)], records: &'a [T]) -> Vec<Self> {
        ranked
            .iter()
            .filter_map(|&(row, score)| records.get(row).map(|record| (record, score)))
            .enumerate()
            .map(|(i, (record, score))| Self {
                rank: i + 1,
                score,
                record,
            })
            .collect()
    }
}

fn sparse_dot(a_indices: &[u32], a_values: &[f32], b_indices: &[u32], b_values: &[f32]) -> f32 {
    let (mut i, mut j) = (0, 0);
    let mut sum = 0.0f32;
    while i < a_indices.len() && j < b_indices.len() {
        match a_indices[i].cmp(&b_indices[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                sum += a_values[i] * b_values[j];
                i += 1;
                j += 1;
            }
        }
    }
    sum
}

fn norm(values: &[f32]) -> f32 {
    values.iter().map(|v| v * v).sum::<f32>().sqrt()
}

fn cosine_with_row(query: &SparseVector, query_norm: f32, row: SparseRow<'_>) -> f32 {
    let row_norm = norm(row.values);
    if query_norm == 0.0 || row_norm == 0.0 {
        return 0.0;
    }
    let dot = sparse_dot(query.indices(), query.values(), row.indices, row.values);
    (dot / (query_norm * row_norm)).clamp(0.0, 1.0)
}

/// Cosine similarity of two sparse vectors, clamped into `[0, 1]`.
///
/// Zero vectors score 0.
pub fn cosine_similarity(a: &SparseVector, b: &SparseVector) -> Result<f32> {
    if a.dimension() != b.dimension() {
        return Err(Error::DimensionMismatch {
            expected: a.dimension(),
            actual: b.dimension(),
        });
    }
    let row = SparseRow {
        indices: b.indices(),
        values: b.values(),
    };
    Ok(cosine_with_row(a, a.norm(), row))
}

/// Row indices paired with their scores, stably sorted by descending score
#[must_use]
pub fn rank_descending(scores: &[f32]) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ranked
}

/// Positions of `keys` stably sorted by descending primary, then descending
/// secondary key
#[must_use]
pub fn rank_by_keys<P: PartialOrd, S: PartialOrd>(keys: &[(P, S)]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by(|&a, &b| {
        let (pa, sa) = &keys[a];
        let (pb, sb) = &keys[b];
        pb.partial_cmp(pa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| sb.partial_cmp(sa).unwrap_or(Ordering::Equal))
    });
    order
}

fn check_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(Error::Query("top_k must be at least 1".to_string()));
    }
    Ok(())
}

impl TfidfIndex {
    /// Similarity of every indexed document to the vector, in row order
    pub fn scores_for_vector(&self, query: &SparseVector) -> Result<Vec<f32>> {
        if query.dimension() != self.n_features() {
            return Err(Error::DimensionMismatch {
                expected: self.n_features(),
                actual: query.dimension(),
            });
        }
        let query_norm = query.norm();
        Ok(self
            .matrix()
            .rows()
            .map(|row| cosine_with_row(query, query_norm, row))
            .collect())
    }

    /// Similarity of every indexed document to already-cleaned query text
    #[must_use]
    pub fn scores(&self, query: &str) -> Vec<f32> {
        let vector = self.transform(query);
        let query_norm = vector.norm();
        self.matrix()
            .rows()
            .map(|row| cosine_with_row(&vector, query_norm, row))
            .collect()
    }

    /// Top `top_k` documents for already-cleaned query text.
    ///
    /// A query sharing no terms with the corpus still returns the first
    /// `top_k` rows, each with score 0.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<(usize, f32)>> {
        check_top_k(top_k)?;
        let mut ranked = rank_descending(&self.scores(query));
        ranked.truncate(top_k);
        tracing::debug!(query, top_k, returned = ranked.len(), "tf-idf search");
        Ok(ranked)
    }

    /// Top `top_k` documents for a vector in this index's space
    pub fn search_vector(&self, query: &SparseVector, top_k: usize) -> Result<Vec<(usize, f32)>> {
        check_top_k(top_k)?;
        let mut ranked = rank_descending(&self.scores_for_vector(query)?);
        ranked.truncate(top_k);
        Ok(ranked)
    }

    /// Rank every row, keep those whose `titles[row]` contains `needle`
    /// (case-insensitive), then take the first `top_k`.
    ///
    /// An empty `needle` keeps every row.
    pub fn search_filtered<S: AsRef<str>>(
        &self,
        query: &str,
        top_k: usize,
        titles: &[S],
        needle: &str,
    ) -> Result<Vec<(usize, f32)>> {
        check_top_k(top_k)?;
        if titles.len() != self.n_documents() {
            return Err(Error::DimensionMismatch {
                expected: self.n_documents(),
                actual: titles.len(),
            });
        }
        let needle = needle.to_lowercase();
        let ranked: Vec<(usize, f32)> = rank_descending(&self.scores(query))
            .into_iter()
            .filter(|&(row, _)| titles[row].as_ref().to_lowercase().contains(&needle))
            .take(top_k)
            .collect();
        tracing::debug!(query, needle = %needle, top_k, returned = ranked.len(), "filtered tf-idf search");
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{StopWords, TfidfVectorizer, VectorizerConfig};

    fn quotes_index() -> TfidfIndex {
        TfidfVectorizer::default()
            .fit(&[
                "cat sat mat",
                "dog barked loudly",
                "cat chased dog",
                "birds sing morning",
            ])
            .unwrap()
    }

    // ============ Cosine Tests ============

    #[test]
    fn test_cosine_identical() {
        let v = SparseVector::new(4, vec![0, 2], vec![1.0, 1.0]).unwrap();
        let sim = cosine_similarity(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = SparseVector::new(4, vec![0], vec![1.0]).unwrap();
        let b = SparseVector::new(4, vec![3], vec![1.0]).unwrap();
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_zero_vector() {
        let a = SparseVector::zeros(3);
        let b = SparseVector::new(3, vec![1], vec![2.0]).unwrap();
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_clamps_negative() {
        let a = SparseVector::new(2, vec![0], vec![1.0]).unwrap();
        let b = SparseVector::new(2, vec![0], vec![-1.0]).unwrap();
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        let a = SparseVector::zeros(3);
        let b = SparseVector::zeros(4);
        assert!(matches!(
            cosine_similarity(&a, &b),
            Err(Error::DimensionMismatch { expected: 3, actual: 4 })
        ));
    }

    // ============ Ranking Tests ============

    #[test]
    fn test_rank_descending_stable() {
        let ranked = rank_descending(&[0.2, 0.9, 0.2, 0.9, 0.0]);
        let order: Vec<usize> = ranked.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn test_rank_by_keys() {
        let keys = [(1usize, 50.0f64), (2, 10.0), (2, 30.0), (1, 50.0)];
        assert_eq!(rank_by_keys(&keys), vec![2, 1, 0, 3]);
    }

    #[test]
    fn test_rank_by_keys_empty() {
        let keys: [(usize, f64); 0] = [];
        assert!(rank_by_keys(&keys).is_empty());
    }

    // ============ Search Tests ============

    #[test]
    fn test_search_cat_scenario() {
        let index = quotes_index();
        let results = index.search("cat", 2).unwrap();
        let rows: Vec<usize> = results.iter().map(|(i, _)| *i).collect();
        assert_eq!(results.len(), 2);
        assert!(rows.contains(&0));
        assert!(rows.contains(&2));
        assert!(results.iter().all(|(_, s)| *s > 0.0));
    }

    #[test]
    fn test_search_top_k_zero() {
        let index = quotes_index();
        assert!(matches!(index.search("cat", 0), Err(Error::Query(_))));
    }

    #[test]
    fn test_search_top_k_larger_than_corpus() {
        let index = quotes_index();
        let results = index.search("cat", 50).unwrap();
        assert_eq!(results.len(), 4);
    }

    #[test]
    fn test_search_no_overlap_returns_first_rows() {
        let index = quotes_index();
        let results = index.search("quantum entanglement", 3).unwrap();
        assert_eq!(results, vec![(0, 0.0), (1, 0.0), (2, 0.0)]);
    }

    #[test]
    fn test_search_self_similarity() {
        let index = quotes_index();
        let results = index.search("dog barked loudly", 1).unwrap();
        assert_eq!(results[0].0, 1);
        assert!((results[0].1 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_scores_in_row_order() {
        let index = quotes_index();
        let scores = index.scores("dog");
        assert_eq!(scores.len(), 4);
        assert_eq!(scores[0], 0.0);
        assert!(scores[1] > 0.0);
        assert!(scores[2] > 0.0);
        assert_eq!(scores[3], 0.0);
    }

    #[test]
    fn test_search_does_not_normalize_query() {
        // stop words are only dropped when the index was configured for it
        let index = TfidfVectorizer::new(
            VectorizerConfig::default().with_stop_words(StopWords::None),
        )
        .fit(&["the end", "new beginning"])
        .unwrap();
        let results = index.search("the", 1).unwrap();
        assert_eq!(results[0].0, 0);
        assert!(results[0].1 > 0.0);
    }

    #[test]
    fn test_search_vector() {
        let index = quotes_index();
        let query = index.transform("birds morning");
        let results = index.search_vector(&query, 1).unwrap();
        assert_eq!(results[0].0, 3);
    }

    #[test]
    fn test_search_vector_dimension_mismatch() {
        let index = quotes_index();
        let query = SparseVector::zeros(index.n_features() + 1);
        assert!(matches!(
            index.search_vector(&query, 1),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    // ============ Filtered Search Tests ============

    #[test]
    fn test_search_filtered_keeps_scores() {
        let index = TfidfVectorizer::default()
            .fit(&["star wars", "star trek", "toy story", "star dust"])
            .unwrap();
        let titles = ["Star Wars", "Star Trek", "Toy Story", "Stardust"];

        let unfiltered = index.search("star", 4).unwrap();
        let filtered = index.search_filtered("star", 4, &titles, "TREK").unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].0, 1);
        let original = unfiltered.iter().find(|(i, _)| *i == 1).unwrap();
        assert_eq!(filtered[0].1, original.1);
    }

    #[test]
    fn test_search_filtered_slices_after_filter() {
        let index = TfidfVectorizer::default()
            .fit(&["night city", "night fall", "day night", "city lights"])
            .unwrap();
        let titles = ["Night City", "Nightfall", "Day and Night", "City Lights"];
        let results = index.search_filtered("night", 2, &titles, "night").unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(i, _)| *i != 3));
    }

    #[test]
    fn test_search_filtered_preserves_similarity_order() {
        let docs = ["night", "night city", "night owl city", "city lights", "night day"];
        let titles = ["Night", "Night City", "City Owls", "City Lights", "Night and Day"];
        let index = TfidfVectorizer::default().fit(&docs).unwrap();

        let unfiltered = index.search("night", docs.len()).unwrap();
        // The best unfiltered row does not pass the filter
        assert_eq!(unfiltered[0].0, 0);

        for k in 1..=docs.len() {
            let expected: Vec<(usize, f32)> = unfiltered
                .iter()
                .copied()
                .filter(|&(row, _)| titles[row].to_lowercase().contains("city"))
                .take(k)
                .collect();
            let filtered = index.search_filtered("night", k, &titles, "City").unwrap();
            assert_eq!(filtered, expected);
        }

        let top_two = index.search_filtered("night", 2, &titles, "city").unwrap();
        let rows: Vec<usize> = top_two.iter().map(|(i, _)| *i).collect();
        assert_eq!(rows, vec![1, 2]);
        assert!(top_two[0].1 > top_two[1].1);
    }

    #[test]
    fn test_search_filtered_empty_needle() {
        let index = quotes_index();
        let titles = ["a", "b", "c", "d"];
        assert_eq!(
            index.search_filtered("cat", 4, &titles, "").unwrap(),
            index.search("cat", 4).unwrap()
        );
    }

    #[test]
    fn test_search_filtered_title_count_mismatch() {
        let index = quotes_index();
        assert!(matches!(
            index.search_filtered("cat", 2, &["only one"], "one"),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    // ============ Hit Tests ============

    #[test]
    fn test_hits_from_ranked() {
        let records = vec!["zero".to_string(), "one".to_string(), "two".to_string()];
        let hits = Hit::from_ranked(&[(2, 0.9), (0, 0.5), (7, 0.1)], &records);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits[0].record, "two");
        assert_eq!(hits[1].rank, 2);
    }

    // ============ Property-Based Tests ============

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_scores_in_unit_interval(
            docs in prop::collection::vec("[a-e]{2,3}( [a-e]{2,3}){0,5}", 1..10),
            query in "[a-e]{2,3}( [a-e]{2,3}){0,3}",
        ) {
            let index = TfidfVectorizer::default().fit(&docs).unwrap();
            for score in index.scores(&query) {
                prop_assert!((0.0..=1.0).contains(&score));
            }
        }

        #[test]
        fn prop_stable_prefix(
            docs in prop::collection::vec("[a-d]{2}( [a-d]{2}){0,4}", 1..12),
            query in "[a-d]{2}( [a-d]{2}){0,2}",
            k in 1usize..6,
        ) {
            let index = TfidfVectorizer::default().fit(&docs).unwrap();
            let small = index.search(&query, k).unwrap();
            let large = index.search(&query, k + 3).unwrap();
            prop_assert!(small.len() <= k);
            prop_assert_eq!(&large[..small.len()], &small[..]);
        }
    }
}
