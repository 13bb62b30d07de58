//! Tag and genre overlap matching.
//!
//! Documents are ranked by how many of the selected attributes they carry,
//! with ties broken by a per-document secondary key (popularity for movies)
//! and then by corpus order.

use crate::{corpus::Record, retrieve::rank_by_keys, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Set of attribute labels (tags or genres)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSet(BTreeSet<String>);

impl AttributeSet {
    /// Parse a comma separated list such as `"Action, Science Fiction"`.
    ///
    /// Labels are trimmed; empty labels are dropped.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        raw.split(',').collect()
    }

    /// Number of distinct labels
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no labels
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check for a label
    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(label)
    }

    /// Labels in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|label| label.as_ref().trim().to_string())
                .filter(|label| !label.is_empty())
                .collect(),
        )
    }
}

impl fmt::Display for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(label)?;
        }
        Ok(())
    }
}

/// Size of the intersection of two attribute sets
#[must_use]
pub fn match_count(a: &AttributeSet, b: &AttributeSet) -> usize {
    a.0.intersection(&b.0).count()
}

/// One document matching the selected attributes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttributeMatch {
    /// Row in the corpus
    pub index: usize,
    /// Number of selected attributes the document carries
    pub match_count: usize,
    /// Secondary ranking key, if the document has one
    pub secondary: Option<f64>,
}

/// Precomputed per-document attribute sets plus secondary keys
#[derive(Debug, Clone, Default)]
pub struct AttributeMatcher {
    sets: Vec<AttributeSet>,
    secondary: Vec<Option<f64>>,
}

impl AttributeMatcher {
    /// Build from parallel vectors of sets and secondary keys
    pub fn new(sets: Vec<AttributeSet>, secondary: Vec<Option<f64>>) -> Result<Self> {
        if sets.len() != secondary.len() {
            return Err(Error::DimensionMismatch {
                expected: sets.len(),
                actual: secondary.len(),
            });
        }
        Ok(Self { sets, secondary })
    }

    /// Build from corpus records, using their popularity as secondary key
    #[must_use]
    pub fn from_records<R: Record>(records: &[R]) -> Self {
        Self {
            sets: records.iter().map(|r| r.attributes().clone()).collect(),
            secondary: records.iter().map(Record::popularity).collect(),
        }
    }

    /// Number of documents
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// True when there are no documents
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Overlap with `selected` for every document, in row order
    #[must_use]
    pub fn counts(&self, selected: &AttributeSet) -> Vec<usize> {
        self.sets.iter().map(|set| match_count(set, selected)).collect()
    }

    /// Documents sharing at least one selected attribute, best first.
    ///
    /// Ordered by match count, then secondary key (missing or NaN counts as
    /// 0), then row order.
    #[must_use]
    pub fn rank(&self, selected: &AttributeSet) -> Vec<AttributeMatch> {
        if selected.is_empty() {
            return Vec::new();
        }

        let matches: Vec<AttributeMatch> = self
            .counts(selected)
            .into_iter()
            .enumerate()
            .filter(|(_, count)| *count > 0)
            .map(|(index, match_count)| AttributeMatch {
                index,
                match_count,
                secondary: self.secondary[index],
            })
            .collect();

        let keys: Vec<(usize, f64)> = matches
            .iter()
            .map(|m| (m.match_count, m.secondary.filter(|v| !v.is_nan()).unwrap_or(0.0)))
            .collect();

        let ranked: Vec<AttributeMatch> = rank_by_keys(&keys).into_iter().map(|i| matches[i]).collect();
        tracing::debug!(selected = %selected, matched = ranked.len(), "attribute match");
        ranked
    }

    /// Sorted distinct attributes across all documents
    #[must_use]
    pub fn vocabulary(&self) -> Vec<&str> {
        let all: BTreeSet<&str> = self.sets.iter().flat_map(AttributeSet::iter).collect();
        all.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(raw: &str) -> AttributeSet {
        AttributeSet::parse(raw)
    }

    // ============ AttributeSet Tests ============

    #[test]
    fn test_parse_trims_and_drops_empty() {
        let tags = set(" life ,love,, hope ,");
        assert_eq!(tags.len(), 3);
        assert!(tags.contains("life"));
        assert!(tags.contains("hope"));
        assert!(!tags.contains(""));
    }

    #[test]
    fn test_parse_empty() {
        assert!(set("").is_empty());
        assert!(set(" , ").is_empty());
    }

    #[test]
    fn test_display_sorted() {
        assert_eq!(set("Drama, Action").to_string(), "Action, Drama");
    }

    #[test]
    fn test_match_count_scenario() {
        assert_eq!(match_count(&set("life, love"), &set("love, hope")), 1);
    }

    #[test]
    fn test_match_count_symmetric() {
        let a = set("action, drama, crime");
        let b = set("crime, drama");
        assert_eq!(match_count(&a, &b), match_count(&b, &a));
        assert_eq!(match_count(&a, &b), 2);
    }

    // ============ AttributeMatcher Tests ============

    fn movie_matcher() -> AttributeMatcher {
        AttributeMatcher::new(
            vec![
                set("Action, Thriller"),
                set("Comedy"),
                set("Action, Comedy"),
                set("Action"),
                set("Action, Comedy, Thriller"),
            ],
            vec![Some(10.0), Some(99.0), Some(5.0), Some(50.0), None],
        )
        .unwrap()
    }

    #[test]
    fn test_new_length_mismatch() {
        let result = AttributeMatcher::new(vec![set("a")], vec![]);
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn test_counts() {
        let matcher = movie_matcher();
        assert_eq!(matcher.counts(&set("Action, Comedy")), vec![1, 1, 2, 1, 2]);
    }

    #[test]
    fn test_rank_by_count_then_secondary() {
        let matcher = movie_matcher();
        let ranked = matcher.rank(&set("Action, Comedy"));
        let order: Vec<usize> = ranked.iter().map(|m| m.index).collect();
        // count 2: rows 2 (5.0) and 4 (missing -> 0); count 1: 1 (99), 3 (50), 0 (10)
        assert_eq!(order, vec![2, 4, 1, 3, 0]);
        assert_eq!(ranked[0].match_count, 2);
        assert_eq!(ranked[1].secondary, None);
    }

    #[test]
    fn test_rank_ties_keep_row_order() {
        let matcher = AttributeMatcher::new(
            vec![set("love"), set("love"), set("love")],
            vec![None, None, Some(f64::NAN)],
        )
        .unwrap();
        let order: Vec<usize> = matcher.rank(&set("love")).iter().map(|m| m.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_rank_excludes_zero_matches() {
        let matcher = movie_matcher();
        let ranked = matcher.rank(&set("Thriller"));
        let order: Vec<usize> = ranked.iter().map(|m| m.index).collect();
        assert_eq!(order, vec![0, 4]);
    }

    #[test]
    fn test_rank_empty_selection() {
        let matcher = movie_matcher();
        assert!(matcher.rank(&AttributeSet::default()).is_empty());
    }

    #[test]
    fn test_rank_no_match() {
        let matcher = movie_matcher();
        assert!(matcher.rank(&set("Horror")).is_empty());
    }

    #[test]
    fn test_vocabulary_sorted_distinct() {
        let matcher = movie_matcher();
        assert_eq!(matcher.vocabulary(), vec!["Action", "Comedy", "Thriller"]);
    }

    // ============ Property-Based Tests ============

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_match_count_symmetric(
            a in prop::collection::vec("[a-f]{1,3}", 0..6),
            b in prop::collection::vec("[a-f]{1,3}", 0..6),
        ) {
            let a: AttributeSet = a.into_iter().collect();
            let b: AttributeSet = b.into_iter().collect();
            prop_assert_eq!(match_count(&a, &b), match_count(&b, &a));
            prop_assert!(match_count(&a, &b) <= a.len().min(b.len()));
        }

        #[test]
        fn prop_rank_counts_non_increasing(
            docs in prop::collection::vec(prop::collection::vec("[a-d]", 0..4), 1..15),
            selected in prop::collection::vec("[a-d]", 1..3),
        ) {
            let sets: Vec<AttributeSet> = docs.into_iter().map(|d| d.into_iter().collect()).collect();
            let n = sets.len();
            let matcher = AttributeMatcher::new(sets, vec![None; n]).unwrap();
            let selected: AttributeSet = selected.into_iter().collect();
            let ranked = matcher.rank(&selected);
            prop_assert!(ranked.iter().all(|m| m.match_count > 0));
            prop_assert!(ranked.windows(2).all(|w| w[0].match_count >= w[1].match_count));
        }
    }
}
