//! Quote and movie searchers built on the TF-IDF indexes and attribute matchers.
//!
//! Searchers own their records and indexes and are immutable once built.
//! [`IndexHandle`] lets a long-running caller swap in a rebuilt searcher
//! while readers keep using the one they already hold.

use crate::{
    attribute::{AttributeMatch, AttributeMatcher, AttributeSet},
    bundle::{fingerprint, IndexBundle},
    corpus::{Movie, Quote},
    fusion::HybridScorer,
    index::{TfidfIndex, TfidfVectorizer, VectorizerConfig},
    preprocess::TextNormalizer,
    retrieve::Hit,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Bundle field holding the quote text index
pub const QUOTE_TEXT_FIELD: &str = "text";
/// Bundle field holding the movie title index
pub const MOVIE_TITLE_FIELD: &str = "title";
/// Bundle field holding the movie synopsis index
pub const MOVIE_OVERVIEW_FIELD: &str = "overview";

fn attribute_hits<'a, T>(matches: &[AttributeMatch], records: &'a [T]) -> Vec<Hit<'a, T>> {
    let ranked: Vec<(usize, f32)> = matches
        .iter()
        .map(|m| (m.index, m.match_count as f32))
        .collect();
    Hit::from_ranked(&ranked, records)
}

/// Keyword search and tag recommendation over quotes
#[derive(Debug, Clone)]
pub struct QuoteSearcher {
    quotes: Vec<Quote>,
    index: TfidfIndex,
    tags: AttributeMatcher,
    normalizer: TextNormalizer,
}

impl QuoteSearcher {
    /// Fit a text index over the quotes' `clean_text`
    pub fn build(quotes: Vec<Quote>, config: &VectorizerConfig) -> Result<Self> {
        let texts: Vec<&str> = quotes.iter().map(|q| q.clean_text.as_str()).collect();
        let index = TfidfVectorizer::new(config.clone()).fit(&texts)?;
        Ok(Self::assemble(quotes, index))
    }

    /// Reuse a persisted index; fails with [`Error::StaleIndex`] when the
    /// bundle was built from different quotes
    pub fn from_bundle(quotes: Vec<Quote>, mut bundle: IndexBundle) -> Result<Self> {
        bundle.verify(Self::fingerprint(&quotes))?;
        let index = bundle.take(QUOTE_TEXT_FIELD)?;
        if index.n_documents() != quotes.len() {
            return Err(Error::DimensionMismatch {
                expected: quotes.len(),
                actual: index.n_documents(),
            });
        }
        Ok(Self::assemble(quotes, index))
    }

    fn assemble(quotes: Vec<Quote>, index: TfidfIndex) -> Self {
        let tags = AttributeMatcher::from_records(&quotes);
        Self {
            quotes,
            index,
            tags,
            normalizer: TextNormalizer::new(),
        }
    }

    /// Fingerprint of the texts a quote index is fitted on
    #[must_use]
    pub fn fingerprint(quotes: &[Quote]) -> u64 {
        fingerprint(quotes.iter().map(|q| q.clean_text.as_str()))
    }

    /// Bundle holding this searcher's index
    #[must_use]
    pub fn to_bundle(&self) -> IndexBundle {
        IndexBundle::new(Self::fingerprint(&self.quotes))
            .with_index(QUOTE_TEXT_FIELD, self.index.clone())
    }

    /// Indexed quotes, in row order
    #[must_use]
    pub fn quotes(&self) -> &[Quote] {
        &self.quotes
    }

    /// The text index
    #[must_use]
    pub fn index(&self) -> &TfidfIndex {
        &self.index
    }

    /// Normalize `query` and return the `top_k` most similar quotes
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<Hit<'_, Quote>>> {
        let cleaned = self.normalizer.normalize(query);
        let ranked = self.index.search(&cleaned, top_k)?;
        Ok(Hit::from_ranked(&ranked, &self.quotes))
    }

    /// Quotes sharing at least one selected tag; score is the match count
    #[must_use]
    pub fn recommend_by_tags(&self, tags: &AttributeSet) -> Vec<Hit<'_, Quote>> {
        attribute_hits(&self.tags.rank(tags), &self.quotes)
    }

    /// Sorted distinct tags
    #[must_use]
    pub fn all_tags(&self) -> Vec<&str> {
        self.tags.vocabulary()
    }
}

/// Inputs of a combined title / synopsis / genre movie search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HybridQuery {
    /// Title keywords
    pub title: Option<String>,
    /// Synopsis keywords
    pub synopsis: Option<String>,
    /// Selected genres
    pub genres: AttributeSet,
    /// Results to return
    pub top_k: usize,
}

impl HybridQuery {
    /// Empty query returning `top_k` results
    #[must_use]
    pub fn new(top_k: usize) -> Self {
        Self {
            top_k,
            ..Self::default()
        }
    }

    /// Set the title keywords
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the synopsis keywords
    #[must_use]
    pub fn with_synopsis(mut self, synopsis: impl Into<String>) -> Self {
        self.synopsis = Some(synopsis.into());
        self
    }

    /// Set the genres
    #[must_use]
    pub fn with_genres(mut self, genres: AttributeSet) -> Self {
        self.genres = genres;
        self
    }
}

fn active(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.trim().is_empty())
}

/// Title, synopsis, hybrid and genre search over movies
#[derive(Debug, Clone)]
pub struct MovieSearcher {
    movies: Vec<Movie>,
    titles: TfidfIndex,
    overviews: TfidfIndex,
    genres: AttributeMatcher,
    scorer: HybridScorer,
    normalizer: TextNormalizer,
}

impl MovieSearcher {
    /// Fit title and synopsis indexes over the movies' cleaned fields
    pub fn build(
        movies: Vec<Movie>,
        title_config: &VectorizerConfig,
        overview_config: &VectorizerConfig,
    ) -> Result<Self> {
        let titles: Vec<&str> = movies.iter().map(Movie::title_text).collect();
        let overviews: Vec<&str> = movies.iter().map(Movie::overview_text).collect();
        let title_index = TfidfVectorizer::new(title_config.clone()).fit(&titles)?;
        let overview_index = TfidfVectorizer::new(overview_config.clone()).fit(&overviews)?;
        Ok(Self::assemble(movies, title_index, overview_index))
    }

    /// Reuse persisted indexes; fails with [`Error::StaleIndex`] when the
    /// bundle was built from different movies
    pub fn from_bundle(movies: Vec<Movie>, mut bundle: IndexBundle) -> Result<Self> {
        bundle.verify(Self::fingerprint(&movies))?;
        let titles = bundle.take(MOVIE_TITLE_FIELD)?;
        let overviews = bundle.take(MOVIE_OVERVIEW_FIELD)?;
        for index in [&titles, &overviews] {
            if index.n_documents() != movies.len() {
                return Err(Error::DimensionMismatch {
                    expected: movies.len(),
                    actual: index.n_documents(),
                });
            }
        }
        Ok(Self::assemble(movies, titles, overviews))
    }

    fn assemble(movies: Vec<Movie>, titles: TfidfIndex, overviews: TfidfIndex) -> Self {
        let genres = AttributeMatcher::from_records(&movies);
        Self {
            movies,
            titles,
            overviews,
            genres,
            scorer: HybridScorer::default(),
            normalizer: TextNormalizer::new(),
        }
    }

    /// Fingerprint of the titles and synopses the movie indexes are fitted on
    #[must_use]
    pub fn fingerprint(movies: &[Movie]) -> u64 {
        fingerprint(
            movies
                .iter()
                .map(Movie::title_text)
                .chain(movies.iter().map(Movie::overview_text)),
        )
    }

    /// Bundle holding this searcher's indexes
    #[must_use]
    pub fn to_bundle(&self) -> IndexBundle {
        IndexBundle::new(Self::fingerprint(&self.movies))
            .with_index(MOVIE_TITLE_FIELD, self.titles.clone())
            .with_index(MOVIE_OVERVIEW_FIELD, self.overviews.clone())
    }

    /// Indexed movies, in row order
    #[must_use]
    pub fn movies(&self) -> &[Movie] {
        &self.movies
    }

    /// The title index
    #[must_use]
    pub fn title_index(&self) -> &TfidfIndex {
        &self.titles
    }

    /// The synopsis index
    #[must_use]
    pub fn overview_index(&self) -> &TfidfIndex {
        &self.overviews
    }

    /// Title search; `contains` keeps only movies whose display title
    /// contains it (case-insensitive) before slicing `top_k`
    pub fn search_titles(
        &self,
        query: &str,
        top_k: usize,
        contains: Option<&str>,
    ) -> Result<Vec<Hit<'_, Movie>>> {
        let cleaned = self.normalizer.normalize(query);
        let ranked = match active(contains) {
            Some(needle) => {
                let display: Vec<&str> = self.movies.iter().map(|m| m.title.as_str()).collect();
                self.titles
                    .search_filtered(&cleaned, top_k, &display, needle.trim())?
            }
            None => self.titles.search(&cleaned, top_k)?,
        };
        Ok(Hit::from_ranked(&ranked, &self.movies))
    }

    /// Synopsis search
    pub fn search_overviews(&self, query: &str, top_k: usize) -> Result<Vec<Hit<'_, Movie>>> {
        let cleaned = self.normalizer.normalize(query);
        let ranked = self.overviews.search(&cleaned, top_k)?;
        Ok(Hit::from_ranked(&ranked, &self.movies))
    }

    /// Weighted title / synopsis / genre search.
    ///
    /// At least two of the three inputs must be given.
    pub fn search_hybrid(&self, query: &HybridQuery) -> Result<Vec<Hit<'_, Movie>>> {
        let title = active(query.title.as_deref());
        let synopsis = active(query.synopsis.as_deref());
        let genres = (!query.genres.is_empty()).then_some(&query.genres);

        let given = usize::from(title.is_some())
            + usize::from(synopsis.is_some())
            + usize::from(genres.is_some());
        if given < 2 {
            return Err(Error::Query(format!(
                "hybrid search needs at least two of title, synopsis and genres; got {given}"
            )));
        }

        let title_scores = title.map(|t| self.titles.scores(&self.normalizer.normalize(t)));
        let synopsis_scores =
            synopsis.map(|s| self.overviews.scores(&self.normalizer.normalize(s)));
        let genre_counts = genres.map(|g| self.genres.counts(g));

        let ranked = self.scorer.rank(
            title_scores.as_deref(),
            synopsis_scores.as_deref(),
            genre_counts.as_deref(),
            self.movies.len(),
            query.top_k,
        )?;
        tracing::debug!(given, returned = ranked.len(), "hybrid movie search");
        Ok(Hit::from_ranked(&ranked, &self.movies))
    }

    /// Movies sharing at least one selected genre, ranked by match count
    /// then popularity; score is the match count
    #[must_use]
    pub fn recommend_by_genres(&self, genres: &AttributeSet) -> Vec<Hit<'_, Movie>> {
        attribute_hits(&self.genres.rank(genres), &self.movies)
    }

    /// Sorted distinct genres
    #[must_use]
    pub fn all_genres(&self) -> Vec<&str> {
        self.genres.vocabulary()
    }
}

/// Shared slot holding the current searcher (or index).
///
/// Readers clone the `Arc` and keep it for as long as they need; a rebuild
/// runs outside the lock and only takes the write lock to swap the pointer.
#[derive(Debug)]
pub struct IndexHandle<T> {
    current: RwLock<Arc<T>>,
}

impl<T> IndexHandle<T> {
    /// Wrap an initial value
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    /// The value in place right now
    pub fn current(&self) -> Arc<T> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replace the value, returning the previous one
    pub fn replace(&self, value: T) -> Arc<T> {
        let next = Arc::new(value);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }

    /// Build a new value and swap it in; on error the old value stays
    pub fn rebuild<F>(&self, build: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        let next = Arc::new(build()?);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::clone(&next);
        drop(guard);
        tracing::info!("index rebuilt");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Compression;
    use crate::config::VectorizerSettings;

    fn quotes() -> Vec<Quote> {
        vec![
            Quote::new("q0", "The cat sat on the mat.", "Anon", "cats, life"),
            Quote::new("q1", "A dog barked loudly at night.", "Anon", "dogs"),
            Quote::new("q2", "The cat chased the dog.", "Anon", "cats, dogs"),
            Quote::new("q3", "Life is love, love is life.", "Anon", "life, love"),
        ]
    }

    fn movies() -> Vec<Movie> {
        vec![
            Movie::new("1", "Star Wars", "Rebels fight the empire in space.", "Action, Science Fiction")
                .with_popularity(80.0),
            Movie::new("2", "Star Trek", "A crew explores space.", "Science Fiction")
                .with_popularity(60.0),
            Movie::new("3", "Toy Story", "Toys come alive when nobody watches.", "Animation, Comedy")
                .with_popularity(90.0),
            Movie::new("4", "Toy Soldiers", "Students fight terrorists at school.", "Action")
                .with_popularity(10.0),
            Movie::new("5", "Space Jam", "Basketball stars play against aliens in space.", "Animation, Comedy")
                .with_popularity(40.0),
        ]
    }

    fn quote_searcher() -> QuoteSearcher {
        QuoteSearcher::build(quotes(), &VectorizerSettings::default().quotes).unwrap()
    }

    fn movie_searcher() -> MovieSearcher {
        let settings = VectorizerSettings::default();
        MovieSearcher::build(movies(), &settings.titles, &settings.overviews).unwrap()
    }

    fn ids<T: crate::corpus::Record>(hits: &[Hit<'_, T>]) -> Vec<String> {
        hits.iter().map(|h| h.record.id().to_string()).collect()
    }

    // ============ QuoteSearcher Tests ============

    #[test]
    fn test_quote_search_normalizes_query() {
        let searcher = quote_searcher();
        let hits = searcher.search("The CAT!!", 2).unwrap();
        assert_eq!(hits.len(), 2);
        let found = ids(&hits);
        assert!(found.contains(&"q0".to_string()));
        assert!(found.contains(&"q2".to_string()));
        assert_eq!(hits[0].rank, 1);
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn test_quote_search_top_k_zero() {
        let searcher = quote_searcher();
        assert!(matches!(searcher.search("cat", 0), Err(Error::Query(_))));
    }

    #[test]
    fn test_recommend_by_tags() {
        let searcher = quote_searcher();
        let hits = searcher.recommend_by_tags(&AttributeSet::parse("cats, dogs"));
        assert_eq!(ids(&hits), vec!["q2", "q0", "q1"]);
        assert_eq!(hits[0].score, 2.0);
        assert_eq!(hits[1].score, 1.0);
    }

    #[test]
    fn test_recommend_by_tags_empty_selection() {
        let searcher = quote_searcher();
        assert!(searcher.recommend_by_tags(&AttributeSet::default()).is_empty());
    }

    #[test]
    fn test_all_tags() {
        let searcher = quote_searcher();
        assert_eq!(searcher.all_tags(), vec!["cats", "dogs", "life", "love"]);
    }

    #[test]
    fn test_quote_bundle_roundtrip() {
        let searcher = quote_searcher();
        let bytes = searcher.to_bundle().to_bytes(Compression::Lz4).unwrap();
        let bundle = IndexBundle::from_bytes(&bytes).unwrap();
        let restored = QuoteSearcher::from_bundle(quotes(), bundle).unwrap();
        assert_eq!(
            ids(&restored.search("dog", 3).unwrap()),
            ids(&searcher.search("dog", 3).unwrap())
        );
    }

    #[test]
    fn test_quote_bundle_stale() {
        let bundle = quote_searcher().to_bundle();
        let mut changed = quotes();
        changed.pop();
        assert!(matches!(
            QuoteSearcher::from_bundle(changed, bundle),
            Err(Error::StaleIndex { .. })
        ));
    }

    // ============ MovieSearcher Tests ============

    #[test]
    fn test_search_titles() {
        let searcher = movie_searcher();
        let hits = searcher.search_titles("star", 2, None).unwrap();
        assert_eq!(ids(&hits), vec!["1", "2"]);
    }

    #[test]
    fn test_search_titles_substring_filter() {
        let searcher = movie_searcher();
        let hits = searcher.search_titles("star", 5, Some("TREK")).unwrap();
        assert_eq!(ids(&hits), vec!["2"]);

        let blank = searcher.search_titles("star", 2, Some("  ")).unwrap();
        assert_eq!(ids(&blank), vec!["1", "2"]);
    }

    #[test]
    fn test_search_overviews() {
        let searcher = movie_searcher();
        let hits = searcher.search_overviews("toys alive", 1).unwrap();
        assert_eq!(ids(&hits), vec!["3"]);
    }

    #[test]
    fn test_hybrid_requires_two_inputs() {
        let searcher = movie_searcher();
        let query = HybridQuery::new(3).with_title("star");
        assert!(matches!(searcher.search_hybrid(&query), Err(Error::Query(_))));

        let blank = HybridQuery::new(3).with_title("star").with_synopsis("   ");
        assert!(matches!(searcher.search_hybrid(&blank), Err(Error::Query(_))));
    }

    #[test]
    fn test_hybrid_title_and_genre() {
        let searcher = movie_searcher();
        let query = HybridQuery::new(3)
            .with_title("toy")
            .with_genres(AttributeSet::parse("Animation"));
        let hits = searcher.search_hybrid(&query).unwrap();
        assert_eq!(hits[0].record.id.as_str(), "3");
        assert!(hits.len() <= 3);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_hybrid_top_k_zero() {
        let searcher = movie_searcher();
        let query = HybridQuery::new(0).with_title("toy").with_synopsis("space");
        assert!(matches!(searcher.search_hybrid(&query), Err(Error::Query(_))));
    }

    #[test]
    fn test_recommend_by_genres_popularity_tiebreak() {
        let searcher = movie_searcher();
        let hits = searcher.recommend_by_genres(&AttributeSet::parse("Action, Comedy"));
        // one match each: Toy Story (90), Star Wars (80), Space Jam (40), Toy Soldiers (10)
        assert_eq!(ids(&hits), vec!["3", "1", "5", "4"]);
    }

    #[test]
    fn test_recommend_by_genres_empty() {
        let searcher = movie_searcher();
        assert!(searcher.recommend_by_genres(&AttributeSet::default()).is_empty());
    }

    #[test]
    fn test_all_genres() {
        let searcher = movie_searcher();
        assert_eq!(
            searcher.all_genres(),
            vec!["Action", "Animation", "Comedy", "Science Fiction"]
        );
    }

    #[test]
    fn test_movie_bundle_roundtrip() {
        let searcher = movie_searcher();
        let bundle = searcher.to_bundle();
        assert_eq!(
            bundle.fields().collect::<Vec<_>>(),
            vec![MOVIE_OVERVIEW_FIELD, MOVIE_TITLE_FIELD]
        );
        let restored = MovieSearcher::from_bundle(movies(), bundle).unwrap();
        assert_eq!(restored.title_index().n_features(), searcher.title_index().n_features());
    }

    #[test]
    fn test_hit_json_flattens_record() {
        let searcher = movie_searcher();
        let hits = searcher.search_titles("toy", 1, None).unwrap();
        let json = serde_json::to_value(&hits[0]).unwrap();
        assert_eq!(json["rank"], 1);
        assert_eq!(json["id"], "3");
        assert_eq!(json["judul_display"], "Toy Story");
        assert!(json["score"].as_f64().unwrap() > 0.0);
    }

    // ============ IndexHandle Tests ============

    #[test]
    fn test_searchers_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QuoteSearcher>();
        assert_send_sync::<MovieSearcher>();
        assert_send_sync::<IndexHandle<QuoteSearcher>>();
    }

    #[test]
    fn test_handle_rebuild_swaps() {
        let handle = IndexHandle::new(quote_searcher());
        let before = handle.current();
        assert_eq!(before.quotes().len(), 4);

        let mut fewer = quotes();
        fewer.truncate(2);
        handle
            .rebuild(|| QuoteSearcher::build(fewer, &VectorizerSettings::default().quotes))
            .unwrap();

        assert_eq!(handle.current().quotes().len(), 2);
        // readers holding the old Arc are unaffected
        assert_eq!(before.quotes().len(), 4);
    }

    #[test]
    fn test_handle_failed_rebuild_keeps_old() {
        let handle = IndexHandle::new(quote_searcher());
        let result = handle.rebuild(|| QuoteSearcher::build(Vec::new(), &VectorizerConfig::default()));
        assert!(matches!(result, Err(Error::EmptyCorpus(_))));
        assert_eq!(handle.current().quotes().len(), 4);
    }

    #[test]
    fn test_handle_replace() {
        let handle = IndexHandle::new(1u32);
        let old = handle.replace(2);
        assert_eq!(*old, 1);
        assert_eq!(*handle.current(), 2);
    }

    #[test]
    fn test_handle_concurrent_readers() {
        let handle = Arc::new(IndexHandle::new(quote_searcher()));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = Arc::clone(&handle);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let searcher = handle.current();
                        let n = searcher.quotes().len();
                        assert!(n == 4 || n == 3);
                        assert_eq!(searcher.index().n_documents(), n);
                    }
                })
            })
            .collect();

        let mut fewer = quotes();
        fewer.pop();
        handle
            .rebuild(|| QuoteSearcher::build(fewer, &VectorizerSettings::default().quotes))
            .unwrap();

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(handle.current().quotes().len(), 3);
    }
}
