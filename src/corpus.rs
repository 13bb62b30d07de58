//! Quote and movie records: CSV ingestion, export and the cleaning pass.
//!
//! Movie files use the Indonesian column names written by the TMDb crawler
//! (`judul_asli`, `sinopsis_asli`, `popularitas`, ...). English column names
//! are accepted as aliases on read.

use crate::{
    attribute::AttributeSet, preprocess::TextNormalizer, DocumentId, Error, Result,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// A corpus row that carries attributes and an optional ranking key
pub trait Record {
    /// Stable identifier
    fn id(&self) -> &DocumentId;

    /// Parsed tag / genre set
    fn attributes(&self) -> &AttributeSet;

    /// Secondary ranking key for attribute matches
    fn popularity(&self) -> Option<f64> {
        None
    }
}

/// A quote with its author and tags
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    /// `q<row>`
    pub id: DocumentId,
    /// Quote text as scraped
    pub text: String,
    /// Author name
    pub author: String,
    /// Tags joined with `", "`
    pub tags: String,
    /// Normalized text the index is built from
    pub clean_text: String,
    /// Parsed tags
    #[serde(skip)]
    pub tag_set: AttributeSet,
}

impl Quote {
    /// Build a quote, normalizing its text and parsing its tags
    #[must_use]
    pub fn new(
        id: impl Into<DocumentId>,
        text: impl Into<String>,
        author: impl Into<String>,
        tags: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let tags = tags.into();
        Self {
            id: id.into(),
            clean_text: TextNormalizer::new().normalize(&text),
            tag_set: AttributeSet::parse(&tags),
            text,
            author: author.into(),
            tags,
        }
    }
}

impl Record for Quote {
    fn id(&self) -> &DocumentId {
        &self.id
    }

    fn attributes(&self) -> &AttributeSet {
        &self.tag_set
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct QuoteRow {
    text: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    clean_text: Option<String>,
}

/// A TMDb movie record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    /// TMDb id, or `m<row>` when the file has none
    #[serde(default)]
    pub id: DocumentId,
    /// Title in the original language
    #[serde(rename = "judul_asli", alias = "original_title", default)]
    pub original_title: String,
    /// Display title
    #[serde(rename = "judul_display", alias = "title", default)]
    pub title: String,
    /// Synopsis
    #[serde(rename = "sinopsis_asli", alias = "overview", default)]
    pub overview: String,
    /// Genres joined with `", "`
    #[serde(default)]
    pub genre: String,
    /// Release date as written in the source
    #[serde(rename = "tanggal_rilis", alias = "release_date", default)]
    pub release_date: String,
    /// Average vote
    #[serde(default, deserialize_with = "lenient_f64")]
    pub rating: Option<f64>,
    /// TMDb popularity
    #[serde(
        rename = "popularitas",
        alias = "popularity",
        default,
        deserialize_with = "lenient_f64"
    )]
    pub popularity: Option<f64>,
    /// Original language code
    #[serde(rename = "bahasa_asli", alias = "original_language", default)]
    pub original_language: String,
    /// Normalized display title
    #[serde(rename = "judul_clean", alias = "title_clean", default)]
    pub title_clean: Option<String>,
    /// Normalized synopsis
    #[serde(rename = "sinopsis_clean", alias = "overview_clean", default)]
    pub overview_clean: Option<String>,
    /// Parsed genres
    #[serde(skip)]
    pub genre_set: AttributeSet,
}

impl Movie {
    /// Build a movie from its searchable fields, normalizing title and synopsis
    #[must_use]
    pub fn new(
        id: impl Into<DocumentId>,
        title: impl Into<String>,
        overview: impl Into<String>,
        genre: impl Into<String>,
    ) -> Self {
        let normalizer = TextNormalizer::new();
        let title = title.into();
        let overview = overview.into();
        let genre = genre.into();
        Self {
            id: id.into(),
            original_title: title.clone(),
            title_clean: Some(normalizer.normalize(&title)),
            overview_clean: Some(normalizer.normalize(&overview)),
            genre_set: AttributeSet::parse(&genre),
            title,
            overview,
            genre,
            ..Self::default()
        }
    }

    /// Set the popularity
    #[must_use]
    pub fn with_popularity(mut self, popularity: f64) -> Self {
        self.popularity = Some(popularity);
        self
    }

    /// Cleaned title, empty when missing
    #[must_use]
    pub fn title_text(&self) -> &str {
        self.title_clean.as_deref().unwrap_or_default()
    }

    /// Cleaned synopsis, empty when missing
    #[must_use]
    pub fn overview_text(&self) -> &str {
        self.overview_clean.as_deref().unwrap_or_default()
    }
}

impl Record for Movie {
    fn id(&self) -> &DocumentId {
        &self.id
    }

    fn attributes(&self) -> &AttributeSet {
        &self.genre_set
    }

    fn popularity(&self) -> Option<f64> {
        self.popularity
    }
}

/// Numeric cells that fail to parse read as missing
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.trim().parse::<f64>().ok()))
}

fn csv_error(path: &Path, err: csv::Error) -> Error {
    if err.is_io_error() {
        match err.into_kind() {
            csv::ErrorKind::Io(io) => Error::Io(io),
            other => Error::InvalidFormat(format!("{}: {other:?}", path.display())),
        }
    } else {
        Error::InvalidFormat(format!("{}: {err}", path.display()))
    }
}

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    if !path.exists() {
        return Err(Error::MissingFile(path.to_path_buf()));
    }
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))
}

/// Read a quotes CSV (`text,author,tags[,clean_text]`).
///
/// Rows without `clean_text` are normalized on the fly.
pub fn read_quotes(path: impl AsRef<Path>) -> Result<Vec<Quote>> {
    let path = path.as_ref();
    let normalizer = TextNormalizer::new();
    let mut reader = open_reader(path)?;

    let mut quotes = Vec::new();
    for (row, result) in reader.deserialize::<QuoteRow>().enumerate() {
        let raw = result.map_err(|e| csv_error(path, e))?;
        let clean_text = raw
            .clean_text
            .unwrap_or_else(|| normalizer.normalize(&raw.text));
        quotes.push(Quote {
            id: DocumentId::new(format!("q{row}")),
            tag_set: AttributeSet::parse(&raw.tags),
            text: raw.text,
            author: raw.author,
            tags: raw.tags,
            clean_text,
        });
    }

    tracing::info!(path = %path.display(), count = quotes.len(), "loaded quotes");
    Ok(quotes)
}

/// Read a movies CSV.
///
/// Rows without cleaned title / synopsis columns are normalized on the fly.
pub fn read_movies(path: impl AsRef<Path>) -> Result<Vec<Movie>> {
    let path = path.as_ref();
    let normalizer = TextNormalizer::new();
    let mut reader = open_reader(path)?;

    let mut movies = Vec::new();
    for (row, result) in reader.deserialize::<Movie>().enumerate() {
        let mut movie = result.map_err(|e| csv_error(path, e))?;
        if movie.id.as_str().trim().is_empty() {
            movie.id = DocumentId::new(format!("m{row}"));
        }
        if movie.title_clean.is_none() {
            movie.title_clean = Some(normalizer.normalize(&movie.title));
        }
        if movie.overview_clean.is_none() {
            movie.overview_clean = Some(normalizer.normalize(&movie.overview));
        }
        movie.genre_set = AttributeSet::parse(&movie.genre);
        movies.push(movie);
    }

    tracing::info!(path = %path.display(), count = movies.len(), "loaded movies");
    Ok(movies)
}

fn open_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    csv::Writer::from_path(path).map_err(|e| csv_error(path, e))
}

/// Write quotes with their `clean_text` column
pub fn write_quotes(path: impl AsRef<Path>, quotes: &[Quote]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = open_writer(path)?;
    for quote in quotes {
        let row = QuoteRow {
            text: quote.text.clone(),
            author: quote.author.clone(),
            tags: quote.tags.clone(),
            clean_text: Some(quote.clean_text.clone()),
        };
        writer.serialize(row).map_err(|e| csv_error(path, e))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write movies with their cleaned title and synopsis columns
pub fn write_movies(path: impl AsRef<Path>, movies: &[Movie]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = open_writer(path)?;
    for movie in movies {
        writer.serialize(movie).map_err(|e| csv_error(path, e))?;
    }
    writer.flush()?;
    Ok(())
}

/// Normalize every quote's text into `clean_text`, overwriting existing values.
///
/// Returns the number of rows written.
pub fn clean_quotes(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<usize> {
    let normalizer = TextNormalizer::new();
    let mut quotes = read_quotes(input)?;
    for quote in &mut quotes {
        quote.clean_text = normalizer.normalize(&quote.text);
    }
    write_quotes(output.as_ref(), &quotes)?;
    tracing::info!(output = %output.as_ref().display(), rows = quotes.len(), "cleaned quotes");
    Ok(quotes.len())
}

/// Normalize every movie's display title and synopsis, overwriting existing values.
///
/// Returns the number of rows written.
pub fn clean_movies(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<usize> {
    let normalizer = TextNormalizer::new();
    let mut movies = read_movies(input)?;
    for movie in &mut movies {
        movie.title_clean = Some(normalizer.normalize(&movie.title));
        movie.overview_clean = Some(normalizer.normalize(&movie.overview));
    }
    write_movies(output.as_ref(), &movies)?;
    tracing::info!(output = %output.as_ref().display(), rows = movies.len(), "cleaned movies");
    Ok(movies.len())
}
