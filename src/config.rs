//! Layered settings.
//!
//! Built-in defaults, then `cinequote.toml` (or an explicit file), then
//! `CINEQUOTE_*` environment variables with `__` separating nested keys,
//! e.g. `CINEQUOTE_SEARCH__TOP_K=5`.

use crate::{
    bundle::Compression,
    index::{StopWords, VectorizerConfig},
    Error, Result,
};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "cinequote.toml";
/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "CINEQUOTE_";

/// All settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Data file locations
    pub data: DataSettings,
    /// Search defaults
    pub search: SearchSettings,
    /// Vectorizer options per indexed field
    pub vectorizers: VectorizerSettings,
    /// Persisted bundle options
    pub bundle: BundleSettings,
    /// Log output
    pub logging: LoggingSettings,
}

/// Data file locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSettings {
    /// Scraped quotes
    pub quotes_raw: PathBuf,
    /// Cleaned quotes
    pub quotes: PathBuf,
    /// Crawled movies
    pub movies_raw: PathBuf,
    /// Cleaned movies
    pub movies: PathBuf,
    /// Directory holding index bundles
    pub index_dir: PathBuf,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            quotes_raw: PathBuf::from("data/quotes_raw.csv"),
            quotes: PathBuf::from("data/quotes_clean.csv"),
            movies_raw: PathBuf::from("data/tmdb_10000_film.csv"),
            movies: PathBuf::from("data/tmdb_10000_film_clean.csv"),
            index_dir: PathBuf::from("data/index"),
        }
    }
}

impl DataSettings {
    /// Bundle path for the quote index
    #[must_use]
    pub fn quotes_index(&self) -> PathBuf {
        self.index_dir.join("quotes.cqix")
    }

    /// Bundle path for the movie indexes
    #[must_use]
    pub fn movies_index(&self) -> PathBuf {
        self.index_dir.join("movies.cqix")
    }
}

/// Search defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Results per query
    pub top_k: usize,
    /// Ask for a title substring filter in interactive title search
    pub substring_filter: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            top_k: 10,
            substring_filter: false,
        }
    }
}

/// Vectorizer options per indexed field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizerSettings {
    /// Quote text
    pub quotes: VectorizerConfig,
    /// Movie titles
    pub titles: VectorizerConfig,
    /// Movie synopses
    pub overviews: VectorizerConfig,
}

impl Default for VectorizerSettings {
    fn default() -> Self {
        Self {
            quotes: VectorizerConfig::default().with_stop_words(StopWords::English),
            titles: VectorizerConfig::default()
                .with_ngram_range(1, 2)
                .with_min_df(2),
            overviews: VectorizerConfig::default(),
        }
    }
}

/// Persisted bundle options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSettings {
    /// Body compression
    pub compression: Compression,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Log output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl Settings {
    /// Provider stack: defaults, TOML file, environment
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate settings.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::MissingFile(path.to_path_buf()));
            }
        }
        let settings: Self = Self::figment(path)
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.search.top_k == 0 {
            return Err(Error::InvalidConfig(
                "search.top_k must be at least 1".to_string(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "logging.level must not be empty".to_string(),
            ));
        }
        for (name, config) in [
            ("quotes", &self.vectorizers.quotes),
            ("titles", &self.vectorizers.titles),
            ("overviews", &self.vectorizers.overviews),
        ] {
            config
                .validate()
                .map_err(|e| Error::InvalidConfig(format!("vectorizers.{name}: {e}")))?;
        }
        Ok(())
    }
}
