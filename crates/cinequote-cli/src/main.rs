//! Cinequote CLI
//!
//! Cleans quote and movie CSVs, builds persisted TF-IDF index bundles and
//! runs keyword, tag, title, hybrid and genre searches against them.
//!
//! ## Usage
//!
//! ```bash
//! cinequote clean --kind quotes
//! cinequote index --kind quotes --compression zstd
//! cinequote search "the meaning of life" --top-k 5
//! cinequote titles --interactive
//! cinequote movies --title "star" --genre "Science Fiction"
//! ```

use anyhow::{bail, Context, Result};
use cinequote::{
    bundle::{Compression, IndexBundle},
    config::{LogFormat, LoggingSettings, Settings},
    corpus::{self, Record},
    pipeline::{HybridQuery, MovieSearcher, QuoteSearcher},
    AttributeMatcher, AttributeSet, Hit, Movie, Quote,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Corpus selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    /// Scraped quotes
    Quotes,
    /// Crawled TMDb movies
    Movies,
}

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Numbered human-readable list
    #[default]
    Text,
    /// Pretty-printed JSON array
    Json,
}

/// Bundle compression
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompressionArg {
    /// Uncompressed
    None,
    /// LZ4 (fast)
    Lz4,
    /// ZSTD (smaller)
    Zstd,
}

impl From<CompressionArg> for Compression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::None => Compression::None,
            CompressionArg::Lz4 => Compression::Lz4,
            CompressionArg::Zstd => Compression::Zstd,
        }
    }
}

#[derive(Parser)]
#[command(name = "cinequote")]
#[command(version)]
#[command(about = "TF-IDF search over quotes and movies", long_about = None)]
struct Cli {
    /// Settings file (defaults to ./cinequote.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version and effective settings
    Info,

    /// Normalize a raw CSV into its cleaned form
    Clean {
        /// Corpus kind
        #[arg(short, long, value_enum)]
        kind: Kind,

        /// Raw CSV (defaults to the configured raw path)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Cleaned CSV (defaults to the configured clean path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fit TF-IDF indexes over a cleaned CSV and save them as a bundle
    Index {
        /// Corpus kind
        #[arg(short, long, value_enum)]
        kind: Kind,

        /// Cleaned CSV (defaults to the configured clean path)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Bundle path (defaults to the configured index directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Bundle compression (defaults to the configured value)
        #[arg(short, long, value_enum)]
        compression: Option<CompressionArg>,
    },

    /// Keyword search over quotes
    Search {
        /// Query string
        query: String,

        #[command(flatten)]
        source: Source,

        /// Number of results
        #[arg(short, long)]
        top_k: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Recommend quotes sharing tags
    Tags {
        /// Tags to match (comma separated values are split)
        #[arg(required_unless_present = "list")]
        tags: Vec<String>,

        /// Print every known tag instead
        #[arg(long)]
        list: bool,

        /// Quotes CSV
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Limit the number of results
        #[arg(short, long)]
        top_k: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Search movie titles
    Titles {
        /// Title keywords (omit with --interactive)
        #[arg(required_unless_present = "interactive")]
        query: Option<String>,

        /// Keep only titles containing this text (case-insensitive)
        #[arg(long)]
        contains: Option<String>,

        /// Prompt for queries until `exit`
        #[arg(long)]
        interactive: bool,

        #[command(flatten)]
        source: Source,

        /// Number of results
        #[arg(short, long)]
        top_k: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Weighted title / synopsis / genre movie search (needs two of the three)
    Movies {
        /// Title keywords
        #[arg(long)]
        title: Option<String>,

        /// Synopsis keywords
        #[arg(long)]
        synopsis: Option<String>,

        /// Genre to match (repeatable)
        #[arg(long = "genre")]
        genres: Vec<String>,

        #[command(flatten)]
        source: Source,

        /// Number of results
        #[arg(short, long)]
        top_k: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Recommend movies sharing genres, most popular first
    Genres {
        /// Genres to match (comma separated values are split)
        #[arg(required_unless_present = "list")]
        genres: Vec<String>,

        /// Print every known genre instead
        #[arg(long)]
        list: bool,

        /// Movies CSV
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Limit the number of results
        #[arg(short, long)]
        top_k: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

/// Data file and optional index bundle
#[derive(clap::Args)]
struct Source {
    /// Cleaned CSV (defaults to the configured clean path)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Index bundle (defaults to the configured bundle when it exists)
    #[arg(short, long)]
    index: Option<PathBuf>,
}

fn init_logging(logging: &LoggingSettings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    init_logging(&settings.logging);

    match cli.command {
        Commands::Info => run_info(&settings, cli.config.as_deref()),
        Commands::Clean {
            kind,
            input,
            output,
        } => run_clean(&settings, kind, input, output),
        Commands::Index {
            kind,
            input,
            output,
            compression,
        } => run_index(&settings, kind, input, output, compression),
        Commands::Search {
            query,
            source,
            top_k,
            format,
        } => {
            let searcher = load_quotes(&settings, &source)?;
            let top_k = top_k.unwrap_or(settings.search.top_k);
            let hits = searcher.search(&query, top_k)?;
            print_quotes(&hits, format)
        }
        Commands::Tags {
            tags,
            list,
            data,
            top_k,
            format,
        } => run_tags(&settings, &tags, list, data, top_k, format),
        Commands::Titles {
            query,
            contains,
            interactive,
            source,
            top_k,
            format,
        } => {
            let searcher = load_movies(&settings, &source)?;
            let top_k = top_k.unwrap_or(settings.search.top_k);
            if interactive {
                run_titles_interactive(&settings, &searcher, top_k, contains.as_deref())
            } else {
                let query = query.unwrap_or_default();
                let hits = searcher.search_titles(&query, top_k, contains.as_deref())?;
                print_movies(&hits, format)
            }
        }
        Commands::Movies {
            title,
            synopsis,
            genres,
            source,
            top_k,
            format,
        } => {
            let searcher = load_movies(&settings, &source)?;
            let mut query = HybridQuery::new(top_k.unwrap_or(settings.search.top_k))
                .with_genres(parse_attributes(&genres));
            query.title = title;
            query.synopsis = synopsis;
            let hits = searcher.search_hybrid(&query)?;
            print_movies(&hits, format)
        }
        Commands::Genres {
            genres,
            list,
            data,
            top_k,
            format,
        } => run_genres(&settings, &genres, list, data, top_k, format),
    }
}

fn run_info(settings: &Settings, config: Option<&Path>) -> Result<()> {
    println!("Cinequote");
    println!("=========");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
    let source = config.map_or_else(
        || "defaults + cinequote.toml + CINEQUOTE_*".to_string(),
        |p| p.display().to_string(),
    );
    println!("Config: {source}");
    println!();
    println!("Data:");
    println!("  Quotes (raw):   {}", settings.data.quotes_raw.display());
    println!("  Quotes (clean): {}", settings.data.quotes.display());
    println!("  Movies (raw):   {}", settings.data.movies_raw.display());
    println!("  Movies (clean): {}", settings.data.movies.display());
    println!("  Index dir:      {}", settings.data.index_dir.display());
    println!();
    println!("Indexes:");
    println!("  Quotes:    TF-IDF over clean_text (English stop words)");
    let titles = &settings.vectorizers.titles;
    println!(
        "  Titles:    TF-IDF, n-grams {:?}, min_df {}",
        titles.ngram_range, titles.min_df
    );
    println!(
        "  Synopses:  TF-IDF, n-grams {:?}",
        settings.vectorizers.overviews.ngram_range
    );
    println!("  Bundle:    {} compression", settings.bundle.compression.as_str());
    println!();
    println!("Hybrid weights: title 0.4, synopsis 0.4, genre 0.2");
    println!("Default top-k: {}", settings.search.top_k);
    Ok(())
}

fn run_clean(
    settings: &Settings,
    kind: Kind,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let (default_input, default_output) = match kind {
        Kind::Quotes => (&settings.data.quotes_raw, &settings.data.quotes),
        Kind::Movies => (&settings.data.movies_raw, &settings.data.movies),
    };
    let input = input.unwrap_or_else(|| default_input.clone());
    let output = output.unwrap_or_else(|| default_output.clone());

    let rows = match kind {
        Kind::Quotes => corpus::clean_quotes(&input, &output),
        Kind::Movies => corpus::clean_movies(&input, &output),
    }
    .with_context(|| format!("Failed to clean {}", input.display()))?;

    println!("Cleaned {rows} rows");
    println!("Saved to: {}", output.display());
    Ok(())
}

fn run_index(
    settings: &Settings,
    kind: Kind,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    compression: Option<CompressionArg>,
) -> Result<()> {
    let compression = compression.map_or(settings.bundle.compression, Compression::from);
    let (bundle, output) = match kind {
        Kind::Quotes => {
            let input = input.unwrap_or_else(|| settings.data.quotes.clone());
            let quotes = read_quotes(&input)?;
            let searcher = QuoteSearcher::build(quotes, &settings.vectorizers.quotes)
                .context("Failed to build quote index")?;
            println!(
                "Indexed {} quotes ({} terms)",
                searcher.quotes().len(),
                searcher.index().n_features()
            );
            (
                searcher.to_bundle(),
                output.unwrap_or_else(|| settings.data.quotes_index()),
            )
        }
        Kind::Movies => {
            let input = input.unwrap_or_else(|| settings.data.movies.clone());
            let movies = read_movies(&input)?;
            let searcher = MovieSearcher::build(
                movies,
                &settings.vectorizers.titles,
                &settings.vectorizers.overviews,
            )
            .context("Failed to build movie indexes")?;
            println!(
                "Indexed {} movies ({} title terms, {} synopsis terms)",
                searcher.movies().len(),
                searcher.title_index().n_features(),
                searcher.overview_index().n_features()
            );
            (
                searcher.to_bundle(),
                output.unwrap_or_else(|| settings.data.movies_index()),
            )
        }
    };

    bundle
        .save(&output, compression)
        .with_context(|| format!("Failed to save index to {}", output.display()))?;
    println!("Index saved to: {}", output.display());
    Ok(())
}

fn read_quotes(path: &Path) -> Result<Vec<Quote>> {
    corpus::read_quotes(path).with_context(|| format!("Failed to read quotes from {}", path.display()))
}

fn read_movies(path: &Path) -> Result<Vec<Movie>> {
    corpus::read_movies(path).with_context(|| format!("Failed to read movies from {}", path.display()))
}

/// Explicit `--index`, else the configured bundle if it exists
fn bundle_path(explicit: Option<&PathBuf>, configured: PathBuf) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.clone()),
        None => configured.exists().then_some(configured),
    }
}

fn load_bundle(path: &Path, fingerprint: u64) -> Result<Option<IndexBundle>> {
    let bundle = IndexBundle::load(path)
        .with_context(|| format!("Failed to load index from {}", path.display()))?;
    match bundle.verify(fingerprint) {
        Ok(()) => Ok(Some(bundle)),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "index does not match data, rebuilding in memory");
            Ok(None)
        }
    }
}

fn load_quotes(settings: &Settings, source: &Source) -> Result<QuoteSearcher> {
    let data = source.data.clone().unwrap_or_else(|| settings.data.quotes.clone());
    let quotes = read_quotes(&data)?;

    if let Some(path) = bundle_path(source.index.as_ref(), settings.data.quotes_index()) {
        if let Some(bundle) = load_bundle(&path, QuoteSearcher::fingerprint(&quotes))? {
            return QuoteSearcher::from_bundle(quotes, bundle)
                .with_context(|| format!("Failed to use index {}", path.display()));
        }
    }
    QuoteSearcher::build(quotes, &settings.vectorizers.quotes).context("Failed to build quote index")
}

fn load_movies(settings: &Settings, source: &Source) -> Result<MovieSearcher> {
    let data = source.data.clone().unwrap_or_else(|| settings.data.movies.clone());
    let movies = read_movies(&data)?;

    if let Some(path) = bundle_path(source.index.as_ref(), settings.data.movies_index()) {
        if let Some(bundle) = load_bundle(&path, MovieSearcher::fingerprint(&movies))? {
            return MovieSearcher::from_bundle(movies, bundle)
                .with_context(|| format!("Failed to use index {}", path.display()));
        }
    }
    MovieSearcher::build(
        movies,
        &settings.vectorizers.titles,
        &settings.vectorizers.overviews,
    )
    .context("Failed to build movie indexes")
}

fn parse_attributes(values: &[String]) -> AttributeSet {
    values.iter().flat_map(|v| v.split(',')).collect()
}

fn limit<T>(mut hits: Vec<T>, top_k: Option<usize>) -> Result<Vec<T>> {
    if let Some(k) = top_k {
        if k == 0 {
            bail!("--top-k must be at least 1");
        }
        hits.truncate(k);
    }
    Ok(hits)
}

fn run_tags(
    settings: &Settings,
    tags: &[String],
    list: bool,
    data: Option<PathBuf>,
    top_k: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let data = data.unwrap_or_else(|| settings.data.quotes.clone());
    let quotes = read_quotes(&data)?;
    let matcher = AttributeMatcher::from_records(&quotes);

    if list {
        return print_vocabulary(&matcher.vocabulary(), format);
    }

    let ranked: Vec<(usize, f32)> = matcher
        .rank(&parse_attributes(tags))
        .iter()
        .map(|m| (m.index, m.match_count as f32))
        .collect();
    let hits = limit(Hit::from_ranked(&ranked, &quotes), top_k)?;
    print_quotes(&hits, format)
}

fn run_genres(
    settings: &Settings,
    genres: &[String],
    list: bool,
    data: Option<PathBuf>,
    top_k: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let data = data.unwrap_or_else(|| settings.data.movies.clone());
    let movies = read_movies(&data)?;
    let matcher = AttributeMatcher::from_records(&movies);

    if list {
        return print_vocabulary(&matcher.vocabulary(), format);
    }

    let ranked: Vec<(usize, f32)> = matcher
        .rank(&parse_attributes(genres))
        .iter()
        .map(|m| (m.index, m.match_count as f32))
        .collect();
    let hits = limit(Hit::from_ranked(&ranked, &movies), top_k)?;
    print_movies(&hits, format)
}

fn run_titles_interactive(
    settings: &Settings,
    searcher: &MovieSearcher,
    top_k: usize,
    contains: Option<&str>,
) -> Result<()> {
    println!("Title search over {} movies. Type 'exit' to quit.", searcher.movies().len());
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("title> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        let query = line?;
        let query = query.trim();
        if query.eq_ignore_ascii_case("exit") {
            break;
        }

        let filter = if settings.search.substring_filter && contains.is_none() {
            print!("filter (blank for none)> ");
            io::stdout().flush()?;
            lines.next().transpose()?.unwrap_or_default()
        } else {
            contains.unwrap_or_default().to_string()
        };

        let hits = searcher.search_titles(query, top_k, Some(filter.as_str()))?;
        print_movies(&hits, OutputFormat::Text)?;
        println!();
    }
    Ok(())
}

fn print_vocabulary(labels: &[&str], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(labels)?),
        OutputFormat::Text => {
            for label in labels {
                println!("{label}");
            }
        }
    }
    Ok(())
}

fn print_quotes(hits: &[Hit<'_, Quote>], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(hits)?);
        return Ok(());
    }
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    println!("Results ({}):", hits.len());
    println!("{}", "-".repeat(50));
    for hit in hits {
        println!("{}. [Score: {:.4}] {}", hit.rank, hit.score, hit.record.text);
        println!("   Author: {}", hit.record.author);
        if !hit.record.attributes().is_empty() {
            println!("   Tags:   {}", hit.record.tags);
        }
    }
    Ok(())
}

fn print_movies(hits: &[Hit<'_, Movie>], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(hits)?);
        return Ok(());
    }
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    println!("Results ({}):", hits.len());
    println!("{}", "-".repeat(50));
    for hit in hits {
        let movie = hit.record;
        println!("{}. [Score: {:.4}] {}", hit.rank, hit.score, movie.title);
        if !movie.release_date.is_empty() {
            println!("   Released: {}", movie.release_date);
        }
        if !movie.genre.is_empty() {
            println!("   Genre:    {}", movie.genre);
        }
        if let Some(popularity) = movie.popularity {
            println!("   Popularity: {popularity:.1}");
        }
    }
    Ok(())
}
