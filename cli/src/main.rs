use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use parking_lot::RwLock;
use sitesearch_core::tokenizer::normalize;
use sitesearch_core::{IndexStore, LoadOutcome, RankingMode, SearchEngine};
use sitesearch_crawler::{CrawlConfig, Crawler, HttpFetcher};
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

#[derive(Parser)]
#[command(name = "sitesearch")]
#[command(about = "Crawl a single site and search its pages", long_about = None)]
struct Cli {
    /// Seed URL of the site to crawl
    #[arg(long, default_value = "https://quotes.toscrape.com/")]
    site: String,
    /// Index file path
    #[arg(long, default_value = "./index.json")]
    index: String,
    /// Minimum seconds between successive fetches
    #[arg(long, default_value_t = 6.0)]
    politeness_secs: f64,
    /// Maximum pages to fetch per crawl
    #[arg(long, default_value_t = 1000)]
    max_pages: usize,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    /// User-Agent header for crawl requests
    #[arg(long, default_value = "sitesearch-bot/0.1 (+https://example.com/bot)")]
    user_agent: String,
    /// Ranking mode used by find
    #[arg(long, value_enum, default_value = "tfidf")]
    ranking: RankingArg,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RankingArg {
    Tfidf,
    Cosine,
}

impl From<RankingArg> for RankingMode {
    fn from(arg: RankingArg) -> Self {
        match arg {
            RankingArg::Tfidf => RankingMode::TfIdf,
            RankingArg::Cosine => RankingMode::Cosine,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Wipe the index, crawl the site from the seed URL, save the index
    Build,
    /// Load the persisted index and report its size
    Load,
    /// List pages and occurrence counts for one word
    Print { word: String },
    /// Search the index and show the top ranked pages
    Find { query: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let store = Arc::new(RwLock::new(IndexStore::new(&cli.index)));
    match &cli.command {
        Commands::Build => build(&cli, &store).await,
        Commands::Load => load(&store),
        Commands::Print { word } => print_word(&store, word),
        Commands::Find { query } => find(&store, cli.ranking.into(), query),
    }
}

/// Wipe the index, reset the crawler, crawl from the seed, save the index.
async fn build(cli: &Cli, store: &Arc<RwLock<IndexStore>>) -> Result<()> {
    let site: Url = cli
        .site
        .parse()
        .with_context(|| format!("invalid seed URL: {}", cli.site))?;
    store.write().wipe()?;

    let fetcher = HttpFetcher::new(&cli.user_agent, Duration::from_secs(cli.timeout_secs))?;
    let mut config = CrawlConfig::new(site);
    config.politeness_window = Duration::from_secs_f64(cli.politeness_secs);
    config.max_pages = cli.max_pages;
    let mut crawler = Crawler::new(fetcher, store.clone(), config);
    crawler.reset();
    let outcome = crawler.crawl().await?;
    tracing::info!(?outcome, requested = crawler.requested_urls().len(), "crawl run finished");

    store.read().save()?;
    println!(
        "Indexed {} pages into {}.",
        store.read().page_count(),
        cli.index
    );
    Ok(())
}

fn load(store: &Arc<RwLock<IndexStore>>) -> Result<()> {
    let outcome = store.write().load()?;
    match outcome {
        LoadOutcome::Loaded => {
            println!("Index loaded: {} pages.", store.read().page_count())
        }
        LoadOutcome::Missing => println!("No index file found."),
        LoadOutcome::Corrupt => println!("Couldn't load index file correctly: index reset."),
    }
    Ok(())
}

fn print_word(store: &Arc<RwLock<IndexStore>>, word: &str) -> Result<()> {
    store.write().load()?;
    let word = normalize(word);
    let store = store.read();
    let counts = store.lookup_word(&word);
    if counts.is_empty() {
        println!("Word '{word}' not in index.");
        return Ok(());
    }
    let mut rows: Vec<(String, u32)> = counts
        .into_iter()
        .filter_map(|(page_id, count)| store.url(page_id).map(|url| (url.to_string(), count)))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    println!("Word '{word}' index:");
    for (url, count) in rows {
        println!("{count:>6}  {url}");
    }
    Ok(())
}

fn find(store: &Arc<RwLock<IndexStore>>, mode: RankingMode, query: &str) -> Result<()> {
    store.write().load()?;
    let mut engine = SearchEngine::new(store.clone(), mode);
    if mode == RankingMode::Cosine {
        engine.build_ranking_index();
    }
    let results = engine.search(query)?;
    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Top {} results for '{query}':", results.len().min(10));
    let store = store.read();
    for (i, hit) in results.iter().take(10).enumerate() {
        let url = store.url(hit.page_id).unwrap_or("<unknown>");
        println!(
            "{:>2}. [{:.4}] {:<9} {}",
            i + 1,
            hit.score,
            hit.match_type,
            url
        );
    }
    println!("Search complete.");
    Ok(())
}
