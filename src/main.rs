use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::info;

use carryon_scraper::config::{PipelineConfig, resolve_refresh};
use carryon_scraper::fetch::{HttpFetcher, RetryPolicy};
use carryon_scraper::pipeline::Pipeline;
use carryon_scraper::scrapers::{DemandwareAdapter, TravelProAdapter, WalmartAdapter};
use carryon_scraper::traits::SiteAdapter;

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Site {
    Samsonite,
    AmericanTourister,
    Travelpro,
    Walmart,
}

impl Site {
    fn adapter(self) -> Box<dyn SiteAdapter> {
        match self {
            Self::Samsonite => Box::new(DemandwareAdapter::samsonite()),
            Self::AmericanTourister => Box::new(DemandwareAdapter::american_tourister()),
            Self::Travelpro => Box::new(TravelProAdapter::new()),
            Self::Walmart => Box::new(WalmartAdapter::new()),
        }
    }
}

/// Scrapes carry-on luggage metadata from one retailer into a CSV dataset
/// and an image-URL index, resuming from the JSON cache wherever possible.
#[derive(Debug, Parser)]
#[command(name = "carryon-scraper", version)]
struct Cli {
    /// Retailer to scrape.
    #[arg(value_enum)]
    site: Site,

    /// Root directory for the per-stage JSON cache.
    #[arg(long, default_value = "cache")]
    cache_dir: PathBuf,

    /// Directory for the CSV dataset and image index.
    #[arg(long, default_value = "output")]
    out_dir: PathBuf,

    /// Ignore the cache and refetch everything.
    #[arg(long)]
    refresh: bool,

    /// Reuse the cache without prompting (for unattended runs).
    #[arg(long, short = 'y')]
    yes: bool,

    /// Fetch attempts before a challenged or failing page turns fatal.
    #[arg(long, default_value_t = carryon_scraper::DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Seconds to wait between attempts (time for an operator to solve a
    /// challenge).
    #[arg(long, default_value_t = 60)]
    retry_delay: u64,

    /// Catalog pagination ceiling.
    #[arg(long, default_value_t = carryon_scraper::DEFAULT_MAX_PAGES)]
    max_pages: u32,

    /// Products requested per catalog page.
    #[arg(long, default_value_t = carryon_scraper::DEFAULT_PAGE_SIZE)]
    page_size: u32,

    /// In-flight cap for sites that allow concurrent page fetches.
    #[arg(long, default_value_t = carryon_scraper::DEFAULT_CONCURRENT_PAGES)]
    concurrent_pages: usize,
}

fn prompt_refresh() -> bool {
    print!("Refetch pages that are already cached? (y/n): ");
    std::io::stdout().flush().ok();

    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let refresh = resolve_refresh(
        cli.refresh,
        cli.yes,
        std::env::var("CARRYON_REFRESH").ok(),
        prompt_refresh,
    );

    let config = PipelineConfig {
        cache_dir: cli.cache_dir,
        output_dir: cli.out_dir,
        refresh,
        retry: RetryPolicy {
            max_attempts: cli.max_attempts,
            delay: Duration::from_secs(cli.retry_delay),
        },
        page_size: cli.page_size,
        max_pages: cli.max_pages,
        concurrent_pages: cli.concurrent_pages,
        ..PipelineConfig::default()
    };

    let fetcher = Arc::new(HttpFetcher::new(USER_AGENT, Duration::from_secs(30))?);
    let pipeline = Pipeline::new(fetcher, cli.site.adapter(), config);

    let summary = pipeline.run().await?;
    info!(
        records = summary.records,
        catalog_fetched = summary.catalog.fetched,
        variant_failures = summary.variants.failed,
        detail_skipped = summary.details.skipped,
        "run finished"
    );

    Ok(())
}
