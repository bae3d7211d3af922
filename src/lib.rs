use std::time::Duration;
use thiserror::Error;

pub mod challenge;
pub mod config;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod pipeline;
pub mod scrapers;
pub mod store;
pub mod traits;

pub use challenge::ChallengeDetector;
pub use config::PipelineConfig;
pub use fetch::{HttpFetcher, PageFetcher, RetryPolicy};
pub use models::{ProductIdentifier, ProductRecord, RunSummary, VariantKey};
pub use pipeline::Pipeline;
pub use store::ResumableStore;

/// Errors from a single page fetch. Transient failures feed the bounded-retry
/// policy; fatal ones abort the current item.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transient failure fetching {url}: {reason}")]
    Transient { url: String, reason: String },
    #[error("fatal failure fetching {url}: {reason}")]
    Fatal { url: String, reason: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Transient { url, .. } | Self::Fatal { url, .. } => url,
        }
    }
}

/// The `ScrapeError` enum covers everything the pipeline and adapters can fail
/// with. Cache corruption is deliberately absent: the store downgrades it to a
/// miss instead of propagating it.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("could not extract `{field}`: {reason}")]
    Extraction { field: String, reason: String },
    #[error("invalid CSS selector `{0}`")]
    Selector(String),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ScrapeError {
    pub fn extraction(field: &str, reason: impl Into<String>) -> Self {
        Self::Extraction {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

// Defaults shared by the CLI and `PipelineConfig`.

/// Attempts before a still-challenged or still-failing fetch turns fatal.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Fixed delay between retry attempts, long enough for an operator to solve a
/// challenge in the browser session.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);
/// Products requested per catalog page.
pub const DEFAULT_PAGE_SIZE: u32 = 60;
/// Pagination ceiling, guards against sites with a stable "load more" sentinel.
pub const DEFAULT_MAX_PAGES: u32 = 50;
/// In-flight cap when an adapter allows concurrent sibling page fetches.
pub const DEFAULT_CONCURRENT_PAGES: usize = 4;
