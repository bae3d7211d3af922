//! Pipeline configuration. Everything the stages need, including the "reuse
//! cache or refetch?" question, is resolved up front so the pipeline itself
//! is a pure function of its config and can run unattended.

use std::path::PathBuf;
use std::time::Duration;

use crate::fetch::RetryPolicy;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root of the per-stage JSON cache.
    pub cache_dir: PathBuf,
    /// Where the CSV dataset and image index land.
    pub output_dir: PathBuf,
    /// When true, cached entries are ignored and every page is refetched.
    pub refresh: bool,
    pub retry: RetryPolicy,
    pub page_size: u32,
    pub max_pages: u32,
    /// In-flight cap for adapters that allow concurrent sibling page fetches.
    pub concurrent_pages: usize,
    /// Pause between consecutive live fetches within a stage.
    pub polite_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            output_dir: PathBuf::from("output"),
            refresh: false,
            retry: RetryPolicy::default(),
            page_size: crate::DEFAULT_PAGE_SIZE,
            max_pages: crate::DEFAULT_MAX_PAGES,
            concurrent_pages: crate::DEFAULT_CONCURRENT_PAGES,
            polite_delay: Duration::from_millis(500),
        }
    }
}

/// Resolves the refresh decision once, before the pipeline starts.
///
/// Precedence: the explicit `--refresh` flag, then `--yes` (reuse cache
/// without asking), then the environment override, and only then the
/// interactive prompt.
pub fn resolve_refresh<F>(
    refresh_flag: bool,
    assume_reuse: bool,
    env_value: Option<String>,
    prompt: F,
) -> bool
where
    F: FnOnce() -> bool,
{
    if refresh_flag {
        return true;
    }
    if assume_reuse {
        return false;
    }
    if let Some(value) = env_value {
        return matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "y" | "yes"
        );
    }
    prompt()
}
