//! The page-fetch capability and the bounded challenge-retry policy wrapped
//! around it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

use crate::challenge::ChallengeDetector;
use crate::{FetchError, Result, ScrapeError};

/// Opaque "fetch a page" capability. Site adapters never talk to the network
/// themselves; the pipeline drives one fetcher session per run.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError>;
}

/// Bounded retry with a fixed inter-attempt delay. A detected challenge page
/// counts as a transient failure; after `max_attempts` the fetch turns fatal.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::DEFAULT_MAX_ATTEMPTS,
            delay: crate::DEFAULT_RETRY_DELAY,
        }
    }
}

/// Plain HTTP fetcher backed by reqwest.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(ScrapeError::Http)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transient {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return response.text().await.map_err(|e| FetchError::Transient {
                url: url.to_string(),
                reason: format!("could not read response body: {e}"),
            });
        }

        // Rate limiting and server hiccups are worth another attempt; other
        // statuses are not going to change on retry.
        if status.is_server_error() || status.as_u16() == 429 {
            Err(FetchError::Transient {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
            })
        } else {
            Err(FetchError::Fatal {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
            })
        }
    }
}

/// Fetch `url`, retrying transient failures and challenge pages with a fixed
/// delay. Issues exactly `policy.max_attempts` fetches before giving up with
/// a fatal error.
pub async fn fetch_with_challenge_retry(
    fetcher: &dyn PageFetcher,
    detector: &ChallengeDetector,
    policy: &RetryPolicy,
    url: &str,
) -> std::result::Result<String, FetchError> {
    let mut last_reason = String::from("no attempts made");

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            tokio::time::sleep(policy.delay).await;
        }

        match fetcher.fetch(url).await {
            Ok(html) => {
                if detector.is_challenged(&html) {
                    warn!(url, attempt, max = policy.max_attempts, "challenge page detected, waiting for it to clear");
                    last_reason = "challenge page still present".to_string();
                    continue;
                }
                return Ok(html);
            }
            Err(e @ FetchError::Fatal { .. }) => return Err(e),
            Err(FetchError::Transient { reason, .. }) => {
                warn!(url, attempt, max = policy.max_attempts, %reason, "transient fetch failure");
                last_reason = reason;
            }
        }
    }

    Err(FetchError::Fatal {
        url: url.to_string(),
        reason: format!(
            "still failing after {} attempts: {last_reason}",
            policy.max_attempts
        ),
    })
}
