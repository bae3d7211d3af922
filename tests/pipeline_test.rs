//! End-to-end pipeline tests against a stub site: no network, a scripted
//! fetcher, and a minimal adapter whose pages are plain text.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use carryon_scraper::challenge::ChallengeDetector;
use carryon_scraper::config::PipelineConfig;
use carryon_scraper::fetch::{PageFetcher, RetryPolicy, fetch_with_challenge_retry};
use carryon_scraper::models::{ProductDetail, ProductIdentifier, VariantKey};
use carryon_scraper::pipeline::Pipeline;
use carryon_scraper::traits::{AdapterConfig, SiteAdapter};
use carryon_scraper::{FetchError, Result, ScrapeError};

/// Serves canned pages and records every URL it is asked for.
struct StubFetcher {
    pages: HashMap<String, String>,
    log: Mutex<Vec<String>>,
}

impl StubFetcher {
    fn new(pages: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            pages: pages
                .iter()
                .map(|(url, body)| (url.to_string(), body.to_string()))
                .collect(),
            log: Mutex::new(Vec::new()),
        })
    }

    fn fetch_count(&self, url: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    fn total_fetches(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
        self.log.lock().unwrap().push(url.to_string());
        self.pages.get(url).cloned().ok_or_else(|| FetchError::Fatal {
            url: url.to_string(),
            reason: "no such page in stub".to_string(),
        })
    }
}

/// Serves canned pages like [`StubFetcher`] but delays chosen URLs, and logs
/// each URL only once its response completes, exposing arrival order.
struct DelayedFetcher {
    pages: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    completed: Mutex<Vec<String>>,
}

#[async_trait]
impl PageFetcher for DelayedFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        self.completed.lock().unwrap().push(url.to_string());
        self.pages.get(url).cloned().ok_or_else(|| FetchError::Fatal {
            url: url.to_string(),
            reason: "no such page in stub".to_string(),
        })
    }
}

/// Minimal adapter: catalog pages are comma-separated ids, variant pages are
/// comma-separated colors (empty means no picker), detail pages are
/// `name|color|dimensions|weight`.
struct StubAdapter {
    config: AdapterConfig,
}

impl StubAdapter {
    fn new() -> Self {
        Self {
            config: AdapterConfig {
                brand: "Stub".to_string(),
                slug: "stub".to_string(),
                base_url: "https://stub.test".to_string(),
                catalog_url_pattern: "https://stub.test/catalog?page={page}".to_string(),
                field_rules: Vec::new(),
                excluded_image_types: Vec::new(),
                concurrent_catalog: false,
            },
        }
    }

    fn concurrent() -> Self {
        let mut adapter = Self::new();
        adapter.config.concurrent_catalog = true;
        adapter
    }
}

fn parse_list(body: &str) -> Vec<String> {
    body.trim()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl SiteAdapter for StubAdapter {
    fn config(&self) -> &AdapterConfig {
        &self.config
    }

    fn parse_catalog(&self, html: &str) -> Result<Vec<ProductIdentifier>> {
        Ok(parse_list(html).into_iter().map(ProductIdentifier).collect())
    }

    fn variant_url(&self, product: &ProductIdentifier) -> String {
        format!("https://stub.test/variants/{product}")
    }

    fn parse_variants(&self, html: &str, product: &ProductIdentifier) -> Result<Vec<VariantKey>> {
        if html.contains("BROKEN") {
            return Err(ScrapeError::extraction("variants", "partial DOM"));
        }
        Ok(parse_list(html)
            .into_iter()
            .map(|color| VariantKey::new(product.clone(), color))
            .collect())
    }

    fn detail_url(&self, key: &VariantKey) -> String {
        format!("https://stub.test/detail/{}/{}", key.product, key.variant)
    }

    fn parse_detail(&self, html: &str, _key: &VariantKey) -> Result<ProductDetail> {
        let fields: Vec<&str> = html.trim().split('|').collect();
        if fields.len() != 4 {
            return Err(ScrapeError::extraction("detail", "malformed detail page"));
        }
        Ok(ProductDetail {
            product_name: fields[0].to_string(),
            color: fields[1].to_string(),
            dimensions: fields[2].to_string(),
            weight: fields[3].to_string(),
            image_urls: vec![format!("https://cdn.stub.test/{}.jpg", fields[1])],
        })
    }
}

fn test_config(cache_dir: &std::path::Path, output_dir: &std::path::Path) -> PipelineConfig {
    PipelineConfig {
        cache_dir: cache_dir.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        refresh: false,
        retry: RetryPolicy {
            max_attempts: 2,
            delay: Duration::ZERO,
        },
        page_size: 10,
        max_pages: 5,
        concurrent_pages: 1,
        polite_delay: Duration::ZERO,
    }
}

#[tokio::test]
async fn catalog_dedups_and_preserves_first_occurrence_order() {
    let fetcher = StubFetcher::new(&[
        ("https://stub.test/catalog?page=1", "A, B"),
        ("https://stub.test/catalog?page=2", "A, C"),
        ("https://stub.test/catalog?page=3", ""),
        ("https://stub.test/variants/A", ""),
        ("https://stub.test/variants/B", ""),
        ("https://stub.test/variants/C", ""),
        ("https://stub.test/detail/A/A", "Alpha|Black|22 x 14 x 9 in|7 lbs"),
        ("https://stub.test/detail/B/B", "Beta|Black|22 x 14 x 9 in|7 lbs"),
        ("https://stub.test/detail/C/C", "Gamma|Black|22 x 14 x 9 in|7 lbs"),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        fetcher.clone(),
        StubAdapter::new(),
        test_config(&dir.path().join("cache"), &dir.path().join("out")),
    );

    let summary = pipeline.run().await.unwrap();

    let ids: Vec<String> = serde_json::from_value(
        pipeline.store().get("catalog", "product-ids").unwrap().unwrap(),
    )
    .unwrap();
    assert_eq!(ids, ["A", "B", "C"]);
    assert_eq!(summary.records, 3);

    // Page 3 yielded nothing new, so pagination stopped there.
    assert_eq!(fetcher.fetch_count("https://stub.test/catalog?page=4"), 0);
}

#[tokio::test]
async fn interrupted_catalog_is_repaginated_on_the_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache");
    let out = dir.path().join("out");

    // Page 2 is unreachable on the first run.
    let flaky = StubFetcher::new(&[
        ("https://stub.test/catalog?page=1", "A"),
        ("https://stub.test/variants/A", ""),
        ("https://stub.test/detail/A/A", "Alpha|Red|22 x 14 x 9 in|7 lbs"),
    ]);
    let first = Pipeline::new(flaky.clone(), StubAdapter::new(), test_config(&cache, &out));
    let summary = first.run().await.unwrap();

    assert_eq!(summary.catalog.failed, 1);
    assert_eq!(summary.records, 1);

    // The aborted enumeration must not be recorded as complete.
    assert!(first.store().get("catalog", "product-ids").unwrap().is_none());

    // The site recovers; the next run resumes pagination and finds B, with
    // page 1 coming straight from the cache.
    let healthy = StubFetcher::new(&[
        ("https://stub.test/catalog?page=1", "A"),
        ("https://stub.test/catalog?page=2", "B"),
        ("https://stub.test/catalog?page=3", ""),
        ("https://stub.test/variants/A", ""),
        ("https://stub.test/variants/B", ""),
        ("https://stub.test/detail/A/A", "Alpha|Red|22 x 14 x 9 in|7 lbs"),
        ("https://stub.test/detail/B/B", "Beta|Blue|22 x 14 x 9 in|7 lbs"),
    ]);
    let second = Pipeline::new(healthy.clone(), StubAdapter::new(), test_config(&cache, &out));
    let summary = second.run().await.unwrap();

    assert_eq!(healthy.fetch_count("https://stub.test/catalog?page=1"), 0);
    assert_eq!(summary.records, 2);

    let ids: Vec<String> = serde_json::from_value(
        second.store().get("catalog", "product-ids").unwrap().unwrap(),
    )
    .unwrap();
    assert_eq!(ids, ["A", "B"]);
}

#[tokio::test]
async fn variant_failure_for_one_product_does_not_abort_the_stage() {
    let fetcher = StubFetcher::new(&[
        ("https://stub.test/catalog?page=1", "P1, P2, P3"),
        ("https://stub.test/catalog?page=2", ""),
        ("https://stub.test/variants/P1", "red"),
        ("https://stub.test/variants/P2", "BROKEN"),
        ("https://stub.test/variants/P3", "blue, green"),
        ("https://stub.test/detail/P1/red", "One|Red|20 x 14 x 9 in|6 lbs"),
        ("https://stub.test/detail/P3/blue", "Three|Blue|20 x 14 x 9 in|6 lbs"),
        ("https://stub.test/detail/P3/green", "Three|Green|20 x 14 x 9 in|6 lbs"),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let pipeline = Pipeline::new(
        fetcher.clone(),
        StubAdapter::new(),
        test_config(&dir.path().join("cache"), &out),
    );

    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.variants.failed, 1);
    assert_eq!(summary.records, 3);

    let csv = fs::read_to_string(out.join("stub_data.csv")).unwrap();
    assert!(csv.contains("Stub,One,Red"));
    assert!(csv.contains("Stub,Three,Blue"));
    assert!(csv.contains("Stub,Three,Green"));
    assert!(!csv.contains("Two"));
}

#[tokio::test]
async fn second_run_is_served_entirely_from_cache() {
    let pages = [
        ("https://stub.test/catalog?page=1", "A"),
        ("https://stub.test/catalog?page=2", ""),
        ("https://stub.test/variants/A", "red"),
        ("https://stub.test/detail/A/red", "Alpha|Red|22 x 14 x 9 in|7 lbs"),
    ];
    let fetcher = StubFetcher::new(&pages);
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache");
    let out = dir.path().join("out");

    let first = Pipeline::new(fetcher.clone(), StubAdapter::new(), test_config(&cache, &out));
    first.run().await.unwrap();

    let fetches_after_first = fetcher.total_fetches();
    let cached_record = fs::read(cache.join("stub/details/A_red.json")).unwrap();

    let second = Pipeline::new(fetcher.clone(), StubAdapter::new(), test_config(&cache, &out));
    let summary = second.run().await.unwrap();

    // No new network traffic, byte-identical record, and the detail stage
    // reported a cache hit.
    assert_eq!(fetcher.total_fetches(), fetches_after_first);
    assert_eq!(fs::read(cache.join("stub/details/A_red.json")).unwrap(), cached_record);
    assert_eq!(summary.details.cache_hits, 1);
    assert_eq!(summary.details.fetched, 0);
    assert_eq!(summary.records, 1);

    // The second run exported to a numbered file, leaving the first dataset
    // alone.
    let first_csv = fs::read_to_string(out.join("stub_data.csv")).unwrap();
    let second_csv = fs::read_to_string(out.join("stub_data(1).csv")).unwrap();
    assert_eq!(first_csv, second_csv);
}

#[tokio::test]
async fn refresh_run_refetches_despite_cache() {
    let pages = [
        ("https://stub.test/catalog?page=1", "A"),
        ("https://stub.test/catalog?page=2", ""),
        ("https://stub.test/variants/A", ""),
        ("https://stub.test/detail/A/A", "Alpha|Red|22 x 14 x 9 in|7 lbs"),
    ];
    let fetcher = StubFetcher::new(&pages);
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache");
    let out = dir.path().join("out");

    Pipeline::new(fetcher.clone(), StubAdapter::new(), test_config(&cache, &out))
        .run()
        .await
        .unwrap();
    let detail_fetches = fetcher.fetch_count("https://stub.test/detail/A/A");

    let mut config = test_config(&cache, &out);
    config.refresh = true;
    Pipeline::new(fetcher.clone(), StubAdapter::new(), config)
        .run()
        .await
        .unwrap();

    assert_eq!(
        fetcher.fetch_count("https://stub.test/detail/A/A"),
        detail_fetches + 1
    );
}

#[tokio::test]
async fn challenge_retry_gives_up_after_exactly_n_attempts() {
    let challenge_html =
        r#"<div class="px-captcha-header">Before we continue...</div>"#;
    let fetcher = StubFetcher::new(&[("https://stub.test/blocked", challenge_html)]);
    let detector = ChallengeDetector::default();
    let policy = RetryPolicy {
        max_attempts: 4,
        delay: Duration::ZERO,
    };

    let err = fetch_with_challenge_retry(
        fetcher.as_ref(),
        &detector,
        &policy,
        "https://stub.test/blocked",
    )
    .await
    .unwrap_err();

    assert!(matches!(err, FetchError::Fatal { .. }));
    assert_eq!(fetcher.fetch_count("https://stub.test/blocked"), 4);
}

#[tokio::test]
async fn challenge_that_clears_mid_retry_succeeds() {
    // First attempt sees the challenge, second sees the real page.
    struct ClearingFetcher {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl PageFetcher for ClearingFetcher {
        async fn fetch(&self, _url: &str) -> std::result::Result<String, FetchError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                Ok(r#"<div class="px-captcha-header">Before we continue...</div>"#.to_string())
            } else {
                Ok("<html>real page</html>".to_string())
            }
        }
    }

    let fetcher = ClearingFetcher {
        calls: Mutex::new(0),
    };
    let policy = RetryPolicy {
        max_attempts: 3,
        delay: Duration::ZERO,
    };

    let html = fetch_with_challenge_retry(
        &fetcher,
        &ChallengeDetector::default(),
        &policy,
        "https://stub.test/page",
    )
    .await
    .unwrap();

    assert_eq!(html, "<html>real page</html>");
    assert_eq!(*fetcher.calls.lock().unwrap(), 2);
}

#[tokio::test]
async fn concurrent_catalog_keeps_page_order_despite_arrival_order() {
    let pages = [
        ("https://stub.test/catalog?page=1", "A, B"),
        ("https://stub.test/catalog?page=2", "C"),
        ("https://stub.test/catalog?page=3", ""),
        ("https://stub.test/catalog?page=4", ""),
        ("https://stub.test/variants/A", ""),
        ("https://stub.test/variants/B", ""),
        ("https://stub.test/variants/C", ""),
        ("https://stub.test/detail/A/A", "Alpha|Red|22 x 14 x 9 in|7 lbs"),
        ("https://stub.test/detail/B/B", "Beta|Blue|22 x 14 x 9 in|7 lbs"),
        ("https://stub.test/detail/C/C", "Gamma|Green|22 x 14 x 9 in|7 lbs"),
    ];
    let fetcher = Arc::new(DelayedFetcher {
        pages: pages
            .iter()
            .map(|(url, body)| (url.to_string(), body.to_string()))
            .collect(),
        // Page 1 answers last within its chunk.
        delays: HashMap::from([(
            "https://stub.test/catalog?page=1".to_string(),
            Duration::from_millis(50),
        )]),
        completed: Mutex::new(Vec::new()),
    });
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir.path().join("cache"), &dir.path().join("out"));
    config.concurrent_pages = 2;

    let pipeline = Pipeline::new(fetcher.clone(), StubAdapter::concurrent(), config);
    let summary = pipeline.run().await.unwrap();

    // Page 2 really did arrive before page 1.
    let completed = fetcher.completed.lock().unwrap().clone();
    let arrival = |suffix: &str| {
        completed
            .iter()
            .position(|u| u.ends_with(suffix))
            .unwrap_or_else(|| panic!("{suffix} never completed"))
    };
    assert!(arrival("page=2") < arrival("page=1"));

    // The identifier list is still in page order, and pagination stopped
    // after the chunk that exhausted the catalog.
    let ids: Vec<String> = serde_json::from_value(
        pipeline.store().get("catalog", "product-ids").unwrap().unwrap(),
    )
    .unwrap();
    assert_eq!(ids, ["A", "B", "C"]);
    assert_eq!(summary.records, 3);
    assert!(!completed.iter().any(|u| u.ends_with("page=5")));
}

#[tokio::test]
async fn corrupt_cache_entry_is_refetched() {
    let pages = [
        ("https://stub.test/catalog?page=1", "A"),
        ("https://stub.test/catalog?page=2", ""),
        ("https://stub.test/variants/A", ""),
        ("https://stub.test/detail/A/A", "Alpha|Red|22 x 14 x 9 in|7 lbs"),
    ];
    let fetcher = StubFetcher::new(&pages);
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache");
    let out = dir.path().join("out");

    Pipeline::new(fetcher.clone(), StubAdapter::new(), test_config(&cache, &out))
        .run()
        .await
        .unwrap();

    // Truncate one entry mid-write, as an interrupted run would.
    fs::write(cache.join("stub/variants/A.json"), "{\"truncat").unwrap();

    let summary = Pipeline::new(fetcher.clone(), StubAdapter::new(), test_config(&cache, &out))
        .run()
        .await
        .unwrap();

    assert_eq!(fetcher.fetch_count("https://stub.test/variants/A"), 2);
    assert_eq!(summary.records, 1);
}
