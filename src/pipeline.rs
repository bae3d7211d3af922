//! The shared scrape-and-cache pipeline: catalog, variant, and detail stages,
//! each resumable from the JSON cache and each isolating per-item failures.

use std::collections::HashSet;
use std::sync::Arc;

use futures::{StreamExt, stream};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::challenge::ChallengeDetector;
use crate::config::PipelineConfig;
use crate::export::{CsvExporter, ImageIndex};
use crate::fetch::{PageFetcher, fetch_with_challenge_retry};
use crate::models::{ProductIdentifier, ProductRecord, RunSummary, StageSummary, VariantKey};
use crate::store::ResumableStore;
use crate::traits::SiteAdapter;
use crate::{Result, ScrapeError};

const CATALOG_STAGE: &str = "catalog";
const VARIANT_STAGE: &str = "variants";
const DETAIL_STAGE: &str = "details";
/// Derived identifier list, stored apart from the raw page payloads.
const PRODUCT_IDS_KEY: &str = "product-ids";

enum PageOutcome {
    Hit(String),
    Fetched(String),
}

/// One pipeline run against one site. Owns the fetcher session and the cache
/// for the whole run; stages execute sequentially.
pub struct Pipeline<A: SiteAdapter> {
    fetcher: Arc<dyn PageFetcher>,
    detector: ChallengeDetector,
    store: ResumableStore,
    adapter: A,
    config: PipelineConfig,
}

impl<A: SiteAdapter> Pipeline<A> {
    pub fn new(fetcher: Arc<dyn PageFetcher>, adapter: A, config: PipelineConfig) -> Self {
        let store = ResumableStore::new(config.cache_dir.join(&adapter.config().slug));
        Self {
            fetcher,
            detector: ChallengeDetector::default(),
            store,
            adapter,
            config,
        }
    }

    pub fn with_detector(mut self, detector: ChallengeDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn store(&self) -> &ResumableStore {
        &self.store
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let slug = self.adapter.config().slug.clone();
        info!(site = %slug, refresh = self.config.refresh, "starting pipeline run");

        let mut summary = RunSummary::default();
        let mut exporter =
            CsvExporter::create(&self.config.output_dir, &format!("{slug}_data.csv"))?;
        let mut index = ImageIndex::open(self.config.output_dir.join("image_urls.json"))?;

        let products = self.run_catalog(&mut summary.catalog).await?;
        info!(products = products.len(), "catalog stage complete");

        let variants = self.run_variants(&products, &mut summary.variants).await?;
        info!(variants = variants.len(), "variant stage complete");

        self.run_details(&variants, &mut exporter, &mut index, &mut summary)
            .await?;
        info!(
            records = summary.records,
            dataset = %exporter.path().display(),
            "detail stage complete"
        );

        for (name, stage) in [
            ("catalog", summary.catalog),
            ("variants", summary.variants),
            ("details", summary.details),
        ] {
            info!(
                stage = name,
                fetched = stage.fetched,
                cache_hits = stage.cache_hits,
                skipped = stage.skipped,
                failed = stage.failed,
                "stage summary"
            );
        }

        Ok(summary)
    }

    async fn fetch_page(&self, url: &str) -> std::result::Result<String, crate::FetchError> {
        fetch_with_challenge_retry(self.fetcher.as_ref(), &self.detector, &self.config.retry, url)
            .await
    }

    /// Loads one page, honoring the cache-skip invariant: with `refresh`
    /// off, a present entry means no network fetch. Raw payloads are always
    /// persisted after a live fetch.
    async fn load_page(&self, stage: &str, key: &str, url: &str) -> Result<PageOutcome> {
        if !self.config.refresh && self.store.has(stage, key) {
            if let Some(payload) = self.store.get(stage, key)? {
                if let Some(html) = payload.as_str() {
                    return Ok(PageOutcome::Hit(html.to_string()));
                }
                warn!(stage, key, "cache entry has unexpected shape, refetching");
            }
        }

        let html = self.fetch_page(url).await?;
        self.store.put(stage, key, &Value::String(html.clone()))?;
        Ok(PageOutcome::Fetched(html))
    }

    async fn pause(&self) {
        if !self.config.polite_delay.is_zero() {
            tokio::time::sleep(self.config.polite_delay).await;
        }
    }

    /// Enumerates product identifiers for the category: first-occurrence
    /// order, no duplicates. A prior run's derived list short-circuits the
    /// whole stage when the cache is honored.
    async fn run_catalog(&self, s: &mut StageSummary) -> Result<Vec<ProductIdentifier>> {
        if !self.config.refresh {
            if let Some(payload) = self.store.get(CATALOG_STAGE, PRODUCT_IDS_KEY)? {
                if let Ok(ids) = serde_json::from_value::<Vec<ProductIdentifier>>(payload) {
                    info!(products = ids.len(), "reusing cached product identifiers");
                    s.cache_hits += 1;
                    return Ok(ids);
                }
                warn!("cached identifier list has unexpected shape, re-enumerating");
            }
        }

        let (ids, complete) =
            if self.adapter.config().concurrent_catalog && self.config.concurrent_pages > 1 {
                self.catalog_concurrent(s).await?
            } else {
                self.catalog_sequential(s).await?
            };

        // The derived list is only persisted when enumeration finished; an
        // aborted run leaves it absent so the next run paginates again from
        // the per-page caches instead of trusting a truncated list.
        if complete {
            self.store
                .put(CATALOG_STAGE, PRODUCT_IDS_KEY, &serde_json::to_value(&ids)?)?;
        } else {
            warn!("catalog enumeration incomplete, identifier list not persisted");
        }
        Ok(ids)
    }

    async fn catalog_sequential(
        &self,
        s: &mut StageSummary,
    ) -> Result<(Vec<ProductIdentifier>, bool)> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();

        let mut page = 0;
        while page < self.config.max_pages {
            let url = self.adapter.catalog_page_url(page, self.config.page_size);
            let key = format!("page-{page}");

            let html = match self.load_page(CATALOG_STAGE, &key, &url).await {
                Ok(PageOutcome::Hit(html)) => {
                    s.cache_hits += 1;
                    html
                }
                Ok(PageOutcome::Fetched(html)) => {
                    s.fetched += 1;
                    self.pause().await;
                    html
                }
                Err(ScrapeError::Fetch(e)) => {
                    error!(%url, error = %e, "catalog page fetch failed, stopping pagination");
                    s.failed += 1;
                    return Ok((ids, false));
                }
                Err(e) => return Err(e),
            };

            let parsed = match self.adapter.parse_catalog(&html) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(%url, error = %e, "catalog page failed to parse, stopping pagination");
                    s.failed += 1;
                    return Ok((ids, false));
                }
            };

            let before = ids.len();
            for id in parsed {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
            if ids.len() == before {
                // Stable "load more" sentinel: the site keeps serving the
                // same grid past the end.
                info!(page, "no new identifiers, pagination complete");
                return Ok((ids, true));
            }
            page += 1;
        }

        info!(ceiling = self.config.max_pages, "catalog page ceiling reached");
        Ok((ids, true))
    }

    /// Fetches sibling pages one chunk of `concurrent_pages` at a time, then
    /// reassembles each chunk in page order so the identifier ordering never
    /// depends on response arrival order. Stopping after the chunk that
    /// exhausts the catalog keeps the over-fetch past the end to at most one
    /// chunk.
    async fn catalog_concurrent(
        &self,
        s: &mut StageSummary,
    ) -> Result<(Vec<ProductIdentifier>, bool)> {
        let page_size = self.config.page_size;
        let mut seen = HashSet::new();
        let mut ids = Vec::new();

        let mut chunk_start = 0;
        while chunk_start < self.config.max_pages {
            let chunk_end = (chunk_start + self.config.concurrent_pages as u32)
                .min(self.config.max_pages);
            let mut results: Vec<(u32, Result<PageOutcome>)> =
                stream::iter(chunk_start..chunk_end)
                    .map(|page| async move {
                        let url = self.adapter.catalog_page_url(page, page_size);
                        let key = format!("page-{page}");
                        (page, self.load_page(CATALOG_STAGE, &key, &url).await)
                    })
                    .buffer_unordered(self.config.concurrent_pages)
                    .collect()
                    .await;
            results.sort_by_key(|(page, _)| *page);

            for (page, outcome) in results {
                let html = match outcome {
                    Ok(PageOutcome::Hit(html)) => {
                        s.cache_hits += 1;
                        html
                    }
                    Ok(PageOutcome::Fetched(html)) => {
                        s.fetched += 1;
                        html
                    }
                    Err(ScrapeError::Fetch(e)) => {
                        warn!(page, error = %e, "catalog page fetch failed, stopping pagination");
                        s.failed += 1;
                        return Ok((ids, false));
                    }
                    Err(e) => return Err(e),
                };

                match self.adapter.parse_catalog(&html) {
                    Ok(parsed) => {
                        let before = ids.len();
                        for id in parsed {
                            if seen.insert(id.clone()) {
                                ids.push(id);
                            }
                        }
                        if ids.len() == before {
                            info!(page, "no new identifiers, pagination complete");
                            return Ok((ids, true));
                        }
                    }
                    Err(e) => {
                        warn!(page, error = %e, "catalog page failed to parse, stopping pagination");
                        s.failed += 1;
                        return Ok((ids, false));
                    }
                }
            }
            chunk_start = chunk_end;
        }

        info!(ceiling = self.config.max_pages, "catalog page ceiling reached");
        Ok((ids, true))
    }

    /// Enumerates variant keys per product. A failure for one product is
    /// logged and skipped; it never aborts the stage, since promotional tiles
    /// mixed into product grids routinely render partial DOM.
    async fn run_variants(
        &self,
        products: &[ProductIdentifier],
        s: &mut StageSummary,
    ) -> Result<Vec<VariantKey>> {
        let mut keys = Vec::new();

        for product in products {
            let url = self.adapter.variant_url(product);
            let html = match self.load_page(VARIANT_STAGE, product.as_str(), &url).await {
                Ok(PageOutcome::Hit(html)) => {
                    s.cache_hits += 1;
                    html
                }
                Ok(PageOutcome::Fetched(html)) => {
                    s.fetched += 1;
                    self.pause().await;
                    html
                }
                Err(ScrapeError::Fetch(e)) => {
                    warn!(product = %product, %url, error = %e, "skipping product, variant page could not be fetched");
                    s.failed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.adapter.parse_variants(&html, product) {
                Ok(parsed) if parsed.is_empty() => {
                    // No variant picker: the product is its own single
                    // implicit variant.
                    keys.push(VariantKey::default_for(product));
                }
                Ok(mut parsed) => keys.append(&mut parsed),
                Err(e) => {
                    warn!(product = %product, %url, error = %e, "skipping product, variants could not be parsed");
                    s.failed += 1;
                }
            }
        }

        Ok(keys)
    }

    async fn run_details(
        &self,
        keys: &[VariantKey],
        exporter: &mut CsvExporter,
        index: &mut ImageIndex,
        summary: &mut RunSummary,
    ) -> Result<()> {
        for key in keys {
            let record = match self.detail_record(key, &mut summary.details).await {
                Ok(record) => record,
                Err(ScrapeError::Fetch(e)) => {
                    warn!(key = %key, error = %e, "skipping variant, detail page could not be fetched");
                    summary.details.failed += 1;
                    continue;
                }
                Err(ScrapeError::Extraction { field, reason }) => {
                    warn!(
                        key = %key,
                        url = %self.adapter.detail_url(key),
                        %field,
                        %reason,
                        "skipping variant, field extraction failed"
                    );
                    summary.details.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            exporter.append(&record)?;
            index.record(
                &record.brand,
                &record.product_name,
                &record.color,
                &record.image_urls,
            )?;
            summary.records += 1;
        }

        Ok(())
    }

    /// Builds the record for one variant. With the cache honored, a cached
    /// record comes back byte-stable and without any network fetch.
    async fn detail_record(&self, key: &VariantKey, s: &mut StageSummary) -> Result<ProductRecord> {
        let cache_key = key.cache_key();
        if !self.config.refresh && self.store.has(DETAIL_STAGE, &cache_key) {
            if let Some(payload) = self.store.get(DETAIL_STAGE, &cache_key)? {
                match serde_json::from_value::<ProductRecord>(payload) {
                    Ok(record) => {
                        s.cache_hits += 1;
                        return Ok(record);
                    }
                    Err(_) => {
                        warn!(key = %key, "cached record has unexpected shape, refetching");
                    }
                }
            }
        }

        let url = self.adapter.detail_url(key);
        let html = self.fetch_page(&url).await?;
        s.fetched += 1;
        self.pause().await;

        let detail = self.adapter.parse_detail(&html, key)?;
        let record = ProductRecord::from_detail(&self.adapter.config().brand, detail);
        self.store
            .put(DETAIL_STAGE, &cache_key, &serde_json::to_value(&record)?)?;
        Ok(record)
    }
}
