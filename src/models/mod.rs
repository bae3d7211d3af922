//! Data models for the scrape pipeline: identifiers, variant keys, normalized
//! product records, and per-run summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque site-specific key or URL for one product family. Immutable once
/// recorded by the catalog stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductIdentifier(pub String);

impl ProductIdentifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductIdentifier {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One purchasable configuration of a product, e.g. one color. `variant` is a
/// site-specific discriminator (a color id or a color-specific URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantKey {
    pub product: ProductIdentifier,
    pub variant: String,
}

impl VariantKey {
    pub fn new(product: ProductIdentifier, variant: impl Into<String>) -> Self {
        Self {
            product,
            variant: variant.into(),
        }
    }

    /// Synthesized key for products without a variant picker: the single
    /// implicit variant is the product itself.
    pub fn default_for(product: &ProductIdentifier) -> Self {
        Self {
            product: product.clone(),
            variant: product.0.clone(),
        }
    }

    pub fn cache_key(&self) -> String {
        if self.variant == self.product.0 {
            self.product.0.clone()
        } else {
            format!("{}_{}", self.product.0, self.variant)
        }
    }
}

impl std::fmt::Display for VariantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.product, self.variant)
    }
}

/// What an adapter pulls off a detail page. The pipeline adds the brand and
/// discovery timestamp to build the final [`ProductRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetail {
    pub product_name: String,
    pub color: String,
    pub dimensions: String,
    pub weight: String,
    pub image_urls: Vec<String>,
}

/// Normalized output unit, one per variant. Appended at most once per
/// `VariantKey` when the cache is honored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub brand: String,
    pub product_name: String,
    pub color: String,
    pub dimensions: String,
    pub weight: String,
    pub image_urls: Vec<String>,
    pub discovered_at: DateTime<Utc>,
}

impl ProductRecord {
    pub fn from_detail(brand: &str, detail: ProductDetail) -> Self {
        Self {
            brand: brand.to_string(),
            product_name: detail.product_name,
            color: detail.color,
            dimensions: detail.dimensions,
            weight: detail.weight,
            image_urls: detail.image_urls,
            discovered_at: Utc::now(),
        }
    }
}

/// Per-stage counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    pub fetched: u32,
    pub cache_hits: u32,
    pub skipped: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub catalog: StageSummary,
    pub variants: StageSummary,
    pub details: StageSummary,
    /// Rows appended to the output dataset.
    pub records: u32,
}
