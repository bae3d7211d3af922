//! The seam between the shared pipeline and per-site knowledge.

use crate::Result;
use crate::extract::FieldRule;
use crate::models::{ProductDetail, ProductIdentifier, VariantKey};

/// Static configuration for one site adapter.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Brand name written into every output record.
    pub brand: String,
    /// Short lowercase name used for the dataset file and cache namespace.
    pub slug: String,
    /// Base URL for resolving relative links.
    pub base_url: String,
    /// Catalog URL template with `{page}`, `{start}`, and `{size}`
    /// placeholders; sites use whichever subset applies.
    pub catalog_url_pattern: String,
    /// Label-anchored extraction rules for detail fields.
    pub field_rules: Vec<FieldRule>,
    /// Image-type labels excluded from the image index (backgrounds,
    /// thumbnails, video stills).
    pub excluded_image_types: Vec<String>,
    /// True only for HTTP-only endpoints where sibling catalog pages can be
    /// fetched in parallel.
    pub concurrent_catalog: bool,
}

/// Site-specific glue: URL construction and DOM/JSON parsing. Adapters are
/// pure parsers; every network fetch goes through the pipeline so caching,
/// challenge retry, and summaries apply uniformly.
pub trait SiteAdapter: Send + Sync {
    fn config(&self) -> &AdapterConfig;

    /// URL of one catalog page. `page` is zero-based.
    fn catalog_page_url(&self, page: u32, page_size: u32) -> String {
        self.config()
            .catalog_url_pattern
            .replace("{page}", &(page + 1).to_string())
            .replace("{start}", &(page * page_size).to_string())
            .replace("{size}", &page_size.to_string())
    }

    /// Product identifiers on a catalog page, in page order. Duplicates
    /// across pages are fine; the pipeline dedups.
    fn parse_catalog(&self, html: &str) -> Result<Vec<ProductIdentifier>>;

    /// URL of the page that enumerates a product's variants.
    fn variant_url(&self, product: &ProductIdentifier) -> String;

    /// Variant keys for one product. An empty list means the product has no
    /// variant picker; the pipeline synthesizes the single default key.
    fn parse_variants(
        &self,
        html: &str,
        product: &ProductIdentifier,
    ) -> Result<Vec<VariantKey>>;

    /// URL of one variant's detail page.
    fn detail_url(&self, key: &VariantKey) -> String;

    /// Normalized detail fields for one variant. Must fail with an extraction
    /// error when a field cannot be located, never guess.
    fn parse_detail(&self, html: &str, key: &VariantKey) -> Result<ProductDetail>;
}

impl SiteAdapter for Box<dyn SiteAdapter> {
    fn config(&self) -> &AdapterConfig {
        (**self).config()
    }

    fn catalog_page_url(&self, page: u32, page_size: u32) -> String {
        (**self).catalog_page_url(page, page_size)
    }

    fn parse_catalog(&self, html: &str) -> Result<Vec<ProductIdentifier>> {
        (**self).parse_catalog(html)
    }

    fn variant_url(&self, product: &ProductIdentifier) -> String {
        (**self).variant_url(product)
    }

    fn parse_variants(
        &self,
        html: &str,
        product: &ProductIdentifier,
    ) -> Result<Vec<VariantKey>> {
        (**self).parse_variants(html, product)
    }

    fn detail_url(&self, key: &VariantKey) -> String {
        (**self).detail_url(key)
    }

    fn parse_detail(&self, html: &str, key: &VariantKey) -> Result<ProductDetail> {
        (**self).parse_detail(html, key)
    }
}
