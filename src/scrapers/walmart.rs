//! Adapter for the Walmart search endpoint. This is the one HTTP-only
//! integration: no browser session is involved, so sibling catalog pages can
//! be fetched concurrently and reassembled in page order.
//!
//! Both the search results and the product pages embed their data in the
//! `__NEXT_DATA__` script tag. Walmart listings rarely state a weight and
//! only encode dimensions inside the title, so dimensions are recovered from
//! the title text and a missing triple fails extraction rather than guessing.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::extract::dimensions_from_text;
use crate::models::{ProductDetail, ProductIdentifier, VariantKey};
use crate::scrapers::absolutize;
use crate::traits::{AdapterConfig, SiteAdapter};
use crate::{Result, ScrapeError};

pub struct WalmartAdapter {
    config: AdapterConfig,
    next_data_selector: Selector,
}

impl WalmartAdapter {
    pub fn new() -> Self {
        let base_url = "https://www.walmart.com".to_string();
        let query = urlencoding::encode("carry on luggage");
        Self {
            config: AdapterConfig {
                brand: "Walmart".to_string(),
                slug: "walmart".to_string(),
                catalog_url_pattern: format!("{base_url}/search?q={query}&page={{page}}"),
                base_url,
                field_rules: Vec::new(),
                excluded_image_types: Vec::new(),
                concurrent_catalog: true,
            },
            next_data_selector: Selector::parse("script#__NEXT_DATA__").unwrap(),
        }
    }

    fn next_data(&self, html: &str) -> Result<Value> {
        let document = Html::parse_document(html);
        let script = document
            .select(&self.next_data_selector)
            .next()
            .ok_or_else(|| {
                ScrapeError::extraction("page_data", "no __NEXT_DATA__ script tag on page")
            })?;
        serde_json::from_str(&script.inner_html()).map_err(|e| {
            ScrapeError::extraction("page_data", format!("__NEXT_DATA__ is not valid JSON: {e}"))
        })
    }

    fn selected_color(product: &Value) -> Option<String> {
        let criteria = product.get("variantCriteria")?.as_array()?;
        let colors = criteria
            .iter()
            .find(|c| c.get("id").and_then(Value::as_str) == Some("actual_color"))?;
        colors
            .get("variantList")?
            .as_array()?
            .iter()
            .find(|v| v.get("selected").and_then(Value::as_bool) == Some(true))
            .and_then(|v| v.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn weight_from_text(text: &str) -> Option<String> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"(?i)(\d+\.?\d*)\s?(lbs|lb|pounds)").expect("weight pattern is valid")
        });
        pattern
            .captures(text)
            .map(|c| format!("{} lbs", &c[1]))
    }
}

impl Default for WalmartAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteAdapter for WalmartAdapter {
    fn config(&self) -> &AdapterConfig {
        &self.config
    }

    fn parse_catalog(&self, html: &str) -> Result<Vec<ProductIdentifier>> {
        let data = self.next_data(html)?;
        let items = data
            .pointer("/props/pageProps/initialData/searchResult/itemStacks/0/items")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ScrapeError::extraction("items", "no itemStacks in search result data")
            })?;

        // Sponsored tiles have no canonical URL; skip them.
        let ids = items
            .iter()
            .filter_map(|item| item.get("canonicalUrl").and_then(Value::as_str))
            .map(ProductIdentifier::from)
            .collect();
        Ok(ids)
    }

    fn variant_url(&self, product: &ProductIdentifier) -> String {
        absolutize(&self.config.base_url, product.as_str())
    }

    /// Search listings are already one purchasable configuration each; the
    /// pipeline synthesizes the single default key from the empty list.
    fn parse_variants(&self, _html: &str, _product: &ProductIdentifier) -> Result<Vec<VariantKey>> {
        Ok(Vec::new())
    }

    fn detail_url(&self, key: &VariantKey) -> String {
        absolutize(&self.config.base_url, &key.variant)
    }

    fn parse_detail(&self, html: &str, _key: &VariantKey) -> Result<ProductDetail> {
        let data = self.next_data(html)?;
        let product = data
            .pointer("/props/pageProps/initialData/data/product")
            .ok_or_else(|| ScrapeError::extraction("product", "no product object in page data"))?;

        let product_name = product
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ScrapeError::extraction("product_name", "product has no name"))?
            .to_string();

        let color = Self::selected_color(product).unwrap_or_else(|| "Unspecified".to_string());

        let dimensions = dimensions_from_text(&product_name).ok_or_else(|| {
            ScrapeError::extraction("dimensions", "no dimension triple in the product title")
        })?;

        let description = product
            .get("shortDescription")
            .and_then(Value::as_str)
            .unwrap_or("");
        let weight = Self::weight_from_text(&product_name)
            .or_else(|| Self::weight_from_text(description))
            .unwrap_or_default();

        let mut image_urls: Vec<String> = product
            .pointer("/imageInfo/allImages")
            .and_then(Value::as_array)
            .map(|images| {
                images
                    .iter()
                    .filter_map(|img| img.get("url").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if image_urls.is_empty() {
            if let Some(thumb) = product
                .pointer("/imageInfo/thumbnailUrl")
                .and_then(Value::as_str)
            {
                image_urls.push(thumb.to_string());
            }
        }

        Ok(ProductDetail {
            product_name,
            color,
            dimensions,
            weight,
            image_urls,
        })
    }
}
