//! Adapter for the Demandware storefronts. Samsonite and American Tourister
//! run the exact same infrastructure, so one adapter covers both brands.
//!
//! The catalog comes from the `Search-UpdateGrid` endpoint; variant and
//! detail data come from the `Product-ShowQuickView` endpoint, which serves
//! its JSON wrapped in a `<pre>` tag. Product ids end in four digits that
//! select the color, so a color id doubles as a fully-qualified product id.

use scraper::{Html, Selector};
use serde_json::Value;

use crate::models::{ProductDetail, ProductIdentifier, VariantKey};
use crate::traits::{AdapterConfig, SiteAdapter};
use crate::{Result, ScrapeError};

pub struct DemandwareAdapter {
    config: AdapterConfig,
    quick_view_base: String,
    product_selector: Selector,
    pre_selector: Selector,
}

impl DemandwareAdapter {
    pub fn samsonite() -> Self {
        Self::new(
            "Samsonite",
            "samsonite",
            "https://shop.samsonite.com",
            "samsonite",
            "luggage-carry-on",
        )
    }

    pub fn american_tourister() -> Self {
        Self::new(
            "American Tourister",
            "american_tourister",
            "https://shop.americantourister.com",
            "americantourister",
            "carry-on",
        )
    }

    fn new(brand: &str, slug: &str, base_url: &str, site_id: &str, category_id: &str) -> Self {
        let catalog_url_pattern = format!(
            "{base_url}/on/demandware.store/Sites-{site_id}-Site/en_US/Search-UpdateGrid?cgid={category_id}&start={{start}}&sz={{size}}"
        );
        let quick_view_base = format!(
            "{base_url}/on/demandware.store/Sites-{site_id}-Site/en_US/Product-ShowQuickView?pid="
        );

        Self {
            config: AdapterConfig {
                brand: brand.to_string(),
                slug: slug.to_string(),
                base_url: base_url.to_string(),
                catalog_url_pattern,
                field_rules: Vec::new(),
                excluded_image_types: vec![
                    "pdp-background".to_string(),
                    "stacked-highlight".to_string(),
                    "video-thumbnail".to_string(),
                ],
                concurrent_catalog: false,
            },
            quick_view_base,
            product_selector: Selector::parse("div.product").unwrap(),
            pre_selector: Selector::parse("pre").unwrap(),
        }
    }

    /// The quick-view endpoint answers a masked pid (last four digits as
    /// `XXXX`) plus an explicit color parameter. Ids are untrusted site data:
    /// anything too short to mask, or where the cut would split a multibyte
    /// character, passes through unchanged.
    fn masked_pid(color_id: &str) -> String {
        let cut = color_id.len().saturating_sub(4);
        if cut > 0 && color_id.is_char_boundary(cut) {
            format!("{}XXXX", &color_id[..cut])
        } else {
            color_id.to_string()
        }
    }

    fn quick_view_product(&self, html: &str) -> Result<Value> {
        let document = Html::parse_document(html);
        let pre = document
            .select(&self.pre_selector)
            .next()
            .ok_or_else(|| {
                ScrapeError::extraction("product", "quick view response has no <pre> payload")
            })?;
        let raw = pre.text().collect::<String>();
        let payload: Value = serde_json::from_str(&raw).map_err(|e| {
            ScrapeError::extraction("product", format!("quick view payload is not valid JSON: {e}"))
        })?;
        payload
            .get("product")
            .cloned()
            .ok_or_else(|| ScrapeError::extraction("product", "payload has no `product` object"))
    }

    fn color_attribute(product: &Value) -> Option<&Value> {
        product
            .get("variationAttributes")?
            .as_array()?
            .iter()
            .find(|attr| attr.get("attributeId").and_then(Value::as_str) == Some("color"))
    }
}

impl SiteAdapter for DemandwareAdapter {
    fn config(&self) -> &AdapterConfig {
        &self.config
    }

    fn parse_catalog(&self, html: &str) -> Result<Vec<ProductIdentifier>> {
        let document = Html::parse_document(html);
        let ids = document
            .select(&self.product_selector)
            .filter_map(|el| el.value().attr("data-pid"))
            .map(ProductIdentifier::from)
            .collect();
        Ok(ids)
    }

    fn variant_url(&self, product: &ProductIdentifier) -> String {
        format!("{}{}", self.quick_view_base, product)
    }

    fn parse_variants(&self, html: &str, product: &ProductIdentifier) -> Result<Vec<VariantKey>> {
        let payload = self.quick_view_product(html)?;

        let mut keys = Vec::new();
        if let Some(colors) = Self::color_attribute(&payload)
            .and_then(|attr| attr.get("values"))
            .and_then(Value::as_array)
        {
            for color in colors {
                if let Some(color_id) = color.get("value").and_then(Value::as_str) {
                    keys.push(VariantKey::new(product.clone(), color_id));
                }
            }
        }
        Ok(keys)
    }

    fn detail_url(&self, key: &VariantKey) -> String {
        let masked = Self::masked_pid(&key.variant);
        format!(
            "{}{masked}&dwvar_{masked}_color={}",
            self.quick_view_base, key.variant
        )
    }

    fn parse_detail(&self, html: &str, _key: &VariantKey) -> Result<ProductDetail> {
        let product = self.quick_view_product(html)?;

        let product_name = product
            .get("productName")
            .and_then(Value::as_str)
            .ok_or_else(|| ScrapeError::extraction("product_name", "`productName` missing"))?
            .to_string();

        let color = Self::color_attribute(&product)
            .and_then(|attr| attr.get("displayValue"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ScrapeError::extraction("color", "no selected color in `variationAttributes`")
            })?
            .to_string();

        let dimensions = product
            .get("product-dimensions")
            .and_then(Value::as_str)
            .ok_or_else(|| ScrapeError::extraction("dimensions", "`product-dimensions` missing"))?
            .to_string();

        let weight_value = product
            .get("unit-weight")
            .ok_or_else(|| ScrapeError::extraction("weight", "`unit-weight` missing"))?;
        let weight_number = match weight_value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let weight_unit = product
            .get("unit-weight-type")
            .and_then(Value::as_str)
            .unwrap_or("lbs");
        let weight = format!("{weight_number} {weight_unit}");

        let mut image_urls = Vec::new();
        if let Some(images) = product.get("images").and_then(Value::as_object) {
            for (image_type, entries) in images {
                if self
                    .config
                    .excluded_image_types
                    .iter()
                    .any(|excluded| excluded == image_type)
                {
                    continue;
                }
                if let Some(entries) = entries.as_array() {
                    for entry in entries {
                        if let Some(url) = entry.get("url").and_then(Value::as_str) {
                            image_urls.push(url.to_string());
                        }
                    }
                }
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
