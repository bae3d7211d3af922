//! Adapter for the TravelPro collection pages.
//!
//! The collection grid carries the product tiles (promotional tiles reuse the
//! same classes but have no product name, so they are skipped). Color swatches
//! on a product page point at color-specific URLs; detail fields live in the
//! spec tab as label-prefixed paragraphs, which is exactly what the
//! label-anchored extraction rules are for.

use scraper::{Html, Selector};

use crate::extract::{self, FieldRule};
use crate::models::{ProductDetail, ProductIdentifier, VariantKey};
use crate::scrapers::absolutize;
use crate::traits::{AdapterConfig, SiteAdapter};
use crate::{Result, ScrapeError};

pub struct TravelProAdapter {
    config: AdapterConfig,
    tile_selector: Selector,
    tile_name_selector: Selector,
    tile_link_selector: Selector,
    swatch_selector: Selector,
    title_selector: Selector,
    tab_selector: Selector,
    photo_selector: Selector,
}

impl TravelProAdapter {
    pub fn new() -> Self {
        let base_url = "https://travelpro.com".to_string();
        Self {
            config: AdapterConfig {
                brand: "TravelPro".to_string(),
                slug: "travelpro".to_string(),
                catalog_url_pattern: format!(
                    "{base_url}/collections/carry-on-luggage?products.size={{size}}"
                ),
                base_url,
                field_rules: vec![
                    FieldRule::new("dimensions", "Overall Dimensions:"),
                    FieldRule::new("dimensions", "Dimensions:"),
                    FieldRule::new("weight", "Weight:"),
                ],
                excluded_image_types: Vec::new(),
                concurrent_catalog: false,
            },
            tile_selector: Selector::parse("div.ns-product").unwrap(),
            tile_name_selector: Selector::parse(".ns-product-name").unwrap(),
            tile_link_selector: Selector::parse("a[href]").unwrap(),
            swatch_selector: Selector::parse(".swatch-element input").unwrap(),
            title_selector: Selector::parse("h1").unwrap(),
            tab_selector: Selector::parse(".cstm_tabs_section .tabcontent").unwrap(),
            photo_selector: Selector::parse(".product-single__photos [data-src]").unwrap(),
        }
    }
}

impl Default for TravelProAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteAdapter for TravelProAdapter {
    fn config(&self) -> &AdapterConfig {
        &self.config
    }

    fn parse_catalog(&self, html: &str) -> Result<Vec<ProductIdentifier>> {
        let document = Html::parse_document(html);
        let mut ids = Vec::new();

        for tile in document.select(&self.tile_selector) {
            // Ad tiles share the grid classes but carry no product name.
            if tile.select(&self.tile_name_selector).next().is_none() {
                continue;
            }
            if let Some(href) = tile
                .select(&self.tile_link_selector)
                .next()
                .and_then(|a| a.value().attr("href"))
            {
                ids.push(ProductIdentifier(absolutize(&self.config.base_url, href)));
            }
        }
        Ok(ids)
    }

    fn variant_url(&self, product: &ProductIdentifier) -> String {
        product.0.clone()
    }

    fn parse_variants(&self, html: &str, product: &ProductIdentifier) -> Result<Vec<VariantKey>> {
        let document = Html::parse_document(html);
        let keys = document
            .select(&self.swatch_selector)
            .filter_map(|input| input.value().attr("data-url"))
            .map(|url| VariantKey::new(product.clone(), absolutize(&self.config.base_url, url)))
            .collect();
        // An empty list is fine: the pipeline falls back to the product URL
        // as the single implicit variant.
        Ok(keys)
    }

    fn detail_url(&self, key: &VariantKey) -> String {
        key.variant.clone()
    }

    fn parse_detail(&self, html: &str, _key: &VariantKey) -> Result<ProductDetail> {
        let document = Html::parse_document(html);

        let product_name = document
            .select(&self.title_selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ScrapeError::extraction("product_name", "no product title on page"))?;

        // The selected swatch names the color of this variant page.
        let swatches: Vec<_> = document.select(&self.swatch_selector).collect();
        let color = swatches
            .iter()
            .find(|input| input.value().attr("checked").is_some())
            .or_else(|| if swatches.len() == 1 { swatches.first() } else { None })
            .and_then(|input| input.value().attr("value"))
            .unwrap_or("Default")
            .to_string();

        let mut segments = Vec::new();
        for tab in document.select(&self.tab_selector) {
            segments.extend(extract::text_segments(&tab.inner_html()));
        }

        let dimensions = extract::extract_field(&segments, &self.config.field_rules, "dimensions")?;
        let weight = extract::extract_field(&segments, &self.config.field_rules, "weight")?;

        let image_urls = document
            .select(&self.photo_selector)
            .filter_map(|el| el.value().attr("data-src"))
            .map(|src| absolutize(&self.config.base_url, src))
            .collect();

        Ok(ProductDetail {
            product_name,
            color,
            dimensions,
            weight,
            image_urls,
        })
    }
}
