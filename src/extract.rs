//! Label-anchored field extraction from loosely structured product copy.
//!
//! Fields are located by their preceding label text ("Dimensions:", "Weight:"),
//! never by position in the split-up text, so inserted or reordered copy does
//! not silently shift a value into the wrong column.

use std::sync::OnceLock;

use regex::Regex;
use scraper::Html;

use crate::{Result, ScrapeError};

/// One extraction rule: when `label` is found in the page text, the value that
/// follows it belongs to `field`. Rules are evaluated in order; first match
/// wins.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: String,
    pub label: String,
}

impl FieldRule {
    pub fn new(field: &str, label: &str) -> Self {
        Self {
            field: field.to_string(),
            label: label.to_string(),
        }
    }
}

/// Splits an HTML fragment into its text segments. Tag boundaries separate
/// segments, so `<strong>Weight:</strong> 7.9 lbs` becomes
/// `["Weight:", "7.9 lbs"]`.
pub fn text_segments(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Finds the value anchored to `label`: either the remainder of the segment
/// the label starts, or the following segment when the label fills its own
/// tag.
pub fn labeled_value(segments: &[String], label: &str) -> Option<String> {
    for (i, segment) in segments.iter().enumerate() {
        let Some(rest) = segment.strip_prefix(label) else {
            continue;
        };
        let inline = rest.trim_start_matches(':').trim();
        if !inline.is_empty() {
            return Some(inline.to_string());
        }
        if let Some(next) = segments.get(i + 1) {
            let next = next.trim();
            if !next.is_empty() {
                return Some(next.to_string());
            }
        }
    }
    None
}

/// Extracts `field` using the rules bound to it, in order. Fails explicitly
/// when no rule matches instead of returning a neighboring value.
pub fn extract_field(segments: &[String], rules: &[FieldRule], field: &str) -> Result<String> {
    for rule in rules.iter().filter(|r| r.field == field) {
        if let Some(value) = labeled_value(segments, &rule.label) {
            return Ok(value);
        }
    }
    Err(ScrapeError::extraction(
        field,
        "no label rule matched the page text",
    ))
}

/// Pulls a `W x D x H` dimension triple out of free text, e.g. a product title
/// like "Carry On Luggage 20 x 14 x 9 Inches". Used by sites that never label
/// dimensions explicitly.
pub fn dimensions_from_text(text: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(\d+\.?\d*)\s?[xX×]\s?(\d+\.?\d*)\s?[xX×]\s?(\d+\.?\d*)")
            .expect("dimension pattern is valid")
    });
    pattern
        .captures(text)
        .map(|c| format!("{} x {} x {}", &c[1], &c[2], &c[3]))
}
