//! Detection of the anti-automation interstitial some storefronts serve in
//! place of real content.

use scraper::{Html, Selector};

use crate::{Result, ScrapeError};

/// Recognizes a challenge page by a marker text fragment inside a known
/// container element. Pure check, no I/O.
#[derive(Debug, Clone)]
pub struct ChallengeDetector {
    container: Selector,
    marker: String,
}

impl Default for ChallengeDetector {
    fn default() -> Self {
        // The PerimeterX interstitial used by the Demandware storefronts.
        Self {
            container: Selector::parse("div.px-captcha-header").unwrap(),
            marker: "Before we continue...".to_string(),
        }
    }
}

impl ChallengeDetector {
    pub fn new(container_css: &str, marker: impl Into<String>) -> Result<Self> {
        let container = Selector::parse(container_css)
            .map_err(|_| ScrapeError::Selector(container_css.to_string()))?;
        Ok(Self {
            container,
            marker: marker.into(),
        })
    }

    /// True when the marker text appears inside the challenge container. The
    /// same text anywhere else on the page does not count.
    pub fn is_challenged(&self, html: &str) -> bool {
        let document = Html::parse_document(html);
        document
            .select(&self.container)
            .any(|el| el.text().collect::<String>().contains(&self.marker))
    }
}
