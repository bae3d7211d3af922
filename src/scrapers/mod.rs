//! Site-specific adapters. Each one is pure parsing and URL construction;
//! the pipeline owns all fetching, caching, and retry behavior.

pub mod demandware;
pub mod travelpro;
pub mod walmart;

pub use demandware::DemandwareAdapter;
pub use travelpro::TravelProAdapter;
pub use walmart::WalmartAdapter;

/// Resolves relative and protocol-relative links against a site's base URL.
pub(crate) fn absolutize(base_url: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else if href.starts_with("//") {
        format!("https:{href}")
    } else {
        format!("{base_url}{href}")
    }
}
