//! CLI command handlers, one per file.

mod get;
mod probe;

pub use get::run_get;
pub use probe::run_probe;

use anyhow::{Context, Result};
use url::Url;

/// Parse candidate endpoint arguments, failing on the first invalid URL.
pub(crate) fn parse_endpoints(urls: &[String]) -> Result<Vec<Url>> {
    urls.iter()
        .map(|u| Url::parse(u).with_context(|| format!("invalid URL: {}", u)))
        .collect()
}
