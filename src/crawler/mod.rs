//! Wiki crawler for per-character knowledge
//!
//! This module fetches configured pages, extracts their main text,
//! turns it into knowledge records and persists them with deduplication.

mod config;
mod content_extraction;
mod error;
mod fetcher;
mod links;
mod pacing;
mod pipeline;
mod storage;

pub use config::{Backoff, CrawlerConfig, CrawlerConfigBuilder, OutputFormat, RetryPolicy};
pub use content_extraction::{
    ContentExtractor, ExtractedContent, ExtractorConfig, ExtractorConfigBuilder, RegionSelector,
};
pub use error::{CrawlError, ExtractError, StorageError};
pub use fetcher::{HttpFetcher, PageFetcher};
pub use links::{load_links, LinkEntry, LinkPriority};
pub use pacing::Pacer;
pub use pipeline::{CrawlProgress, Crawler, PageOutcome, RejectReason};
pub use storage::{sanitize_filename, CrawlReport, CrawlStats, Duplicate, PageSummary, RecordStore};

use serde::{Deserialize, Serialize};
use url::Url;

fn default_importance() -> u8 {
    5
}

/// A page to crawl, as listed in a domain file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTarget {
    /// Absolute URL, or a path relative to the crawl's base URL
    pub url: String,

    pub title: String,

    #[serde(default)]
    pub category: String,

    /// Seed importance between 1 and 10
    #[serde(default = "default_importance")]
    pub importance: u8,
}

impl PageTarget {
    /// The absolute URL of this target
    pub fn resolve(&self, base_url: &str) -> Result<String, CrawlError> {
        let url = if self.url.starts_with("http") {
            self.url.clone()
        } else {
            format!("{}{}", base_url.trim_end_matches('/'), self.url)
        };
        Url::parse(&url)?;
        Ok(url)
    }
}
