//! # Lorekeeper - Character Knowledge Crawler and Importer
//!
//! This crate builds per-character knowledge bases for a role-play chat
//! backend. Wiki pages are crawled politely, reduced to clean article text,
//! turned into knowledge records tagged with the owning character, and
//! submitted to the backend's RAG store in batches.
//!
//! ## Features
//!
//! - Declarative per-domain configuration in TOML
//! - Ordered content-region selection with noise removal
//! - Keyword-driven knowledge typing, tagging and importance scoring
//! - Title and content-prefix deduplication
//! - JSON files or JSON-Lines output with a crawl report
//! - Batched import with failure accounting and post-import verification
//! - Link prioritization and merging of earlier crawl outputs
//!
//! ## Example
//!
//! ```rust,no_run
//! use lorekeeper::config::DomainConfig;
//! use lorekeeper::crawler::{ContentExtractor, Crawler, HttpFetcher, RecordStore};
//! use lorekeeper::knowledge::RecordBuilder;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let domain = DomainConfig::load(Path::new("domains/einstein.toml")).await?;
//!
//!     let fetcher = HttpFetcher::new(&domain.crawl)?;
//!     let extractor = ContentExtractor::new(domain.extraction.clone())?;
//!     let store = RecordStore::open(
//!         domain.output_dir(),
//!         &domain.domain,
//!         domain.crawl.output_format,
//!     )
//!     .await?;
//!
//!     let mut crawler = Crawler::new(
//!         fetcher,
//!         extractor,
//!         RecordBuilder::new(domain.domain.clone()),
//!         store,
//!         domain.crawl.clone(),
//!     );
//!     let report = crawler.run(&domain.targets, None).await?;
//!     println!("{} of {} pages saved", report.stats.success, report.total_pages);
//!     Ok(())
//! }
//! ```

mod error;

pub mod config;
pub mod crawler;
pub mod http;
pub mod importer;
pub mod knowledge;
pub mod merge;

pub use error::{Error, Result};

/// Re-export of commonly used types
pub mod prelude {
    pub use crate::config::DomainConfig;
    pub use crate::error::{Error, Result};
    pub use crate::knowledge::{CharacterId, KnowledgeRecord};
}
