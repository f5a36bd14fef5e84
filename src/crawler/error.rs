//! Error types for the crawler module

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Record persistence error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

/// Why a page yielded no usable content
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// A configured selector does not parse
    #[error("invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    /// No paragraph survived cleaning
    #[error("no paragraphs found")]
    NoParagraphs,

    #[error("found {found} paragraphs, need at least {required}")]
    TooFewParagraphs { found: usize, required: usize },

    #[error("content has {length} characters, need at least {minimum}")]
    TooShort { length: usize, minimum: usize },
}

impl ExtractError {
    /// Whether the page had content that was merely too small
    pub fn is_too_short(&self) -> bool {
        matches!(
            self,
            ExtractError::TooShort { .. } | ExtractError::TooFewParagraphs { .. }
        )
    }
}

/// Error type for record persistence
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<CrawlError> for CrateError {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::Http(e) => CrateError::Http(e),
            CrawlError::Storage(e) => e.into(),
            CrawlError::UrlParse(e) => CrateError::Other(format!("URL parse error: {}", e)),
            _ => CrateError::Crawl(err.to_string()),
        }
    }
}

impl From<ExtractError> for CrateError {
    fn from(err: ExtractError) -> Self {
        CrateError::Crawl(err.to_string())
    }
}

impl From<StorageError> for CrateError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => CrateError::Io(e),
            StorageError::Json(e) => CrateError::Json(e),
        }
    }
}
