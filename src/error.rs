//! Error types for the lorekeeper crate

use thiserror::Error;

/// Result type for lorekeeper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for lorekeeper operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The knowledge backend returned a non-success status
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code
        status_code: u16,
        /// Response body
        message: String,
    },

    /// Unexpected response format
    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),

    /// Invalid domain configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Web crawling error
    #[error("Crawl error: {0}")]
    Crawl(String),

    /// Record persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Knowledge import error
    #[error("Import error: {0}")]
    Import(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}
