//! # Crawler Configuration Module
//!
//! Configuration for a single crawl run: where pages live, how requests are
//! made and paced, how failures are retried, and how results are written.
//! It uses a builder pattern for programmatic configuration and serde
//! defaults so a domain file only has to spell out what differs.
//!
//! ## Key Components
//!
//! - `CrawlerConfig`: The main configuration struct with crawler parameters
//! - `CrawlerConfigBuilder`: Builder pattern implementation for easier configuration
//! - `RetryPolicy`: Bounded retry with fixed or exponential backoff
//! - `OutputFormat`: Per-record JSON files or a single JSON-Lines file

use governor::Jitter;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Browser-like user agent; several wikis refuse library defaults
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// How accepted records are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// One pretty JSON file per record plus an aggregate array
    #[default]
    JsonFiles,
    /// One compact JSON object per line plus a failure log
    JsonLines,
}

/// Delay schedule between fetch attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    Fixed { delay_ms: u64 },
    Exponential { base_ms: u64, max_ms: u64 },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed { delay_ms: 1000 }
    }
}

/// Bounded retry policy for page fetches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Random extra delay added to each backoff, 0 disables it
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::default(),
            jitter_ms: 0,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base = match self.backoff {
            Backoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Backoff::Exponential { base_ms, max_ms } => {
                let factor = 1u64 << attempt.saturating_sub(1).min(16);
                Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
            }
        };
        if self.jitter_ms == 0 {
            return base;
        }
        Jitter::up_to(Duration::from_millis(self.jitter_ms)) + base
    }
}

/// Configuration for the crawler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Prefix for relative target URLs
    pub base_url: String,

    /// User agent to use for requests
    pub user_agent: String,

    /// Accept-Language header value
    pub accept_language: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Minimum delay in milliseconds between requests
    pub delay_ms: u64,

    /// Random extra delay in milliseconds added to `delay_ms`
    pub jitter_ms: u64,

    pub retry: RetryPolicy,

    /// Maximum number of targets to visit, 0 means all
    pub max_pages: usize,

    /// Directory results are written to, empty means the domain default
    pub output_dir: PathBuf,

    pub output_format: OutputFormat,

    /// Write aggregate and report after this many accepted pages, 0 disables
    pub flush_every: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "zh-CN,zh;q=0.9,en;q=0.8".to_string(),
            request_timeout_secs: 15,
            delay_ms: 1500,
            jitter_ms: 0,
            retry: RetryPolicy::default(),
            max_pages: 0,
            output_dir: PathBuf::new(),
            output_format: OutputFormat::default(),
            flush_every: 50,
        }
    }
}

/// Builder for CrawlerConfig
#[derive(Debug, Default)]
pub struct CrawlerConfigBuilder {
    config: CrawlerConfig,
}

impl CrawlerConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CrawlerConfig::default(),
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Set the user agent to use for requests
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Set the minimum delay between requests
    pub fn delay_ms(mut self, delay_ms: u64) -> Self {
        self.config.delay_ms = delay_ms;
        self
    }

    pub fn jitter_ms(mut self, jitter_ms: u64) -> Self {
        self.config.jitter_ms = jitter_ms;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the maximum number of pages to crawl
    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.config.max_pages = max_pages;
        self
    }

    pub fn output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = output_dir.into();
        self
    }

    pub fn output_format(mut self, output_format: OutputFormat) -> Self {
        self.config.output_format = output_format;
        self
    }

    pub fn flush_every(mut self, flush_every: usize) -> Self {
        self.config.flush_every = flush_every;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CrawlerConfig {
        self.config
    }
}

impl CrawlerConfig {
    /// Create a new builder
    pub fn builder() -> CrawlerConfigBuilder {
        CrawlerConfigBuilder::new()
    }

    /// Get the politeness delay as a Duration
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
