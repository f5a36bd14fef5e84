//! Page fetching over HTTP

use crate::crawler::config::{CrawlerConfig, RetryPolicy};
use crate::crawler::error::CrawlError;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use reqwest::Client;
use std::future::Future;
use tracing::{debug, instrument, warn};

/// Source of raw page HTML
pub trait PageFetcher {
    /// Fetch the page at `url` and return its body
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, CrawlError>> + Send;
}

/// Fetches pages with browser-like headers and a bounded retry policy
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self, CrawlError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        let language = HeaderValue::from_str(&config.accept_language)
            .map_err(|e| CrawlError::Other(format!("Invalid Accept-Language: {}", e)))?;
        headers.insert(ACCEPT_LANGUAGE, language);

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            retry: config.retry.clone(),
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<String, CrawlError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl PageFetcher for HttpFetcher {
    #[instrument(skip(self), level = "debug")]
    async fn fetch(&self, url: &str) -> Result<String, CrawlError> {
        let attempts = self.retry.attempts();
        let mut attempt = 1;
        loop {
            match self.fetch_once(url).await {
                Ok(body) => {
                    debug!("Fetched {} ({} bytes)", url, body.len());
                    return Ok(body);
                }
                Err(e) if attempt < attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        "Fetch attempt {}/{} for {} failed: {}, retrying in {:?}",
                        attempt, attempts, url, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::config::Backoff;
    use mockito::Server;

    fn config(max_attempts: u32) -> CrawlerConfig {
        CrawlerConfig::builder()
            .request_timeout_secs(5)
            .retry(RetryPolicy {
                max_attempts,
                backoff: Backoff::Fixed { delay_ms: 10 },
                jitter_ms: 0,
            })
            .build()
    }

    #[tokio::test]
    async fn test_fetch_sends_browser_headers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/wiki/Einstein")
            .match_header("user-agent", mockito::Matcher::Regex("Mozilla".to_string()))
            .match_header("accept-language", mockito::Matcher::Regex("zh-CN".to_string()))
            .with_status(200)
            .with_body("<html><p>正文</p></html>")
            .expect(1)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&config(1)).unwrap();
        let body = fetcher
            .fetch(&format!("{}/wiki/Einstein", server.url()))
            .await
            .unwrap();
        assert!(body.contains("正文"));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_error_status_fails_without_retry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&config(1)).unwrap();
        let result = fetcher.fetch(&format!("{}/missing", server.url())).await;
        assert!(matches!(result, Err(CrawlError::Http(_))));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_retries_up_to_policy() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&config(3)).unwrap();
        assert!(fetcher.fetch(&format!("{}/flaky", server.url())).await.is_err());

        mock.assert_async().await;
    }
}
