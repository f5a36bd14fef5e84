//! HTTP client for the RAG knowledge backend
//!
//! This module provides the typed client used to import, search and clear
//! knowledge records.

use crate::error::{Error, Result};
use crate::knowledge::{CharacterId, ImportBatch};
use reqwest::{Client as ReqwestClient, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};
use url::Url;

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const IMPORT_PATH: &str = "api/knowledge/import/text";
pub const SEARCH_PATH: &str = "api/knowledge/search";
pub const CLEAR_PATH: &str = "api/knowledge/clear";
pub const HEALTH_PATH: &str = "api/health";

/// Response of the import endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImportResponse {
    pub success: bool,
    #[serde(alias = "importedCount")]
    pub imported_count: Option<usize>,
    pub message: Option<String>,
}

/// Body of the search endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    #[serde(rename = "characterId")]
    pub character_id: CharacterId,
    pub query: String,
    #[serde(rename = "topK")]
    pub top_k: usize,
}

impl SearchRequest {
    pub fn new(character_id: CharacterId, query: impl Into<String>, top_k: usize) -> Self {
        Self {
            character_id,
            query: query.into(),
            top_k,
        }
    }
}

/// One search hit
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchHit {
    pub title: String,
    #[serde(alias = "characterId")]
    pub character_id: Option<u32>,
    pub content: String,
}

/// Response of the search endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchResponse {
    pub count: Option<usize>,
    #[serde(alias = "knowledge_list")]
    pub results: Vec<SearchHit>,
}

impl SearchResponse {
    /// Reported count, or the number of returned hits
    pub fn hit_count(&self) -> usize {
        self.count.unwrap_or(self.results.len())
    }
}

/// Result of asking the backend to clear its knowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared,
    Unsupported,
}

/// HTTP client for the knowledge backend
#[derive(Debug, Clone)]
pub struct RagClient {
    /// The underlying reqwest client
    client: ReqwestClient,

    /// Base URL for API requests
    base_url: String,
}

impl RagClient {
    /// Create a client for `base_url` with the default timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = ReqwestClient::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn build_url(&self, path: &str) -> Result<Url> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        Url::parse(&url).map_err(|e| Error::Other(format!("Invalid URL: {}", e)))
    }

    /// Send a POST request with a JSON body
    #[instrument(skip(self, body), level = "debug")]
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let request = self.client.post(self.build_url(path)?).json(body);
        debug!("Sending POST request to {}", path);
        self.execute_request(request).await
    }

    /// Execute an HTTP request and handle the response
    async fn execute_request<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(Error::Http)?;

        let status = response.status();
        let response_text = response.text().await.map_err(Error::Http)?;

        if status.is_success() {
            serde_json::from_str(&response_text).map_err(|e| {
                error!("Failed to parse response: {}", e);
                Error::UnexpectedResponse(format!("Failed to parse response: {}", e))
            })
        } else {
            error!("API error: {} - {}", status, response_text);
            Err(Error::Api {
                status_code: status.as_u16(),
                message: response_text,
            })
        }
    }

    /// Whether the backend answers its health endpoint with 200
    pub async fn health(&self) -> bool {
        let url = match self.build_url(HEALTH_PATH) {
            Ok(url) => url,
            Err(_) => return false,
        };
        match self.client.get(url).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!("Health check failed: {}", e);
                false
            }
        }
    }

    /// Submit one batch of records
    pub async fn import_batch(&self, batch: &ImportBatch<'_>) -> Result<ImportResponse> {
        self.post(IMPORT_PATH, batch).await
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.post(SEARCH_PATH, request).await
    }

    /// Ask the backend to drop all knowledge; 404 means the endpoint is absent
    pub async fn clear(&self) -> Result<ClearOutcome> {
        self.request_clear(CLEAR_PATH).await
    }

    /// Drop only the knowledge of one character
    pub async fn clear_character(&self, character_id: CharacterId) -> Result<ClearOutcome> {
        self.request_clear(&format!("{}/{}", CLEAR_PATH, character_id)).await
    }

    async fn request_clear(&self, path: &str) -> Result<ClearOutcome> {
        match self
            .post::<serde_json::Value, _>(path, &serde_json::json!({}))
            .await
        {
            Ok(_) => Ok(ClearOutcome::Cleared),
            Err(Error::Api { status_code: 404, .. }) => Ok(ClearOutcome::Unsupported),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeRecord;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn test_import_batch_success() {
        let mut server = Server::new_async().await;
        let mock_server = server
            .mock("POST", "/api/knowledge/import/text")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""characterId":5"#.to_string()),
                Matcher::Regex(r#""title":"泰拉刃""#.to_string()),
                Matcher::Regex(r#""character_id":5"#.to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success": true, "imported_count": 1}"#)
            .expect(1)
            .create_async()
            .await;

        let client = RagClient::new(server.url()).unwrap();
        let records = vec![KnowledgeRecord::new(CharacterId::new(5), "泰拉刃", "剑")];
        let response = client
            .import_batch(&ImportBatch::new(CharacterId::new(5), &records))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.imported_count, Some(1));

        mock_server.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_accepts_knowledge_list() {
        let mut server = Server::new_async().await;
        let mock_server = server
            .mock("POST", "/api/knowledge/search")
            .match_body(Matcher::Json(serde_json::json!({
                "characterId": 3, "query": "相对论", "topK": 3
            })))
            .with_status(200)
            .with_body(r#"{"count": 2, "knowledge_list": [{"title": "相对论", "characterId": 3}]}"#)
            .expect(1)
            .create_async()
            .await;

        let client = RagClient::new(format!("{}/", server.url())).unwrap();
        let response = client
            .search(&SearchRequest::new(CharacterId::new(3), "相对论", 3))
            .await
            .unwrap();
        assert_eq!(response.hit_count(), 2);
        assert_eq!(response.results[0].character_id, Some(3));

        mock_server.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_maps_to_api_error() {
        let mut server = Server::new_async().await;
        let mock_server = server
            .mock("POST", "/api/knowledge/search")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = RagClient::new(server.url()).unwrap();
        let result = client
            .search(&SearchRequest::new(CharacterId::new(1), "哈利", 3))
            .await;
        assert!(matches!(
            result,
            Err(Error::Api { status_code: 500, ref message }) if message == "boom"
        ));

        mock_server.assert_async().await;
    }

    #[tokio::test]
    async fn test_clear_not_found_is_unsupported() {
        let mut server = Server::new_async().await;
        let mock_server = server
            .mock("POST", "/api/knowledge/clear")
            .with_status(404)
            .create_async()
            .await;

        let client = RagClient::new(server.url()).unwrap();
        assert_eq!(client.clear().await.unwrap(), ClearOutcome::Unsupported);

        mock_server.assert_async().await;
    }

    #[tokio::test]
    async fn test_clear_character_targets_one_domain() {
        let mut server = Server::new_async().await;
        let scoped = server
            .mock("POST", "/api/knowledge/clear/4")
            .with_status(200)
            .with_body(r#"{"success": true}"#)
            .expect(1)
            .create_async()
            .await;
        let global = server
            .mock("POST", "/api/knowledge/clear")
            .expect(0)
            .create_async()
            .await;
        let missing = server
            .mock("POST", "/api/knowledge/clear/2")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = RagClient::new(server.url()).unwrap();
        assert_eq!(
            client.clear_character(CharacterId::new(4)).await.unwrap(),
            ClearOutcome::Cleared
        );
        assert_eq!(
            client.clear_character(CharacterId::new(2)).await.unwrap(),
            ClearOutcome::Unsupported
        );

        scoped.assert_async().await;
        global.assert_async().await;
        missing.assert_async().await;
    }

    #[tokio::test]
    async fn test_health() {
        let mut server = Server::new_async().await;
        let mock_server = server
            .mock("GET", "/api/health")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let client = RagClient::new(server.url()).unwrap();
        assert!(client.health().await);
        mock_server.assert_async().await;

        let unreachable = RagClient::new("http://127.0.0.1:9").unwrap();
        assert!(!unreachable.health().await);
    }
}
