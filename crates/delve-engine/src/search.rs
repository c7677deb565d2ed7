//! Exa web search client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use delve_core::defaults::{EXA_BASE_URL, MAX_CONTENT_CHARS};
use delve_core::{Error, Result, SearchResult, WebSearchProvider};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Result recency window in days, applied to both published and crawl dates.
pub const RECENCY_WINDOW_DAYS: i64 = 365;

/// Video platforms excluded from results; their pages carry no extractable
/// article text.
const EXCLUDED_DOMAINS: &[&str] = &["youtube.com", "www.youtube.com"];

#[derive(Debug, Clone)]
pub struct ExaSearchConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub max_content_chars: usize,
}

impl ExaSearchConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: EXA_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_content_chars: MAX_CONTENT_CHARS,
        }
    }
}

/// Keyword-mode search over the Exa API.
pub struct ExaSearchClient {
    client: Client,
    config: ExaSearchConfig,
}

impl ExaSearchClient {
    pub fn new(config: ExaSearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Search(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Client from `EXA_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("EXA_API_KEY")
            .map_err(|_| Error::Config("EXA_API_KEY is not set".into()))?;
        Self::new(ExaSearchConfig::new(api_key))
    }
}

#[derive(Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Deserialize)]
struct ExaResult {
    #[serde(default)]
    title: Option<String>,
    url: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl WebSearchProvider for ExaSearchClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let window_start = (Utc::now() - chrono::Duration::days(RECENCY_WINDOW_DAYS)).to_rfc3339();
        let body = serde_json::json!({
            "query": query,
            "type": "keyword",
            "numResults": max_results,
            "contents": {"text": {"maxCharacters": self.config.max_content_chars}},
            "startPublishedDate": window_start,
            "startCrawlDate": window_start,
            "excludeDomains": EXCLUDED_DOMAINS,
        });

        debug!(query, max_results, "exa search request");
        let response = self
            .client
            .post(&self.config.base_url)
            .header("x-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Search(format!("exa API error {status}: {body}")));
        }

        let parsed: ExaResponse = response.json().await?;
        let results = parsed
            .results
            .into_iter()
            .filter_map(|r| {
                // Results without a title or body are unusable downstream.
                let title = r.title.filter(|t| !t.is_empty())?;
                let text = r.text.filter(|t| !t.is_empty())?;
                Some(SearchResult {
                    title,
                    url: r.url,
                    content: text.chars().take(self.config.max_content_chars).collect(),
                })
            })
            .take(max_results)
            .collect();

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ExaSearchClient {
        ExaSearchClient::new(ExaSearchConfig {
            base_url: format!("{}/search", server.uri()),
            api_key: "test-key".to_string(),
            timeout_secs: 5,
            max_content_chars: 50,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_search_sends_keyword_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("x-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "query": "rust async",
                "type": "keyword",
                "numResults": 3,
                "excludeDomains": ["youtube.com", "www.youtube.com"],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"title": "Async book", "url": "https://a.example", "text": "content a"},
                    {"title": "Tokio docs", "url": "https://b.example", "text": "content b"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let results = client(&server).search("rust async", 3).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Async book");
        assert_eq!(results[1].url, "https://b.example");
    }

    #[tokio::test]
    async fn test_search_filters_incomplete_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"title": "Good", "url": "https://a.example", "text": "body"},
                    {"url": "https://no-title.example", "text": "body"},
                    {"title": "No text", "url": "https://no-text.example"},
                    {"title": "", "url": "https://empty-title.example", "text": "body"}
                ]
            })))
            .mount(&server)
            .await;

        let results = client(&server).search("q", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Good");
    }

    #[tokio::test]
    async fn test_search_truncates_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"title": "Long", "url": "https://a.example", "text": "x".repeat(500)}
                ]
            })))
            .mount(&server)
            .await;

        let results = client(&server).search("q", 1).await.unwrap();
        assert_eq!(results[0].content.len(), 50);
    }

    #[tokio::test]
    async fn test_search_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = client(&server).search("q", 1).await.unwrap_err();
        assert!(matches!(err, Error::Search(_)));
    }
}
