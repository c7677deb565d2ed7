//! Google Generative Language chat and embedding backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use delve_core::defaults::{GOOGLE_BASE_URL, GOOGLE_EMBEDDING_MODEL};
use delve_core::{ChatBackend, Completion, EmbeddingBackend, Error, Result};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub base_url: String,
    pub api_key: String,
    pub embed_model: String,
    pub timeout_secs: u64,
}

impl GoogleConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: GOOGLE_BASE_URL.to_string(),
            api_key: api_key.into(),
            embed_model: GOOGLE_EMBEDDING_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Client for the Generative Language `generateContent` and `embedContent`
/// endpoints.
pub struct GoogleBackend {
    client: Client,
    config: GoogleConfig,
}

impl GoogleBackend {
    pub fn new(config: GoogleConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Inference(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Backend from `GOOGLE_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| Error::Config("GOOGLE_API_KEY is not set".into()))?;
        Self::new(GoogleConfig::new(api_key))
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct UsageMetadata {
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u64,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbedValues,
}

#[derive(Deserialize)]
struct EmbedValues {
    values: Vec<f32>,
}

#[async_trait]
impl ChatBackend for GoogleBackend {
    async fn generate(
        &self,
        model: &str,
        system: Option<&str>,
        prompt: &str,
        json_output: bool,
    ) -> Result<Completion> {
        let mut body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}],
        });
        if let Some(system) = system {
            body["systemInstruction"] = serde_json::json!({"parts": [{"text": system}]});
        }
        if json_output {
            body["generationConfig"] = serde_json::json!({"responseMimeType": "application/json"});
        }

        debug!(model, json_output, "generateContent request");
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.config.base_url, model, self.config.api_key
        );
        let response = self.client.post(url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "generateContent error {status}: {body}"
            )));
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<String>()
            })
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Inference("generateContent returned no candidates".into()))?;
        let total_tokens = parsed
            .usage_metadata
            .map(|u| u.total_token_count)
            .unwrap_or(0);

        Ok(Completion { text, total_tokens })
    }
}

#[async_trait]
impl EmbeddingBackend for GoogleBackend {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.config.base_url, self.config.embed_model, self.config.api_key
        );
        let body = serde_json::json!({
            "content": {"parts": [{"text": text}]},
        });

        let response = self.client.post(url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "embedContent error {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response.json().await?;
        Ok(parsed.embedding.values)
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}
