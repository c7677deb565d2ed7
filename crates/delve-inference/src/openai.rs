//! OpenAI-compatible chat and embedding backend.
//!
//! Both OpenAI and Groq expose this wire surface; only the base URL and
//! credentials differ.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use delve_core::defaults::{GROQ_BASE_URL, OPENAI_BASE_URL, OPENAI_EMBEDDING_MODEL};
use delve_core::{ChatBackend, Completion, EmbeddingBackend, Error, Result};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub embed_model: String,
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: api_key.into(),
            embed_model: OPENAI_EMBEDDING_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn groq(api_key: impl Into<String>) -> Self {
        Self {
            base_url: GROQ_BASE_URL.to_string(),
            api_key: api_key.into(),
            embed_model: OPENAI_EMBEDDING_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Chat and embedding client for OpenAI-compatible APIs.
pub struct OpenAiCompatBackend {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiCompatBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Inference(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// OpenAI backend from `OPENAI_API_KEY`.
    pub fn openai_from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY is not set".into()))?;
        Self::new(OpenAiConfig::openai(api_key))
    }

    /// Groq backend from `GROQ_API_KEY`.
    pub fn groq_from_env() -> Result<Self> {
        let api_key = std::env::var("GROQ_API_KEY")
            .map_err(|_| Error::Config("GROQ_API_KEY is not set".into()))?;
        Self::new(OpenAiConfig::groq(api_key))
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl ChatBackend for OpenAiCompatBackend {
    async fn generate(
        &self,
        model: &str,
        system: Option<&str>,
        prompt: &str,
        json_output: bool,
    ) -> Result<Completion> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model,
            messages,
            response_format: json_output.then(|| serde_json::json!({"type": "json_object"})),
        };

        debug!(model, json_output, "chat completion request");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "chat API error {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Inference("chat response had no content".into()))?;
        let total_tokens = parsed.usage.map(|u| u.total_tokens).unwrap_or(0);

        Ok(Completion { text, total_tokens })
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiCompatBackend {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.config.embed_model,
            input: vec![text],
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "embedding API error {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::Embedding("embedding response was empty".into()))
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}
