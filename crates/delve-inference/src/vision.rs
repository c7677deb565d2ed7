//! Google Cloud Vision image annotation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use delve_core::defaults::VISION_BASE_URL;
use delve_core::{Error, ImageAnnotations, ImageData, Result, VisionAnnotator};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Feature types requested for every image.
const FEATURES: &[&str] = &[
    "TEXT_DETECTION",
    "LABEL_DETECTION",
    "OBJECT_LOCALIZATION",
    "IMAGE_PROPERTIES",
    "SAFE_SEARCH_DETECTION",
    "FACE_DETECTION",
];

/// Results requested per feature.
const MAX_FEATURE_RESULTS: u32 = 10;

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl VisionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: VISION_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Client for the `images:annotate` endpoint.
pub struct GoogleVisionClient {
    client: Client,
    config: VisionConfig,
}

impl GoogleVisionClient {
    pub fn new(config: VisionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Inference(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Client from `GOOGLE_VISION_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GOOGLE_VISION_API_KEY")
            .map_err(|_| Error::Config("GOOGLE_VISION_API_KEY is not set".into()))?;
        Self::new(VisionConfig::new(api_key))
    }
}

fn string_list(value: &Value, path: &str, field: &str) -> Vec<String> {
    value[path]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item[field].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_annotations(response: &Value) -> ImageAnnotations {
    let text = response["fullTextAnnotation"]["text"]
        .as_str()
        .map(String::from);
    let labels = string_list(response, "labelAnnotations", "description");
    let objects = string_list(response, "localizedObjectAnnotations", "name");

    let dominant_colors = response["imagePropertiesAnnotation"]["dominantColors"]["colors"]
        .as_array()
        .map(|colors| {
            colors
                .iter()
                .take(5)
                .map(|c| {
                    format!(
                        "rgb({}, {}, {})",
                        c["color"]["red"].as_f64().unwrap_or(0.0) as u8,
                        c["color"]["green"].as_f64().unwrap_or(0.0) as u8,
                        c["color"]["blue"].as_f64().unwrap_or(0.0) as u8
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let safe_search = response["safeSearchAnnotation"].as_object().map(|fields| {
        fields
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| format!("{k}: {v}")))
            .collect::<Vec<_>>()
            .join(", ")
    });

    let face_count = response["faceAnnotations"]
        .as_array()
        .map(|f| f.len())
        .unwrap_or(0);

    ImageAnnotations {
        text,
        labels,
        objects,
        dominant_colors,
        safe_search,
        face_count,
    }
}

#[async_trait]
impl VisionAnnotator for GoogleVisionClient {
    async fn annotate(&self, image: &ImageData) -> Result<ImageAnnotations> {
        let features: Vec<Value> = FEATURES
            .iter()
            .map(|f| serde_json::json!({"type": f, "maxResults": MAX_FEATURE_RESULTS}))
            .collect();
        let body = serde_json::json!({
            "requests": [{
                "image": {"content": image.base64},
                "features": features,
            }]
        });

        debug!(image = %image.name, "vision annotation request");
        let url = format!("{}?key={}", self.config.base_url, self.config.api_key);
        let response = self.client.post(url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "vision API error {status}: {body}"
            )));
        }

        let parsed: Value = response.json().await?;
        let first = &parsed["responses"][0];
        if let Some(message) = first["error"]["message"].as_str() {
            return Err(Error::Inference(format!("vision annotation failed: {message}")));
        }

        Ok(parse_annotations(first))
    }
}
