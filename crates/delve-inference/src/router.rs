//! Provider dispatch, retry, structured output, and the image analysis path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use schemars::gen::SchemaGenerator;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use delve_core::defaults::{MAX_RETRY_ATTEMPTS, RETRY_DELAY_MS};
use delve_core::{
    ActivityStatus, ActivityTracker, ActivityType, ChatBackend, Completion, Error, ImageAnnotations,
    ImageData, ModelProvider, ResearchState, Result, TaskKind, VisionAnnotator,
};

use crate::registry::{model_for, resolve_family, substitute_wrong_family};

/// Text substituted for image findings when the entire vision path fails.
pub const IMAGE_ANALYSIS_DEGRADED: &str =
    "Image analysis failed. Continuing research based on text only.";

/// Retry behavior for model calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per call, first try included.
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `base_delay * n`.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRY_ATTEMPTS,
            base_delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }
}

impl RetryConfig {
    /// Reads `DELVE_MAX_RETRY_ATTEMPTS` and `DELVE_RETRY_DELAY_MS`, falling
    /// back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_attempts = std::env::var("DELVE_MAX_RETRY_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_attempts);
        let base_delay = std::env::var("DELVE_RETRY_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.base_delay);
        Self {
            max_attempts,
            base_delay,
        }
    }
}

/// Routes tasks to provider backends with retry and structured output.
///
/// Backends are registered per concrete family; the hybrid pseudo-provider
/// is resolved to a family before dispatch. A vision annotator is optional;
/// sessions without one degrade image analysis to the fixed fallback text.
pub struct ModelRouter {
    backends: HashMap<ModelProvider, Arc<dyn ChatBackend>>,
    vision: Option<Arc<dyn VisionAnnotator>>,
    retry: RetryConfig,
}

impl ModelRouter {
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            backends: HashMap::new(),
            vision: None,
            retry,
        }
    }

    pub fn with_backend(mut self, family: ModelProvider, backend: Arc<dyn ChatBackend>) -> Self {
        self.backends.insert(family, backend);
        self
    }

    pub fn with_vision(mut self, vision: Arc<dyn VisionAnnotator>) -> Self {
        self.vision = Some(vision);
        self
    }

    fn backend(&self, family: ModelProvider) -> Result<&Arc<dyn ChatBackend>> {
        self.backends
            .get(&family)
            .ok_or_else(|| Error::Config(format!("no backend registered for provider {family}")))
    }

    /// Model id and backend family a call will use.
    fn route(&self, provider: ModelProvider, task: TaskKind) -> (ModelProvider, String) {
        let family = resolve_family(provider, task);
        let model = substitute_wrong_family(family, task, model_for(provider, task));
        (family, model)
    }

    async fn generate_with_retry(
        &self,
        family: ModelProvider,
        task: TaskKind,
        model: &str,
        system: Option<&str>,
        prompt: &str,
        json_output: bool,
        tracker: &ActivityTracker,
    ) -> Result<Completion> {
        let backend = self.backend(family)?;
        let mut attempt = 1;
        loop {
            match backend.generate(model, system, prompt, json_output).await {
                Ok(completion) => return Ok(completion),
                Err(e) if attempt < self.retry.max_attempts && e.is_retryable() => {
                    warn!(
                        %family,
                        model,
                        attempt,
                        error = %e,
                        "model call failed, retrying"
                    );
                    tracker.add(
                        activity_for(task),
                        ActivityStatus::Warning,
                        format!(
                            "Model call failed (attempt {attempt} of {}), retrying",
                            self.retry.max_attempts
                        ),
                    );
                    tokio::time::sleep(self.retry.base_delay * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Free-form text generation for `task` on `provider`.
    ///
    /// On success the session's token and step counters are updated from
    /// the reported usage.
    pub async fn call_text(
        &self,
        provider: ModelProvider,
        task: TaskKind,
        system: Option<&str>,
        prompt: &str,
        state: &ResearchState,
        tracker: &ActivityTracker,
    ) -> Result<Completion> {
        let (family, model) = self.route(provider, task);
        debug!(%provider, %family, model, %task, "dispatching text call");
        let completion = self
            .generate_with_retry(family, task, &model, system, prompt, false, tracker)
            .await?;
        state.record_usage(completion.total_tokens);
        state.mark_step();
        Ok(completion)
    }

    /// Generation constrained to a JSON value deserializable as `T`.
    ///
    /// The JSON schema for `T` is appended to the prompt and the provider's
    /// JSON mode is enabled; the response body is still validated locally.
    /// Parse failures count as retryable attempts since model output varies
    /// between samples. On success the session's counters are updated with
    /// the tokens spent across all attempts.
    pub async fn call_structured<T>(
        &self,
        provider: ModelProvider,
        task: TaskKind,
        system: Option<&str>,
        prompt: &str,
        state: &ResearchState,
        tracker: &ActivityTracker,
    ) -> Result<T>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let (family, model) = self.route(provider, task);
        let schema = SchemaGenerator::default().into_root_schema_for::<T>();
        let schema_text = serde_json::to_string_pretty(&schema)?;
        let full_prompt = format!(
            "{prompt}\n\nRespond with a single JSON object that conforms to this JSON Schema:\n{schema_text}"
        );

        debug!(%provider, %family, model, %task, "dispatching structured call");
        let backend = self.backend(family)?;
        let mut tokens = 0u64;
        let mut attempt = 1;
        loop {
            let result = match backend.generate(&model, system, &full_prompt, true).await {
                Ok(completion) => {
                    tokens += completion.total_tokens;
                    serde_json::from_str::<T>(extract_json(&completion.text))
                        .map_err(|e| Error::Schema(format!("invalid structured response: {e}")))
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => {
                    state.record_usage(tokens);
                    state.mark_step();
                    return Ok(value);
                }
                Err(e) if attempt < self.retry.max_attempts && e.is_retryable() => {
                    warn!(%family, model, attempt, error = %e, "structured call failed, retrying");
                    tracker.add(
                        activity_for(task),
                        ActivityStatus::Warning,
                        format!(
                            "Model call failed (attempt {attempt} of {}), retrying",
                            self.retry.max_attempts
                        ),
                    );
                    tokio::time::sleep(self.retry.base_delay * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Analyzes attached images and returns the text findings.
    ///
    /// Annotation runs for the whole batch first; a batch failure falls back
    /// to per-image analysis, and per-image failures are reported as error
    /// activities and skipped. If nothing survives, the fixed degradation
    /// text is returned so the session continues on text alone. Token usage
    /// flows into the session counters through the underlying text calls.
    pub async fn analyze_images(
        &self,
        provider: ModelProvider,
        topic: &str,
        images: &[ImageData],
        state: &ResearchState,
        tracker: &ActivityTracker,
    ) -> String {
        if images.is_empty() {
            return String::new();
        }

        let Some(vision) = &self.vision else {
            warn!("no vision annotator configured, skipping image analysis");
            tracker.add(
                ActivityType::ImageAnalysis,
                ActivityStatus::Warning,
                IMAGE_ANALYSIS_DEGRADED,
            );
            return IMAGE_ANALYSIS_DEGRADED.to_string();
        };

        tracker.add(
            ActivityType::ImageAnalysis,
            ActivityStatus::Pending,
            format!("Analyzing {} attached image(s)", images.len()),
        );

        match self
            .analyze_batch(vision, provider, topic, images, state, tracker)
            .await
        {
            Ok(text) => {
                tracker.add(
                    ActivityType::ImageAnalysis,
                    ActivityStatus::Complete,
                    format!("Analyzed {} image(s)", images.len()),
                );
                text
            }
            Err(e) => {
                warn!(error = %e, "batch image analysis failed, trying images individually");
                self.analyze_individually(vision, provider, topic, images, state, tracker)
                    .await
            }
        }
    }

    async fn analyze_batch(
        &self,
        vision: &Arc<dyn VisionAnnotator>,
        provider: ModelProvider,
        topic: &str,
        images: &[ImageData],
        state: &ResearchState,
        tracker: &ActivityTracker,
    ) -> Result<String> {
        let annotations = join_all(images.iter().map(|image| vision.annotate(image))).await;

        let mut blocks = Vec::with_capacity(images.len());
        for (image, result) in images.iter().zip(annotations) {
            blocks.push(annotations_block(&image.name, &result?));
        }

        let prompt = image_prompt(topic, &blocks);
        let completion = self
            .call_text(provider, TaskKind::ImageAnalysis, None, &prompt, state, tracker)
            .await?;
        Ok(completion.text)
    }

    async fn analyze_individually(
        &self,
        vision: &Arc<dyn VisionAnnotator>,
        provider: ModelProvider,
        topic: &str,
        images: &[ImageData],
        state: &ResearchState,
        tracker: &ActivityTracker,
    ) -> String {
        let mut findings = Vec::new();

        for image in images {
            let result = async {
                let annotations = vision.annotate(image).await?;
                let prompt = image_prompt(topic, &[annotations_block(&image.name, &annotations)]);
                self.call_text(provider, TaskKind::ImageAnalysis, None, &prompt, state, tracker)
                    .await
            }
            .await;

            match result {
                Ok(completion) => findings.push(completion.text),
                Err(e) => {
                    warn!(image = %image.name, error = %e, "image analysis failed");
                    tracker.add(
                        ActivityType::ImageAnalysis,
                        ActivityStatus::Error,
                        format!("Failed to analyze image: {}", image.name),
                    );
                }
            }
        }

        if findings.is_empty() {
            tracker.add(
                ActivityType::ImageAnalysis,
                ActivityStatus::Warning,
                IMAGE_ANALYSIS_DEGRADED,
            );
            return IMAGE_ANALYSIS_DEGRADED.to_string();
        }

        tracker.add(
            ActivityType::ImageAnalysis,
            ActivityStatus::Complete,
            format!("Analyzed {} of {} image(s)", findings.len(), images.len()),
        );
        findings.join("\n\n")
    }
}

/// Activity feed category for a model call serving `task`.
fn activity_for(task: TaskKind) -> ActivityType {
    match task {
        TaskKind::Planning => ActivityType::Planning,
        TaskKind::Extraction => ActivityType::Extract,
        TaskKind::Analysis => ActivityType::Analyze,
        TaskKind::Report => ActivityType::Generate,
        TaskKind::ImageAnalysis => ActivityType::ImageAnalysis,
    }
}

/// Pulls the JSON payload out of a model response that may be wrapped in
/// markdown fences or prose.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }
    trimmed
}

fn annotations_block(name: &str, annotations: &ImageAnnotations) -> String {
    let mut block = format!("Image: {name}\n");
    if let Some(text) = &annotations.text {
        block.push_str(&format!("Detected text: {text}\n"));
    }
    if !annotations.labels.is_empty() {
        block.push_str(&format!("Labels: {}\n", annotations.labels.join(", ")));
    }
    if !annotations.objects.is_empty() {
        block.push_str(&format!("Objects: {}\n", annotations.objects.join(", ")));
    }
    if !annotations.dominant_colors.is_empty() {
        block.push_str(&format!(
            "Dominant colors: {}\n",
            annotations.dominant_colors.join(", ")
        ));
    }
    if let Some(safe_search) = &annotations.safe_search {
        block.push_str(&format!("Safe search: {safe_search}\n"));
    }
    if annotations.face_count > 0 {
        block.push_str(&format!("Faces detected: {}\n", annotations.face_count));
    }
    block
}

fn image_prompt(topic: &str, blocks: &[String]) -> String {
    format!(
        "The user attached images to a research request about \"{topic}\". \
         Below are machine annotations for each image. Describe what the images \
         show and how they relate to the topic, as concise research findings.\n\n{}",
        blocks.join("\n")
    )
}
