//! Shared data model for the Delve research engine.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::Error;

// ============================================================================
// Provider and task routing
// ============================================================================

/// Text-generation provider families a session can route through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    Google,
    #[serde(rename = "openai")]
    OpenAi,
    Groq,
    /// Mixed routing: planning and report on Google, extraction and
    /// analysis on OpenAI.
    Hybrid,
}

impl FromStr for ModelProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(ModelProvider::Google),
            "openai" => Ok(ModelProvider::OpenAi),
            "groq" => Ok(ModelProvider::Groq),
            "hybrid" => Ok(ModelProvider::Hybrid),
            other => Err(Error::Config(format!("unknown model provider: {other}"))),
        }
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelProvider::Google => "google",
            ModelProvider::OpenAi => "openai",
            ModelProvider::Groq => "groq",
            ModelProvider::Hybrid => "hybrid",
        };
        write!(f, "{s}")
    }
}

/// Embedding provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Google,
}

impl FromStr for EmbeddingProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(EmbeddingProvider::OpenAi),
            "google" => Ok(EmbeddingProvider::Google),
            other => Err(Error::Config(format!(
                "unknown embedding provider: {other}"
            ))),
        }
    }
}

impl fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EmbeddingProvider::OpenAi => "openai",
            EmbeddingProvider::Google => "google",
        };
        write!(f, "{s}")
    }
}

/// The pipeline stage a model call serves. Drives per-provider model
/// selection and hybrid routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Planning,
    Extraction,
    Analysis,
    Report,
    ImageAnalysis,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Planning => "planning",
            TaskKind::Extraction => "extraction",
            TaskKind::Analysis => "analysis",
            TaskKind::Report => "report",
            TaskKind::ImageAnalysis => "image_analysis",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Session state
// ============================================================================

/// A single unit of extracted knowledge with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Extracted learnings, typically one bullet-style insight per line.
    pub summary: String,
    /// URL (or synthetic source label) the summary was derived from.
    pub source: String,
}

/// Optional diagram/chart generation request attached to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationKind {
    Mermaid,
    #[serde(rename = "chartjs")]
    ChartJs,
    D3,
    All,
}

impl fmt::Display for VisualizationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VisualizationKind::Mermaid => "mermaid",
            VisualizationKind::ChartJs => "chartjs",
            VisualizationKind::D3 => "d3",
            VisualizationKind::All => "all",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualizationOptions {
    pub enabled: bool,
    pub kind: VisualizationKind,
}

/// An image attached to the research request, base64-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub base64: String,
    pub name: String,
    pub mime_type: String,
}

/// Mutable state of one research session.
///
/// Findings and processed URLs are owned by the controller and only mutated
/// between pipeline stages. The token and step counters are atomic so the
/// state can be shared by reference across concurrent extraction futures.
#[derive(Debug)]
pub struct ResearchState {
    pub topic: String,
    pub clarifications: Vec<String>,
    pub provider: ModelProvider,
    pub embedding_provider: EmbeddingProvider,
    pub use_rag: bool,
    pub images: Vec<ImageData>,
    pub visualization: Option<VisualizationOptions>,
    pub findings: Vec<Finding>,
    pub processed_urls: HashSet<String>,
    token_used: AtomicU64,
    completed_steps: AtomicU64,
}

impl ResearchState {
    pub fn new(topic: impl Into<String>, provider: ModelProvider) -> Self {
        Self {
            topic: topic.into(),
            clarifications: Vec::new(),
            provider,
            embedding_provider: EmbeddingProvider::OpenAi,
            use_rag: false,
            images: Vec::new(),
            visualization: None,
            findings: Vec::new(),
            processed_urls: HashSet::new(),
            token_used: AtomicU64::new(0),
            completed_steps: AtomicU64::new(0),
        }
    }

    pub fn with_clarifications(mut self, clarifications: Vec<String>) -> Self {
        self.clarifications = clarifications;
        self
    }

    /// Appends findings, newest last.
    pub fn add_findings(&mut self, findings: impl IntoIterator<Item = Finding>) {
        self.findings.extend(findings);
    }

    /// Adds tokens consumed by a model call to the running total.
    pub fn record_usage(&self, tokens: u64) {
        self.token_used.fetch_add(tokens, Ordering::Relaxed);
    }

    /// Marks one pipeline step complete.
    pub fn mark_step(&self) {
        self.completed_steps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn token_used(&self) -> u64 {
        self.token_used.load(Ordering::Relaxed)
    }

    pub fn completed_steps(&self) -> u64 {
        self.completed_steps.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Search and retrieval
// ============================================================================

/// One web search hit after filtering and truncation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// A document returned from the knowledge store, annotated with similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagDocument {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Cosine similarity in `[0, 1]`; keyword-fallback hits carry a fixed
    /// nominal value.
    pub similarity: f64,
}

/// The result of one RAG retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagRetrievalResult {
    pub documents: Vec<RagDocument>,
    /// Rough token estimate across all returned documents
    /// (`ceil(chars / 4)`).
    pub total_tokens: u64,
}

impl RagRetrievalResult {
    pub fn empty() -> Self {
        Self {
            documents: Vec::new(),
            total_tokens: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// A document headed into the knowledge store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub embedding: Vec<f32>,
}

/// Estimates token count as `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_provider_round_trip() {
        for (s, p) in [
            ("google", ModelProvider::Google),
            ("openai", ModelProvider::OpenAi),
            ("groq", ModelProvider::Groq),
            ("hybrid", ModelProvider::Hybrid),
        ] {
            assert_eq!(s.parse::<ModelProvider>().unwrap(), p);
            assert_eq!(p.to_string(), s);
        }
    }

    #[test]
    fn test_model_provider_case_insensitive() {
        assert_eq!(
            "Google".parse::<ModelProvider>().unwrap(),
            ModelProvider::Google
        );
        assert_eq!(
            "OPENAI".parse::<ModelProvider>().unwrap(),
            ModelProvider::OpenAi
        );
    }

    #[test]
    fn test_model_provider_unknown() {
        let err = "anthropic".parse::<ModelProvider>().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_embedding_provider_parse() {
        assert_eq!(
            "openai".parse::<EmbeddingProvider>().unwrap(),
            EmbeddingProvider::OpenAi
        );
        assert!("cohere".parse::<EmbeddingProvider>().is_err());
    }

    #[test]
    fn test_research_state_counters() {
        let state = ResearchState::new("rust async runtimes", ModelProvider::Google);
        assert_eq!(state.token_used(), 0);
        assert_eq!(state.completed_steps(), 0);

        state.record_usage(120);
        state.record_usage(30);
        state.mark_step();

        assert_eq!(state.token_used(), 150);
        assert_eq!(state.completed_steps(), 1);
    }

    #[test]
    fn test_research_state_counters_shared() {
        use std::sync::Arc;

        let state = Arc::new(ResearchState::new("topic", ModelProvider::OpenAi));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        state.record_usage(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(state.token_used(), 400);
    }

    #[test]
    fn test_add_findings() {
        let mut state = ResearchState::new("topic", ModelProvider::Google);
        state.add_findings(vec![Finding {
            summary: "insight".into(),
            source: "https://example.com".into(),
        }]);
        assert_eq!(state.findings.len(), 1);
        assert_eq!(state.findings[0].source, "https://example.com");
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(10_000)), 2500);
    }

    #[test]
    fn test_rag_document_serde() {
        let doc = RagDocument {
            id: "doc-1".into(),
            content: "body".into(),
            metadata: serde_json::json!({"topic": "rust"}),
            similarity: 0.87,
        };
        let json = serde_json::to_string(&doc).unwrap();
        let back: RagDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_visualization_kind_serde() {
        let json = serde_json::to_string(&VisualizationKind::ChartJs).unwrap();
        assert_eq!(json, "\"chartjs\"");
    }
}
