//! Cross-crate trait seams.
//!
//! Concrete implementations live in the provider crates (`delve-inference`,
//! `delve-store`, `delve-cache`); the engine only depends on these traits so
//! tests can inject mocks.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::models::{ImageData, RagDocument, SearchResult, StoredDocument};

// ============================================================================
// Text generation
// ============================================================================

/// A single text completion with usage accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Total tokens billed for the call (prompt + completion), when the
    /// provider reports them.
    pub total_tokens: u64,
}

/// A provider endpoint that turns prompts into completions.
///
/// `json_output` asks the provider for a JSON-only response (OpenAI
/// `response_format`, Gemini `responseMimeType`); callers still validate the
/// body against their schema.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        system: Option<&str>,
        prompt: &str,
        json_output: bool,
    ) -> Result<Completion>;
}

// ============================================================================
// Embeddings
// ============================================================================

/// A provider endpoint that embeds text into a fixed-dimension vector.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Model identifier, used in cache keys.
    fn model_name(&self) -> &str;
}

// ============================================================================
// Vision
// ============================================================================

/// Raw annotation output for one image, already flattened to text blocks
/// suitable for prompting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageAnnotations {
    pub text: Option<String>,
    pub labels: Vec<String>,
    pub objects: Vec<String>,
    pub dominant_colors: Vec<String>,
    pub safe_search: Option<String>,
    pub face_count: usize,
}

#[async_trait]
pub trait VisionAnnotator: Send + Sync {
    async fn annotate(&self, image: &ImageData) -> Result<ImageAnnotations>;
}

// ============================================================================
// Web search
// ============================================================================

#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

// ============================================================================
// Document store
// ============================================================================

/// Persistence seam for the knowledge store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts documents, replacing any existing rows with the same id.
    /// Returns the ids written, in input order.
    async fn upsert(&self, documents: Vec<StoredDocument>) -> Result<Vec<String>>;

    /// Cosine-similarity search over embedded documents, best first.
    async fn similarity_search(&self, embedding: &[f32], limit: i64) -> Result<Vec<RagDocument>>;

    /// Case-insensitive substring search over content and metadata, used
    /// when no embeddings exist.
    async fn keyword_search(&self, keywords: &[String], limit: i64) -> Result<Vec<RagDocument>>;

    async fn get_by_id(&self, id: &str) -> Result<Option<RagDocument>>;

    async fn delete_by_id(&self, id: &str) -> Result<bool>;
}

// ============================================================================
// Cache
// ============================================================================

/// String-valued key/value cache with per-entry TTL.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Removes entries whose key matches `pattern` (`*` wildcards), or
    /// every entry when no pattern is given.
    async fn clear(&self, pattern: Option<&str>) -> Result<()>;
}

/// Typed convenience layer over a [`Cache`].
pub struct CacheHandle {
    inner: std::sync::Arc<dyn Cache>,
}

impl CacheHandle {
    pub fn new(inner: std::sync::Arc<dyn Cache>) -> Self {
        Self { inner }
    }

    /// Fetches and deserializes a cached value. Undecodable entries are
    /// treated as misses.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.inner.get(key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw).ok()),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.inner.set(key, &raw, ttl_secs).await
    }

    pub async fn clear(&self, pattern: Option<&str>) -> Result<()> {
        self.inner.clear(pattern).await
    }
}

impl Clone for CacheHandle {
    fn clone(&self) -> Self {
        Self {
            inner: std::sync::Arc::clone(&self.inner),
        }
    }
}
