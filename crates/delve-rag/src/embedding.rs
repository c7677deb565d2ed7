//! Cached, fault-tolerant embedding generation.

use std::sync::Arc;

use tracing::{debug, warn};

use delve_cache::content_hash;
use delve_core::defaults::{CACHE_TTL_SECS, VECTOR_DIMENSION};
use delve_core::{CacheHandle, EmbeddingBackend, EmbeddingProvider, Result};

/// Embedding front-end used by retrieval and storage.
///
/// Every vector leaving this service has exactly [`VECTOR_DIMENSION`]
/// components. Backend failures degrade to a deterministic content-derived
/// mock vector so retrieval keeps working offline, at the cost of
/// similarity quality.
pub struct EmbeddingService {
    backend: Arc<dyn EmbeddingBackend>,
    cache: CacheHandle,
    provider: EmbeddingProvider,
}

impl EmbeddingService {
    pub fn new(
        backend: Arc<dyn EmbeddingBackend>,
        cache: CacheHandle,
        provider: EmbeddingProvider,
    ) -> Self {
        Self {
            backend,
            cache,
            provider,
        }
    }

    pub fn provider(&self) -> EmbeddingProvider {
        self.provider
    }

    /// Embeds `text`, consulting the cache first. Cache writes are
    /// best-effort.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = format!("embedding:{}:{}", self.provider, content_hash(text));

        if let Some(cached) = self.cache.get_json::<Vec<f32>>(&key).await? {
            debug!(provider = %self.provider, "embedding cache hit");
            return Ok(normalize_dimensions(cached));
        }

        let vector = match self.backend.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    provider = %self.provider,
                    model = self.backend.model_name(),
                    error = %e,
                    "embedding backend failed, using mock embedding"
                );
                mock_embedding(text)
            }
        };
        let vector = normalize_dimensions(vector);

        if let Err(e) = self.cache.set_json(&key, &vector, CACHE_TTL_SECS).await {
            warn!(error = %e, "failed to cache embedding");
        }
        Ok(vector)
    }
}

/// Pads with zeros or truncates to exactly [`VECTOR_DIMENSION`] components.
pub fn normalize_dimensions(mut vector: Vec<f32>) -> Vec<f32> {
    vector.resize(VECTOR_DIMENSION, 0.0);
    vector
}

/// Backend that always produces the deterministic mock embedding. Used
/// when no embedding provider is configured at all.
pub struct MockEmbeddingBackend;

#[async_trait::async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(mock_embedding(text))
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }
}

/// Deterministic content-derived embedding used when no provider is
/// reachable. Identical text always maps to the identical vector, so
/// same-session similarity comparisons remain meaningful.
pub fn mock_embedding(text: &str) -> Vec<f32> {
    let bytes = text.as_bytes();
    let len = bytes.len();
    (0..VECTOR_DIMENSION)
        .map(|i| {
            if len == 0 {
                return 0.0;
            }
            let byte = bytes[i % len] as f32;
            ((len + i) as f32).sin() * 0.5 + (byte * 0.01).cos() * 0.5
        })
        .collect()
}
