//! Session dependency wiring.

use std::sync::Arc;

use tracing::{info, warn};

use delve_cache::CacheConfig;
use delve_core::{EmbeddingBackend, EmbeddingProvider, ModelProvider, Result, WebSearchProvider};
use delve_inference::{
    GoogleBackend, GoogleVisionClient, ModelRouter, OpenAiCompatBackend, RetryConfig,
};
use delve_rag::{EmbeddingService, MockEmbeddingBackend, RagService};
use delve_store::{connect, PgVectorStore, PoolConfig};

use crate::config::EngineConfig;

/// Everything a research session needs, injected so tests can swap any
/// piece for a mock.
pub struct ResearchDeps {
    pub router: ModelRouter,
    pub search: Arc<dyn WebSearchProvider>,
    pub rag: Option<RagService>,
    pub config: EngineConfig,
}

impl ResearchDeps {
    pub fn new(
        router: ModelRouter,
        search: Arc<dyn WebSearchProvider>,
        rag: Option<RagService>,
        config: EngineConfig,
    ) -> Self {
        Self {
            router,
            search,
            rag,
            config,
        }
    }

    /// Wires dependencies from the environment.
    ///
    /// Chat backends register for every provider with an API key present;
    /// `EXA_API_KEY` is required since web search is not optional. The RAG
    /// stack comes up only when `DATABASE_URL` is set.
    pub async fn from_env(embedding_provider: EmbeddingProvider) -> Result<Self> {
        let config = EngineConfig::from_env();

        let mut router = ModelRouter::new(RetryConfig::from_env());
        match OpenAiCompatBackend::openai_from_env() {
            Ok(backend) => {
                router = router.with_backend(ModelProvider::OpenAi, Arc::new(backend));
            }
            Err(e) => info!(reason = %e, "openai backend not registered"),
        }
        match GoogleBackend::from_env() {
            Ok(backend) => {
                router = router.with_backend(ModelProvider::Google, Arc::new(backend));
            }
            Err(e) => info!(reason = %e, "google backend not registered"),
        }
        match OpenAiCompatBackend::groq_from_env() {
            Ok(backend) => {
                router = router.with_backend(ModelProvider::Groq, Arc::new(backend));
            }
            Err(e) => info!(reason = %e, "groq backend not registered"),
        }
        match GoogleVisionClient::from_env() {
            Ok(vision) => router = router.with_vision(Arc::new(vision)),
            Err(e) => info!(reason = %e, "vision annotator not registered"),
        }

        let search = Arc::new(crate::search::ExaSearchClient::from_env()?);

        let cache = CacheConfig::from_env().build().await;

        let rag = match std::env::var("DATABASE_URL") {
            Ok(url) => {
                let pool = connect(&url, PoolConfig::default()).await?;
                let store = Arc::new(PgVectorStore::new(pool));
                let backend = embedding_backend(embedding_provider);
                let embeddings =
                    EmbeddingService::new(backend, cache.clone(), embedding_provider);
                Some(RagService::new(store, embeddings, cache))
            }
            Err(_) => {
                info!("DATABASE_URL not set, rag disabled");
                None
            }
        };

        Ok(Self {
            router,
            search,
            rag,
            config,
        })
    }
}

fn embedding_backend(provider: EmbeddingProvider) -> Arc<dyn EmbeddingBackend> {
    let backend: Option<Arc<dyn EmbeddingBackend>> = match provider {
        EmbeddingProvider::OpenAi => OpenAiCompatBackend::openai_from_env()
            .ok()
            .map(|b| Arc::new(b) as Arc<dyn EmbeddingBackend>),
        EmbeddingProvider::Google => GoogleBackend::from_env()
            .ok()
            .map(|b| Arc::new(b) as Arc<dyn EmbeddingBackend>),
    };
    backend.unwrap_or_else(|| {
        warn!(%provider, "no embedding credentials, using deterministic mock embeddings");
        Arc::new(MockEmbeddingBackend)
    })
}
