//! Retrieval-augmented generation over the document store.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use delve_cache::generate_key;
use delve_core::defaults::{CACHE_TTL_SECS, MAX_CONTENT_CHARS};
use delve_core::models::estimate_tokens;
use delve_core::{
    ActivityStatus, ActivityTracker, ActivityType, CacheHandle, DocumentStore, Finding,
    RagRetrievalResult, ResearchEvent, Result, StoredDocument,
};

use crate::embedding::EmbeddingService;
use crate::extract_keywords;

/// The retrieval/storage contract the research loop depends on.
///
/// Retrieval is fail-soft: any error path degrades to an empty result with
/// a warning activity, never an aborted session. Storage is best-effort for
/// the same reason.
pub struct RagService {
    store: Arc<dyn DocumentStore>,
    embeddings: EmbeddingService,
    cache: CacheHandle,
}

impl RagService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embeddings: EmbeddingService,
        cache: CacheHandle,
    ) -> Self {
        Self {
            store,
            embeddings,
            cache,
        }
    }

    /// Retrieves up to `limit` documents relevant to `topic`.
    ///
    /// Order of attempts: retrieval cache, similarity search over the topic
    /// embedding, then keyword search when no embedded documents matched.
    pub async fn retrieve(
        &self,
        topic: &str,
        limit: usize,
        tracker: &ActivityTracker,
    ) -> Result<RagRetrievalResult> {
        let key = generate_key("rag-retrieval", &format!("{topic}:{limit}"));

        if let Some(cached) = self.cache.get_json::<RagRetrievalResult>(&key).await? {
            debug!(topic, "rag retrieval cache hit");
            tracker.add(
                ActivityType::RagRetrieval,
                ActivityStatus::Complete,
                format!(
                    "Retrieved {} documents from cache for: {topic}",
                    cached.documents.len()
                ),
            );
            self.forward_documents(&cached, tracker);
            return Ok(cached);
        }

        tracker.add(
            ActivityType::RagRetrieval,
            ActivityStatus::Pending,
            format!("Retrieving knowledge related to: {topic}"),
        );

        let result = match self.retrieve_uncached(topic, limit).await {
            Ok(result) => result,
            Err(e) => {
                warn!(topic, error = %e, "rag retrieval failed");
                tracker.add(
                    ActivityType::RagRetrieval,
                    ActivityStatus::Error,
                    format!("Knowledge retrieval failed, continuing without it: {e}"),
                );
                return Ok(RagRetrievalResult::empty());
            }
        };

        tracker.add(
            ActivityType::RagRetrieval,
            ActivityStatus::Complete,
            format!(
                "Retrieved {} documents (~{} tokens) for: {topic}",
                result.documents.len(),
                result.total_tokens
            ),
        );
        self.forward_documents(&result, tracker);

        if let Err(e) = self.cache.set_json(&key, &result, CACHE_TTL_SECS).await {
            warn!(error = %e, "failed to cache rag retrieval");
        }
        Ok(result)
    }

    async fn retrieve_uncached(&self, topic: &str, limit: usize) -> Result<RagRetrievalResult> {
        let embedding = self.embeddings.embed(topic).await?;
        let mut documents = self
            .store
            .similarity_search(&embedding, limit as i64)
            .await?;

        if documents.is_empty() {
            let keywords = extract_keywords(topic);
            debug!(topic, ?keywords, "falling back to keyword search");
            documents = self.store.keyword_search(&keywords, limit as i64).await?;
        }

        let total_tokens = documents
            .iter()
            .map(|d| estimate_tokens(&d.content))
            .sum();

        Ok(RagRetrievalResult {
            documents,
            total_tokens,
        })
    }

    fn forward_documents(&self, result: &RagRetrievalResult, tracker: &ActivityTracker) {
        if !result.documents.is_empty() {
            tracker.emit(ResearchEvent::RagDocuments {
                documents: result.documents.clone(),
            });
        }
    }

    /// Stores each session finding as its own document for future
    /// retrievals. Per-document failures are reported as warning
    /// activities; the method never raises.
    pub async fn store_research(&self, topic: &str, findings: &[Finding], tracker: &ActivityTracker) {
        tracker.add(
            ActivityType::RagStorage,
            ActivityStatus::Pending,
            format!("Storing {} finding(s) for: {topic}", findings.len()),
        );

        let mut stored = 0usize;
        for finding in findings {
            match self.store_finding(topic, finding).await {
                Ok(id) => {
                    debug!(topic, id, source = %finding.source, "finding stored");
                    stored += 1;
                }
                Err(e) => {
                    warn!(topic, source = %finding.source, error = %e, "failed to store finding");
                    tracker.add(
                        ActivityType::RagStorage,
                        ActivityStatus::Warning,
                        format!("Could not store finding from {}: {e}", finding.source),
                    );
                }
            }
        }

        tracker.add(
            ActivityType::RagStorage,
            ActivityStatus::Complete,
            format!(
                "Stored {stored} of {} finding(s) for: {topic}",
                findings.len()
            ),
        );
    }

    async fn store_finding(&self, topic: &str, finding: &Finding) -> Result<String> {
        let content: String = finding.summary.chars().take(MAX_CONTENT_CHARS).collect();
        let embedding = self.embeddings.embed(&content).await?;
        let document = StoredDocument {
            id: format!("research-{}", Uuid::new_v4()),
            content,
            metadata: serde_json::json!({
                "source": finding.source,
                "topic": topic,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
            embedding,
        };
        let mut ids = self.store.upsert(vec![document]).await?;
        ids.pop()
            .ok_or_else(|| delve_core::Error::Internal("upsert returned no ids".into()))
    }
}
