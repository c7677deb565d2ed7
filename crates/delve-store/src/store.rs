//! pgvector-backed document store.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{PgPool, Row};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use delve_core::defaults::{IVFFLAT_LISTS, VECTOR_DIMENSION};
use delve_core::{DocumentStore, Error, RagDocument, Result, StoredDocument};

use crate::escape_like;

/// Knowledge store over a `documents` table with a 1536-dimension embedding
/// column and an ivfflat cosine index.
///
/// Schema setup is lazy and idempotent: the first operation on a store
/// creates the extension, table, and index if they are missing. Concurrent
/// first calls race only inside `CREATE ... IF NOT EXISTS`, which PostgreSQL
/// serializes.
pub struct PgVectorStore {
    pool: PgPool,
    schema_ready: OnceCell<()>,
}

impl PgVectorStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: OnceCell::new(),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
                    .execute(&self.pool)
                    .await?;

                let create_table = format!(
                    "CREATE TABLE IF NOT EXISTS documents (
                        id TEXT PRIMARY KEY,
                        content TEXT NOT NULL,
                        metadata JSONB NOT NULL DEFAULT '{{}}',
                        embedding VECTOR({VECTOR_DIMENSION}),
                        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
                    )"
                );
                sqlx::query(&create_table).execute(&self.pool).await?;

                let create_index = format!(
                    "CREATE INDEX IF NOT EXISTS documents_embedding_idx
                     ON documents USING ivfflat (embedding vector_cosine_ops)
                     WITH (lists = {IVFFLAT_LISTS})"
                );
                sqlx::query(&create_index).execute(&self.pool).await?;

                info!("document store schema ready");
                Ok::<(), Error>(())
            })
            .await?;
        Ok(())
    }

    /// Number of rows that actually carry an embedding.
    async fn embedded_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM documents WHERE embedding IS NOT NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

fn row_to_document(row: &sqlx::postgres::PgRow, similarity: f64) -> RagDocument {
    RagDocument {
        id: row.get("id"),
        content: row.get("content"),
        metadata: row.get("metadata"),
        similarity,
    }
}

#[async_trait]
impl DocumentStore for PgVectorStore {
    async fn upsert(&self, documents: Vec<StoredDocument>) -> Result<Vec<String>> {
        self.ensure_schema().await?;

        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(documents.len());
        for doc in documents {
            sqlx::query(
                "INSERT INTO documents (id, content, metadata, embedding)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (id) DO UPDATE
                 SET content = EXCLUDED.content,
                     metadata = EXCLUDED.metadata,
                     embedding = EXCLUDED.embedding,
                     created_at = now()",
            )
            .bind(&doc.id)
            .bind(&doc.content)
            .bind(&doc.metadata)
            .bind(Vector::from(doc.embedding))
            .execute(&mut *tx)
            .await?;
            ids.push(doc.id);
        }
        tx.commit().await?;

        debug!(count = ids.len(), "documents upserted");
        Ok(ids)
    }

    async fn similarity_search(&self, embedding: &[f32], limit: i64) -> Result<Vec<RagDocument>> {
        self.ensure_schema().await?;

        if self.embedded_count().await? == 0 {
            debug!("no embedded documents, similarity search skipped");
            return Ok(Vec::new());
        }

        // Over-fetch so post-filtering by the caller still fills `limit`.
        let candidates = (limit * 2).max(10);
        let query_vec = Vector::from(embedding.to_vec());

        let rows = sqlx::query(
            "SELECT id, content, metadata,
                    1.0 - (embedding <=> $1::vector) AS similarity
             FROM documents
             WHERE embedding IS NOT NULL
             ORDER BY embedding <=> $1::vector
             LIMIT $2",
        )
        .bind(&query_vec)
        .bind(candidates)
        .fetch_all(&self.pool)
        .await?;

        let documents = rows
            .iter()
            .take(limit as usize)
            .map(|row| {
                let similarity: f64 = row.get("similarity");
                row_to_document(row, similarity)
            })
            .collect();

        Ok(documents)
    }

    async fn keyword_search(&self, keywords: &[String], limit: i64) -> Result<Vec<RagDocument>> {
        self.ensure_schema().await?;

        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let patterns: Vec<String> = keywords
            .iter()
            .map(|k| format!("%{}%", escape_like(k)))
            .collect();

        let rows = sqlx::query(
            "SELECT id, content, metadata
             FROM documents
             WHERE content ILIKE ANY($1) OR metadata::text ILIKE ANY($1)
             ORDER BY created_at DESC
             LIMIT $2",
        )
        .bind(&patterns)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        // Keyword matches carry no vector distance; a fixed nominal
        // similarity keeps the result shape uniform.
        let documents = rows
            .iter()
            .map(|row| row_to_document(row, delve_core::defaults::FALLBACK_SIMILARITY))
            .collect();

        Ok(documents)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<RagDocument>> {
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT id, content, metadata FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row_to_document(&row, 1.0)))
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool> {
        self.ensure_schema().await?;

        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// Integration tests require a PostgreSQL instance with pgvector. Run with:
//   DATABASE_URL=postgres://... cargo test -p delve-store -- --ignored
#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{connect, PoolConfig};

    async fn test_store() -> PgVectorStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = connect(&url, PoolConfig::default()).await.unwrap();
        PgVectorStore::new(pool)
    }

    fn doc(id: &str, content: &str, seed: f32) -> StoredDocument {
        StoredDocument {
            id: id.to_string(),
            content: content.to_string(),
            metadata: serde_json::json!({"test": true}),
            embedding: (0..VECTOR_DIMENSION)
                .map(|i| ((i as f32) * seed).sin())
                .collect(),
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_upsert_and_get() {
        let store = test_store().await;
        let ids = store
            .upsert(vec![doc("it-upsert-1", "rust ownership rules", 0.01)])
            .await
            .unwrap();
        assert_eq!(ids, vec!["it-upsert-1"]);

        let fetched = store.get_by_id("it-upsert-1").await.unwrap().unwrap();
        assert_eq!(fetched.content, "rust ownership rules");

        store.delete_by_id("it-upsert-1").await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_upsert_replaces_on_conflict() {
        let store = test_store().await;
        store
            .upsert(vec![doc("it-conflict-1", "old content", 0.01)])
            .await
            .unwrap();
        store
            .upsert(vec![doc("it-conflict-1", "new content", 0.02)])
            .await
            .unwrap();

        let fetched = store.get_by_id("it-conflict-1").await.unwrap().unwrap();
        assert_eq!(fetched.content, "new content");

        store.delete_by_id("it-conflict-1").await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_similarity_search_orders_by_distance() {
        let store = test_store().await;
        store
            .upsert(vec![
                doc("it-sim-1", "tokio runtime internals", 0.01),
                doc("it-sim-2", "gardening tips", 0.5),
            ])
            .await
            .unwrap();

        let query: Vec<f32> = (0..VECTOR_DIMENSION)
            .map(|i| ((i as f32) * 0.01).sin())
            .collect();
        let results = store.similarity_search(&query, 2).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].id, "it-sim-1");
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }

        store.delete_by_id("it-sim-1").await.unwrap();
        store.delete_by_id("it-sim-2").await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_keyword_search() {
        let store = test_store().await;
        store
            .upsert(vec![doc("it-kw-1", "async runtimes compared", 0.01)])
            .await
            .unwrap();

        let results = store
            .keyword_search(&["runtimes".to_string()], 5)
            .await
            .unwrap();
        assert!(results.iter().any(|d| d.id == "it-kw-1"));
        assert!(results
            .iter()
            .all(|d| d.similarity == delve_core::defaults::FALLBACK_SIMILARITY));

        store.delete_by_id("it-kw-1").await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_keyword_search_matches_metadata() {
        let store = test_store().await;
        let mut document = doc("it-kw-meta-1", "unrelated body text", 0.01);
        document.metadata = serde_json::json!({"topic": "observability pipelines"});
        store.upsert(vec![document]).await.unwrap();

        let results = store
            .keyword_search(&["observability".to_string()], 5)
            .await
            .unwrap();
        assert!(results.iter().any(|d| d.id == "it-kw-meta-1"));

        store.delete_by_id("it-kw-meta-1").await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_delete_missing_returns_false() {
        let store = test_store().await;
        assert!(!store.delete_by_id("it-does-not-exist").await.unwrap());
    }
}
