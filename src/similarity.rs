//! Semantic similarity index boundary.
//!
//! The aggregator matches course tasks only through this trait. The bundled
//! adapter stores vectors in the `task_vectors` table and ranks by cosine
//! similarity; swapping in an external vector service is an adapter concern,
//! not an aggregator change.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingClient};

/// At most this many hits per search.
pub const TOP_K: usize = 3;

#[derive(Debug, Clone)]
pub struct SimilarityHit {
    pub key: String,
    pub score: f32,
    pub payload: Value,
}

#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Hits with score ≥ `threshold`, descending, at most [`TOP_K`].
    async fn search(&self, query: &str, threshold: f32) -> Result<Vec<SimilarityHit>>;

    /// Idempotent replace by key.
    async fn upsert(&self, key: &str, text: &str, payload: Value) -> Result<()>;

    /// Drop all stored vectors (full-reset maintenance path).
    async fn reset(&self) -> Result<()>;
}

/// SQLite-backed index using a remote embedding backend.
///
/// Without an embedding client (provider `disabled`) searches return no hits
/// and upserts fail softly — the pipeline then runs in heuristic/no-match
/// mode instead of erroring.
pub struct LocalVectorIndex {
    pool: SqlitePool,
    embeddings: Option<EmbeddingClient>,
}

impl LocalVectorIndex {
    pub fn new(pool: SqlitePool, embeddings: Option<EmbeddingClient>) -> Self {
        Self { pool, embeddings }
    }
}

#[async_trait]
impl SimilarityIndex for LocalVectorIndex {
    async fn search(&self, query: &str, threshold: f32) -> Result<Vec<SimilarityHit>> {
        let Some(embeddings) = &self.embeddings else {
            debug!("embedding provider disabled, similarity search returns no hits");
            return Ok(Vec::new());
        };

        let query_vector = match embeddings.embed_query(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed, treating as no match");
                return Ok(Vec::new());
            }
        };

        let rows = sqlx::query("SELECT key, embedding, payload_json FROM task_vectors")
            .fetch_all(&self.pool)
            .await?;

        let mut hits: Vec<SimilarityHit> = Vec::new();
        for row in rows {
            let blob: Vec<u8> = row.get("embedding");
            let score = cosine_similarity(&query_vector, &blob_to_vec(&blob));
            if score >= threshold {
                let payload_json: String = row.get("payload_json");
                hits.push(SimilarityHit {
                    key: row.get("key"),
                    score,
                    payload: serde_json::from_str(&payload_json).unwrap_or(Value::Null),
                });
            }
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(TOP_K);
        Ok(hits)
    }

    async fn upsert(&self, key: &str, text: &str, payload: Value) -> Result<()> {
        let Some(embeddings) = &self.embeddings else {
            anyhow::bail!("embedding provider disabled, cannot store vector");
        };

        let vector = embeddings.embed_query(text).await?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO task_vectors (key, embedding, payload_json, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                embedding = excluded.embedding,
                payload_json = excluded.payload_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(vec_to_blob(&vector))
        .bind(payload.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        sqlx::query("DELETE FROM task_vectors")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
