//! Similarity search over embedded knowledge items.
//!
//! `LibSqlKnowledgeStore` keeps payloads and embeddings in the
//! `knowledge_items` table and ranks by brute-force cosine similarity.
//! Each row records the id of the embedder that produced its vector.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::params;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DatabaseError, KnowledgeError};
use crate::knowledge::embedding::{Embedder, cosine_similarity};
use crate::knowledge::model::{KnowledgeItem, KnowledgeKind, ScoredItem};
use crate::store::SharedConnection;

/// Read/write access to the knowledge index.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Top `k` items by cosine similarity to `query`, best first.
    ///
    /// An empty store yields an empty list. `kind` restricts the candidates
    /// before ranking. Vectors written by a different embedder are an error,
    /// not a zero score.
    async fn search(
        &self,
        query: &str,
        k: usize,
        kind: Option<KnowledgeKind>,
    ) -> Result<Vec<ScoredItem>, KnowledgeError>;

    /// Embed and store an item.
    async fn insert(&self, item: &KnowledgeItem) -> Result<Uuid, KnowledgeError>;

    async fn count(&self) -> Result<usize, KnowledgeError>;
}

struct Candidate {
    item: KnowledgeItem,
    vector: Vec<f32>,
    embedder: String,
}

pub struct LibSqlKnowledgeStore {
    conn: SharedConnection,
    embedder: Arc<dyn Embedder>,
}

impl LibSqlKnowledgeStore {
    /// Wrap a migrated connection (see [`crate::store::LibSqlBackend::connection`]).
    pub fn new(conn: SharedConnection, embedder: Arc<dyn Embedder>) -> Self {
        Self { conn, embedder }
    }

    /// Store an item with a precomputed embedding.
    ///
    /// The vector is recorded as coming from this store's embedder.
    pub async fn insert_with_embedding(
        &self,
        item: &KnowledgeItem,
        embedding: &[f32],
    ) -> Result<Uuid, KnowledgeError> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_string(item)
            .map_err(|e| KnowledgeError::InvalidRecord(format!("encode payload: {e}")))?;
        let embedding_json = serde_json::to_string(embedding)
            .map_err(|e| KnowledgeError::InvalidRecord(format!("encode embedding: {e}")))?;

        let _write = self.conn.lock_writes().await;
        self.conn
            .conn()
            .execute(
                "INSERT INTO knowledge_items
                    (id, kind, payload, embedding, source_url, created_at, embedder, dimensions)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id.to_string(),
                    item.kind().as_str(),
                    payload,
                    embedding_json,
                    item.source_url(),
                    Utc::now().to_rfc3339(),
                    self.embedder.id(),
                    embedding.len() as i64
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert knowledge item: {e}")))?;

        debug!(%id, kind = %item.kind(), "Knowledge item stored");
        Ok(id)
    }

    async fn load_candidates(
        &self,
        kind: Option<KnowledgeKind>,
    ) -> Result<Vec<Candidate>, KnowledgeError> {
        let conn = self.conn.conn();
        let mut rows = match kind {
            Some(kind) => {
                conn.query(
                    "SELECT payload, embedding, embedder FROM knowledge_items WHERE kind = ?1",
                    params![kind.as_str()],
                )
                .await
            }
            None => {
                conn.query("SELECT payload, embedding, embedder FROM knowledge_items", ())
                    .await
            }
        }
        .map_err(|e| DatabaseError::Query(format!("load knowledge items: {e}")))?;

        let mut candidates = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("iterate knowledge items: {e}")))?
        {
            let payload: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("read payload: {e}")))?;
            let embedding: String = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("read embedding: {e}")))?;
            let embedder: String = row
                .get(2)
                .map_err(|e| DatabaseError::Query(format!("read embedder: {e}")))?;

            let item: KnowledgeItem = serde_json::from_str(&payload)
                .map_err(|e| KnowledgeError::InvalidRecord(format!("decode payload: {e}")))?;
            let vector: Vec<f32> = serde_json::from_str(&embedding)
                .map_err(|e| KnowledgeError::InvalidRecord(format!("decode embedding: {e}")))?;
            candidates.push(Candidate {
                item,
                vector,
                embedder,
            });
        }
        Ok(candidates)
    }
}

#[async_trait]
impl KnowledgeStore for LibSqlKnowledgeStore {
    async fn search(
        &self,
        query: &str,
        k: usize,
        kind: Option<KnowledgeKind>,
    ) -> Result<Vec<ScoredItem>, KnowledgeError> {
        let candidates = self.load_candidates(kind).await?;
        if candidates.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let active = self.embedder.id();
        if let Some(stale) = candidates.iter().find(|c| c.embedder != active) {
            warn!(stored = %stale.embedder, active = %active, "Knowledge embedder mismatch");
            return Err(KnowledgeError::EmbedderMismatch {
                stored: stale.embedder.clone(),
                active,
            });
        }

        let query_vector = self.embedder.embed(query).await?;
        if let Some(stale) = candidates
            .iter()
            .find(|c| c.vector.len() != query_vector.len())
        {
            return Err(KnowledgeError::EmbedderMismatch {
                stored: format!("{} ({} dims)", stale.embedder, stale.vector.len()),
                active: format!("{active} ({} dims)", query_vector.len()),
            });
        }

        let mut scored: Vec<ScoredItem> = candidates
            .into_iter()
            .map(|c| ScoredItem {
                score: cosine_similarity(&query_vector, &c.vector),
                item: c.item,
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        debug!(
            k,
            kind = kind.map(|kind| kind.as_str()).unwrap_or("any"),
            hits = scored.len(),
            "Knowledge search"
        );
        Ok(scored)
    }

    async fn insert(&self, item: &KnowledgeItem) -> Result<Uuid, KnowledgeError> {
        let embedding = self.embedder.embed(&item.embedding_text()).await?;
        self.insert_with_embedding(item, &embedding).await
    }

    async fn count(&self) -> Result<usize, KnowledgeError> {
        let mut rows = self
            .conn
            .conn()
            .query("SELECT COUNT(*) FROM knowledge_items", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count knowledge items: {e}")))?;

        let count: i64 = match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("count knowledge items: {e}")))?
        {
            Some(row) => row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("read count: {e}")))?,
            None => 0,
        };
        Ok(count.max(0) as usize)
    }
}
