//! SQLite-backed vector store.
//!
//! Chunks, their metadata and embeddings live in one `rag_chunks` table;
//! search is brute-force cosine similarity over every stored vector.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::store::{chunk_id, VectorStore};
use crate::core::database;
use crate::core::errors::ServiceError;
use crate::llm::Embedder;
use crate::pipeline::types::{Chunk, PageMetadata, RankedChunk};
use crate::vector_math::cosine_similarity;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub struct SqliteVectorStore {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
}

impl SqliteVectorStore {
    pub async fn open(db_path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, ServiceError> {
        let pool = database::connect(db_path, 4).await?;
        Self::with_pool(pool, embedder).await
    }

    pub async fn with_pool(
        pool: SqlitePool,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, ServiceError> {
        let store = Self { pool, embedder };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ServiceError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rag_chunks (
                chunk_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                title TEXT NOT NULL DEFAULT '',
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rag_created ON rag_chunks(created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    async fn exists(&self, id: &str) -> Result<bool, ServiceError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM rag_chunks WHERE chunk_id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, chunks: &[Chunk]) -> Result<usize, ServiceError> {
        // Only embed what is not stored yet, and each distinct chunk once.
        let mut seen = HashSet::new();
        let mut fresh: Vec<(String, &Chunk)> = Vec::new();
        for chunk in chunks {
            let id = chunk_id(chunk);
            if !seen.insert(id.clone()) || self.exists(&id).await? {
                continue;
            }
            fresh.push((id, chunk));
        }

        if fresh.is_empty() {
            debug!("All {} chunks already indexed", chunks.len());
            return Ok(0);
        }

        let texts: Vec<String> = fresh.iter().map(|(_, c)| c.content.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != fresh.len() {
            return Err(ServiceError::Model(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                fresh.len()
            )));
        }

        let now = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;

        for ((id, chunk), embedding) in fresh.iter().zip(embeddings.iter()) {
            let blob = Self::serialize_embedding(embedding);
            let result = sqlx::query(
                "INSERT OR IGNORE INTO rag_chunks (chunk_id, content, source, title, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(id)
            .bind(&chunk.content)
            .bind(&chunk.metadata.source)
            .bind(&chunk.metadata.title)
            .bind(&blob)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<RankedChunk>, ServiceError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Model("embedder returned no vector".to_string()))?;

        let rows = sqlx::query(
            "SELECT content, source, title, embedding FROM rag_chunks ORDER BY created_at, rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<RankedChunk> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Option<Vec<u8>> = row.get("embedding");
                let embedding_bytes = embedding_bytes.filter(|b| !b.is_empty())?;
                let stored = Self::deserialize_embedding(&embedding_bytes);
                let score = cosine_similarity(&query_embedding, &stored);

                Some(RankedChunk {
                    chunk: Chunk {
                        content: row.get("content"),
                        metadata: PageMetadata {
                            source: row.get("source"),
                            title: row.get("title"),
                        },
                    },
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn count(&self) -> Result<usize, ServiceError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rag_chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, ServiceError> {
        let result = sqlx::query("DELETE FROM rag_chunks WHERE created_at < ?1")
            .bind(cutoff.format(TIMESTAMP_FORMAT).to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}
