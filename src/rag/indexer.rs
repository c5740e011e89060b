use std::sync::Arc;

use tracing::{info, warn};

use super::store::VectorStore;
use crate::core::errors::ServiceError;
use crate::pipeline::types::Chunk;

/// Writes scraped chunks into the persistent index.
#[derive(Clone)]
pub struct Indexer {
    store: Arc<dyn VectorStore>,
}

impl Indexer {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// Returns the number of newly stored chunks once they are committed.
    pub async fn index(&self, chunks: &[Chunk]) -> Result<usize, ServiceError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let stored = self.store.upsert(chunks).await?;
        info!(
            "Indexed {} new chunks ({} duplicates skipped)",
            stored,
            chunks.len().saturating_sub(stored)
        );
        Ok(stored)
    }
}

/// Pulls candidate chunks for a query from the whole index.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    limit: usize,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    /// Best `limit` chunks by store similarity. Any store failure yields no chunks.
    pub async fn retrieve(&self, query: &str) -> Vec<Chunk> {
        match self.store.query(query, self.limit).await {
            Ok(ranked) => ranked.into_iter().map(|r| r.chunk).collect(),
            Err(e) => {
                warn!("Retrieval failed, continuing without context: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::sqlite::SqliteVectorStore;
    use crate::test_support::{chunk, FailingEmbedder, LetterEmbedder};

    #[tokio::test]
    async fn indexed_chunks_are_retrievable_in_the_same_run() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn VectorStore> = Arc::new(
            SqliteVectorStore::open(&dir.path().join("rag.db"), Arc::new(LetterEmbedder))
                .await
                .unwrap(),
        );
        let indexer = Indexer::new(store.clone());
        let retriever = Retriever::new(store, 2);

        let stored = indexer
            .index(&[
                chunk("https://a.example", "bbbb"),
                chunk("https://b.example", "cccc"),
                chunk("https://c.example", "bbbc"),
            ])
            .await
            .unwrap();
        assert_eq!(stored, 3);

        let found = retriever.retrieve("bb").await;
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].metadata.source, "https://a.example");
        assert_eq!(found[1].metadata.source, "https://c.example");
    }

    #[tokio::test]
    async fn embedder_failure_degrades_to_errors_and_empty_results() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn VectorStore> = Arc::new(
            SqliteVectorStore::open(&dir.path().join("rag.db"), Arc::new(FailingEmbedder))
                .await
                .unwrap(),
        );

        let indexer = Indexer::new(store.clone());
        assert!(indexer
            .index(&[chunk("https://a.example", "x")])
            .await
            .is_err());
        assert_eq!(indexer.index(&[]).await.unwrap(), 0);

        let retriever = Retriever::new(store, 10);
        assert!(retriever.retrieve("anything").await.is_empty());
    }
}
