//! VectorStore trait: the persistent similarity index behind indexing and retrieval.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::core::errors::ServiceError;
use crate::pipeline::types::{Chunk, RankedChunk};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embeds and stores chunks not already present.
    ///
    /// Returns the number of newly stored chunks; duplicates (same source and
    /// content) are skipped. Everything is committed before this returns.
    async fn upsert(&self, chunks: &[Chunk]) -> Result<usize, ServiceError>;

    /// Up to `k` stored chunks most similar to `text`, best first.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<RankedChunk>, ServiceError>;

    async fn count(&self) -> Result<usize, ServiceError>;

    /// Deletes chunks stored before `cutoff`. Returns how many were removed.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, ServiceError>;
}

/// Content-hash identity of a chunk: SHA-256 over source and content.
pub fn chunk_id(chunk: &Chunk) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk.metadata.source.as_bytes());
    hasher.update([0u8]);
    hasher.update(chunk.content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::PageMetadata;

    fn chunk(source: &str, content: &str) -> Chunk {
        Chunk {
            content: content.to_string(),
            metadata: PageMetadata {
                source: source.to_string(),
                title: "t".to_string(),
            },
        }
    }

    #[test]
    fn chunk_id_depends_on_source_and_content_only() {
        let a = chunk("https://a.example", "RBI policy");
        let mut retitled = a.clone();
        retitled.metadata.title = "other".to_string();

        assert_eq!(chunk_id(&a), chunk_id(&retitled));
        assert_ne!(chunk_id(&a), chunk_id(&chunk("https://b.example", "RBI policy")));
        assert_ne!(chunk_id(&a), chunk_id(&chunk("https://a.example", "RBI policy.")));
        assert_eq!(chunk_id(&a).len(), 64);
    }
}
