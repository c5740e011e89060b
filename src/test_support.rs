//! Deterministic fakes shared by unit tests.

use async_trait::async_trait;

use crate::core::errors::ServiceError;
use crate::llm::Embedder;
use crate::pipeline::types::{Chunk, PageMetadata};

/// Embeds text as its a-z letter histogram.
pub struct LetterEmbedder;

#[async_trait]
impl Embedder for LetterEmbedder {
    fn name(&self) -> &str {
        "letters"
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        Ok(inputs
            .iter()
            .map(|text| {
                let mut counts = vec![0.0_f32; 26];
                for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
                    counts[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
                }
                counts
            })
            .collect())
    }
}

/// An embedder whose backend is down.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        Err(ServiceError::Http("connection refused".to_string()))
    }
}

pub fn chunk(source: &str, content: &str) -> Chunk {
    Chunk {
        content: content.to_string(),
        metadata: PageMetadata {
            source: source.to_string(),
            title: format!("Title of {}", source),
        },
    }
}
