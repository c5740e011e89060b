use async_trait::async_trait;

use crate::core::errors::ServiceError;

/// A text completion backend. Stateless per call.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// provider name (e.g. "ollama", "openai", "gemini")
    fn name(&self) -> &str;

    /// single-turn completion of `prompt`
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError>;
}

/// Turns texts into embedding vectors, one per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;
}
