pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod provider;

use std::sync::Arc;
use std::time::Duration;

use crate::core::config::settings::{EmbeddingSettings, LlmSettings};
use crate::core::errors::ServiceError;

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use provider::{Embedder, LanguageModel};

/// Builds the answer model named by `llm.provider`.
pub fn build_language_model(settings: &LlmSettings) -> Result<Arc<dyn LanguageModel>, ServiceError> {
    let timeout = Duration::from_secs(settings.timeout_secs);
    let model: Arc<dyn LanguageModel> = match settings.provider.as_str() {
        "ollama" => Arc::new(
            OllamaProvider::new(&settings.base_url, &settings.model, timeout)?
                .with_sampling(settings.temperature, settings.max_tokens),
        ),
        "openai" => Arc::new(
            OpenAiProvider::new(&settings.base_url, &settings.model, &settings.api_key, timeout)?
                .with_sampling(settings.temperature, settings.max_tokens),
        ),
        "gemini" => {
            // The shared default points at a local Ollama; Gemini lives elsewhere.
            let base_url = if settings.base_url == LlmSettings::default().base_url {
                gemini::DEFAULT_GEMINI_URL
            } else {
                settings.base_url.as_str()
            };
            Arc::new(
                GeminiProvider::new(base_url, &settings.model, &settings.api_key, timeout)?
                    .with_sampling(settings.temperature, settings.max_tokens),
            )
        }
        other => {
            return Err(ServiceError::Config(format!(
                "Unknown llm.provider '{}'",
                other
            )))
        }
    };
    Ok(model)
}

/// Builds the embedder named by `embedding.provider`.
pub fn build_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>, ServiceError> {
    let timeout = Duration::from_secs(settings.timeout_secs);
    let embedder: Arc<dyn Embedder> = match settings.provider.as_str() {
        "ollama" => Arc::new(OllamaProvider::new(
            &settings.base_url,
            &settings.model,
            timeout,
        )?),
        "openai" => Arc::new(OpenAiProvider::new(
            &settings.base_url,
            &settings.model,
            &settings.api_key,
            timeout,
        )?),
        other => {
            return Err(ServiceError::Config(format!(
                "Unknown embedding.provider '{}'",
                other
            )))
        }
    };
    Ok(embedder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_each_configured_language_model() {
        for provider in ["ollama", "openai"] {
            let settings = LlmSettings {
                provider: provider.to_string(),
                ..LlmSettings::default()
            };
            assert_eq!(build_language_model(&settings).unwrap().name(), provider);
        }

        let gemini = LlmSettings {
            provider: "gemini".to_string(),
            api_key: "g-key".to_string(),
            ..LlmSettings::default()
        };
        assert_eq!(build_language_model(&gemini).unwrap().name(), "gemini");
    }

    #[test]
    fn unknown_providers_are_config_errors() {
        let settings = LlmSettings {
            provider: "llamafile".to_string(),
            ..LlmSettings::default()
        };
        assert!(matches!(
            build_language_model(&settings),
            Err(ServiceError::Config(_))
        ));

        let settings = EmbeddingSettings {
            provider: "cohere".to_string(),
            ..EmbeddingSettings::default()
        };
        assert!(matches!(build_embedder(&settings), Err(ServiceError::Config(_))));
    }

    #[test]
    fn builds_embedders() {
        assert_eq!(build_embedder(&EmbeddingSettings::default()).unwrap().name(), "ollama");
    }
}
