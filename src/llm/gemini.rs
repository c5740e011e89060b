use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::LanguageModel;
use crate::core::errors::ServiceError;
use crate::pipeline::evaluation::coerce_answer;

pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Clone)]
pub struct GeminiProvider {
    base_url: String,
    model: String,
    api_key: String,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    client: Client,
}

impl GeminiProvider {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        if api_key.trim().is_empty() {
            return Err(ServiceError::Config(
                "llm.api_key is required for the gemini provider".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ServiceError::http)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.trim().to_string(),
            temperature: None,
            max_tokens: None,
            client,
        })
    }

    pub fn with_sampling(mut self, temperature: Option<f64>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl LanguageModel for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let mut generation = serde_json::Map::new();
        if let Some(t) = self.temperature {
            generation.insert("temperature".to_string(), json!(t));
        }
        if let Some(n) = self.max_tokens {
            generation.insert("maxOutputTokens".to_string(), json!(n));
        }

        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": generation,
        });

        let res = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(ServiceError::http)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ServiceError::Model(format!(
                "Gemini returned {}: {}",
                status, text
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        let parts = &payload["candidates"][0]["content"]["parts"];
        if !parts.is_array() {
            return Err(ServiceError::Parse(
                "Gemini response has no candidate parts".to_string(),
            ));
        }
        Ok(coerce_answer(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn complete_joins_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-flash-latest:generateContent"))
            .and(query_param("key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [
                    { "text": "A. Summary" },
                    { "text": "- ITR is due in July." }
                ] } }]
            })))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(
            &server.uri(),
            "gemini-flash-latest",
            "g-key",
            Duration::from_secs(5),
        )
        .unwrap();
        let answer = provider.complete("When is ITR due?").await.unwrap();
        assert_eq!(answer, "A. Summary - ITR is due in July.");
    }

    #[tokio::test]
    async fn blocked_prompt_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let provider =
            GeminiProvider::new(&server.uri(), "m", "g-key", Duration::from_secs(5)).unwrap();
        assert!(matches!(
            provider.complete("x").await,
            Err(ServiceError::Parse(_))
        ));
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let result = GeminiProvider::new(DEFAULT_GEMINI_URL, "m", " ", Duration::from_secs(5));
        assert!(matches!(result, Err(ServiceError::Config(_))));
    }
}
