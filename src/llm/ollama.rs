use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::{Embedder, LanguageModel};
use crate::core::errors::ServiceError;
use crate::pipeline::evaluation::coerce_answer;

/// Ollama's native API: `/api/generate` for completions, `/api/embed` for vectors.
#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    model: String,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    client: Client,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ServiceError::http)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
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

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(ServiceError::http)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ServiceError::Model(format!(
                "Ollama {} returned {}: {}",
                path, status, text
            )));
        }

        res.json().await.map_err(|e| ServiceError::Parse(e.to_string()))
    }
}

#[async_trait]
impl LanguageModel for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        let mut options = serde_json::Map::new();
        if let Some(t) = self.temperature {
            options.insert("temperature".to_string(), json!(t));
        }
        if let Some(n) = self.max_tokens {
            options.insert("num_predict".to_string(), json!(n));
        }

        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": options,
        });

        let payload = self.post("/api/generate", &body).await?;
        match payload.get("response") {
            Some(value) => Ok(coerce_answer(value)),
            None => Err(ServiceError::Parse(
                "Ollama response has no 'response' field".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Embedder for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.model,
            "input": inputs,
        });
        let payload = self.post("/api/embed", &body).await?;

        let embeddings: Vec<Vec<f32>> = payload["embeddings"]
            .as_array()
            .map(|rows| rows.iter().map(parse_vector).collect())
            .unwrap_or_default();

        if embeddings.len() != inputs.len() {
            return Err(ServiceError::Parse(format!(
                "Ollama returned {} embeddings for {} inputs",
                embeddings.len(),
                inputs.len()
            )));
        }
        Ok(embeddings)
    }
}

pub(crate) fn parse_vector(value: &Value) -> Vec<f32> {
    value
        .as_array()
        .map(|vals| {
            vals.iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect()
        })
        .unwrap_or_default()
}
