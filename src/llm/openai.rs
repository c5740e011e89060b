use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};

use super::ollama::parse_vector;
use super::provider::{Embedder, LanguageModel};
use crate::core::errors::ServiceError;
use crate::pipeline::evaluation::coerce_answer;

/// Any server speaking the OpenAI REST dialect (OpenAI, LM Studio, vLLM, llama.cpp server).
#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ServiceError::http)?;
        let api_key = (!api_key.trim().is_empty()).then(|| api_key.trim().to_string());
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
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

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .authorized(self.client.post(&url))
            .json(body)
            .send()
            .await
            .map_err(ServiceError::http)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ServiceError::Model(format!(
                "OpenAI-compatible {} returned {}: {}",
                path, status, text
            )));
        }

        res.json().await.map_err(|e| ServiceError::Parse(e.to_string()))
    }
}

#[async_trait]
impl LanguageModel for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = self.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = self.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
        }

        let payload = self.post("/v1/chat/completions", &body).await?;
        let content = &payload["choices"][0]["message"]["content"];
        if content.is_null() {
            return Err(ServiceError::Parse(
                "chat completion has no message content".to_string(),
            ));
        }
        Ok(coerce_answer(content))
    }
}

#[async_trait]
impl Embedder for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.model,
            "input": inputs,
        });
        let payload = self.post("/v1/embeddings", &body).await?;

        let mut rows: Vec<(usize, Vec<f32>)> = payload["data"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .map(|(pos, item)| {
                        let index = item["index"].as_u64().map(|i| i as usize).unwrap_or(pos);
                        (index, parse_vector(&item["embedding"]))
                    })
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|(index, _)| *index);

        if rows.len() != inputs.len() {
            return Err(ServiceError::Parse(format!(
                "embedding endpoint returned {} vectors for {} inputs",
                rows.len(),
                inputs.len()
            )));
        }
        Ok(rows.into_iter().map(|(_, v)| v).collect())
    }
}
