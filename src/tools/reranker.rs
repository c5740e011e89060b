//! Second-pass relevance ordering of retrieved chunks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::core::config::settings::RerankerSettings;
use crate::core::errors::ServiceError;
use crate::llm::Embedder;
use crate::pipeline::types::Chunk;
use crate::vector_math::cosine_similarity;

/// Scores each document against the query; one score per document, input order.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, ServiceError>;
}

pub struct Reranker {
    scorer: Option<Arc<dyn RelevanceScorer>>,
}

impl Reranker {
    pub fn new(scorer: Option<Arc<dyn RelevanceScorer>>) -> Self {
        Self { scorer }
    }

    /// Best `top_k` candidates by descending score, ties in input order.
    ///
    /// Without a working scorer the first `top_k` candidates are returned as given.
    pub async fn rerank(&self, query: &str, candidates: Vec<Chunk>, top_k: usize) -> Vec<Chunk> {
        if candidates.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let Some(scorer) = &self.scorer else {
            return first_k(candidates, top_k);
        };

        let documents: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();
        let scores = match scorer.score(query, &documents).await {
            Ok(scores) if scores.len() == candidates.len() => scores,
            Ok(scores) => {
                warn!(
                    "Scorer returned {} scores for {} candidates, keeping retrieval order",
                    scores.len(),
                    candidates.len()
                );
                return first_k(candidates, top_k);
            }
            Err(e) => {
                warn!("Reranking unavailable, keeping retrieval order: {}", e);
                return first_k(candidates, top_k);
            }
        };

        let mut scored: Vec<(f32, Chunk)> = scores.into_iter().zip(candidates).collect();
        // `sort_by` is stable, so equal scores keep their relative order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        info!("Reranked to {} chunks", scored.len());
        scored.into_iter().map(|(_, chunk)| chunk).collect()
    }
}

fn first_k(mut candidates: Vec<Chunk>, top_k: usize) -> Vec<Chunk> {
    candidates.truncate(top_k);
    candidates
}

/// Cosine similarity between query and document embeddings.
pub struct EmbeddingScorer {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingScorer {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl RelevanceScorer for EmbeddingScorer {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, ServiceError> {
        let mut inputs = Vec::with_capacity(documents.len() + 1);
        inputs.push(query.to_string());
        inputs.extend(documents.iter().cloned());

        let embeddings = self.embedder.embed(&inputs).await?;
        if embeddings.len() != inputs.len() {
            return Err(ServiceError::Model(format!(
                "embedding size mismatch: {} != {}",
                embeddings.len(),
                inputs.len()
            )));
        }

        let query_embedding = &embeddings[0];
        Ok(embeddings[1..]
            .iter()
            .map(|doc| cosine_similarity(query_embedding, doc))
            .collect())
    }
}

/// A cross-encoder served over HTTP (`POST {base_url}/rerank`).
pub struct CrossEncoderScorer {
    base_url: String,
    model: String,
    client: Client,
}

#[derive(Deserialize)]
struct RerankItem {
    index: usize,
    score: f32,
}

impl CrossEncoderScorer {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ServiceError::http)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }
}

#[async_trait]
impl RelevanceScorer for CrossEncoderScorer {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, ServiceError> {
        let url = format!("{}/rerank", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&json!({
                "model": self.model,
                "query": query,
                "texts": documents,
            }))
            .send()
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;

        if !res.status().is_success() {
            return Err(ServiceError::Unavailable(format!(
                "cross-encoder returned {}",
                res.status()
            )));
        }

        let items: Vec<RerankItem> = res
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        let mut scores: Vec<Option<f32>> = vec![None; documents.len()];
        for item in items {
            if let Some(slot) = scores.get_mut(item.index) {
                *slot = Some(item.score);
            }
        }
        scores
            .into_iter()
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| ServiceError::Parse("cross-encoder skipped some documents".to_string()))
    }
}

/// Scorer selected by `reranker.provider`, or `None` when reranking is disabled.
pub fn build_scorer(
    settings: &RerankerSettings,
    embedder: Arc<dyn Embedder>,
) -> Result<Option<Arc<dyn RelevanceScorer>>, ServiceError> {
    if !settings.enabled {
        return Ok(None);
    }
    let scorer: Arc<dyn RelevanceScorer> = match settings.provider.as_str() {
        "embedding" => Arc::new(EmbeddingScorer::new(embedder)),
        "cross_encoder" => Arc::new(CrossEncoderScorer::new(
            &settings.base_url,
            &settings.model,
            Duration::from_secs(settings.timeout_secs),
        )?),
        other => {
            return Err(ServiceError::Config(format!(
                "Unknown reranker.provider '{}'",
                other
            )))
        }
    };
    Ok(Some(scorer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{chunk, FailingEmbedder, LetterEmbedder};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedScorer(Vec<f32>);

    #[async_trait]
    impl RelevanceScorer for FixedScorer {
        async fn score(&self, _query: &str, _documents: &[String]) -> Result<Vec<f32>, ServiceError> {
            Ok(self.0.clone())
        }
    }

    fn candidates() -> Vec<Chunk> {
        vec![chunk("a", "first"), chunk("b", "second"), chunk("c", "third")]
    }

    fn sources(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.metadata.source.as_str()).collect()
    }

    #[tokio::test]
    async fn orders_by_descending_score_and_truncates() {
        let reranker = Reranker::new(Some(Arc::new(FixedScorer(vec![0.1, 0.9, 0.5]))));
        let ranked = reranker.rerank("q", candidates(), 2).await;
        assert_eq!(sources(&ranked), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn ties_keep_original_order() {
        let reranker = Reranker::new(Some(Arc::new(FixedScorer(vec![0.5, 0.5, 0.9]))));
        let ranked = reranker.rerank("q", candidates(), 3).await;
        assert_eq!(sources(&ranked), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn missing_or_failing_scorer_keeps_input_order() {
        let reranker = Reranker::new(None);
        assert_eq!(sources(&reranker.rerank("q", candidates(), 2).await), vec!["a", "b"]);

        let failing = Reranker::new(Some(Arc::new(EmbeddingScorer::new(Arc::new(FailingEmbedder)))));
        assert_eq!(sources(&failing.rerank("q", candidates(), 2).await), vec!["a", "b"]);

        let short = Reranker::new(Some(Arc::new(FixedScorer(vec![0.3]))));
        assert_eq!(sources(&short.rerank("q", candidates(), 2).await), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn output_never_exceeds_candidates() {
        let reranker = Reranker::new(Some(Arc::new(FixedScorer(vec![0.1, 0.9, 0.5]))));
        assert_eq!(reranker.rerank("q", candidates(), 10).await.len(), 3);
        assert!(reranker.rerank("q", Vec::new(), 5).await.is_empty());
    }

    #[tokio::test]
    async fn embedding_scorer_uses_cosine() {
        let scorer = EmbeddingScorer::new(Arc::new(LetterEmbedder));
        let scores = scorer
            .score("aa", &["aaaa".to_string(), "zzzz".to_string()])
            .await
            .unwrap();
        assert!((scores[0] - 1.0).abs() < 1e-5);
        assert!(scores[1].abs() < 1e-5);
    }

    #[tokio::test]
    async fn cross_encoder_maps_scores_back_to_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .and(body_partial_json(json!({ "query": "repo rate", "texts": ["x", "y"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "index": 1, "score": 0.8 },
                { "index": 0, "score": 0.2 }
            ])))
            .mount(&server)
            .await;

        let scorer = CrossEncoderScorer::new(&server.uri(), "ms-marco", Duration::from_secs(5)).unwrap();
        let scores = scorer
            .score("repo rate", &["x".to_string(), "y".to_string()])
            .await
            .unwrap();
        assert_eq!(scores, vec![0.2, 0.8]);
    }

    #[test]
    fn disabled_reranker_has_no_scorer() {
        let settings = RerankerSettings {
            enabled: false,
            ..RerankerSettings::default()
        };
        assert!(build_scorer(&settings, Arc::new(LetterEmbedder)).unwrap().is_none());
        assert!(build_scorer(&RerankerSettings::default(), Arc::new(LetterEmbedder))
            .unwrap()
            .is_some());
    }
}
