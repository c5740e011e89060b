//! The question-answering pipeline.
//!
//! search -> fetch + chunk -> index -> retrieve -> rerank -> answer -> evaluate
//!
//! Every stage degrades on collaborator failure (no results, no context,
//! apology text) so a run always yields a complete [`PipelineResult`]. Only
//! a blank query or a panic inside a stage surfaces as a [`PipelineError`].

pub mod answer;
pub mod evaluation;
pub mod types;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::{stream, FutureExt, StreamExt};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::core::config::Settings;
use crate::llm::LanguageModel;
use crate::rag::{Chunker, Indexer, Retriever, VectorStore};
use crate::tools::{PageFetcher, RelevanceScorer, Reranker, SearchProvider};

use answer::AnswerGenerator;
use types::{Chunk, PipelineResult};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Query must not be empty")]
    EmptyQuery,
    #[error("Unexpected pipeline failure: {0}")]
    Unexpected(String),
}

/// Everything the pipeline talks to, built once at startup.
#[derive(Clone)]
pub struct Collaborators {
    pub search: Arc<dyn SearchProvider>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub store: Arc<dyn VectorStore>,
    pub scorer: Option<Arc<dyn RelevanceScorer>>,
    pub model: Arc<dyn LanguageModel>,
}

pub struct FinancePipeline {
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    chunker: Chunker,
    indexer: Indexer,
    retriever: Retriever,
    reranker: Reranker,
    answerer: AnswerGenerator,
    max_results: usize,
    top_k: usize,
    concurrency: usize,
}

impl FinancePipeline {
    pub fn new(collaborators: Collaborators, settings: &Settings) -> Self {
        let Collaborators {
            search,
            fetcher,
            store,
            scorer,
            model,
        } = collaborators;

        Self {
            search,
            fetcher,
            chunker: Chunker::from_settings(&settings.chunking),
            indexer: Indexer::new(store.clone()),
            retriever: Retriever::new(store, settings.retrieval_limit()),
            reranker: Reranker::new(scorer),
            answerer: AnswerGenerator::new(model),
            max_results: settings.search.max_results,
            top_k: settings.reranker.top_k,
            concurrency: settings.scraper.concurrency.max(1),
        }
    }

    pub async fn run(&self, query: &str) -> Result<PipelineResult, PipelineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        match AssertUnwindSafe(self.run_stages(query)).catch_unwind().await {
            Ok(result) => Ok(result),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Pipeline aborted: {}", message);
                Err(PipelineError::Unexpected(message))
            }
        }
    }

    async fn run_stages(&self, query: &str) -> PipelineResult {
        info!("Starting pipeline for query: {}", query);

        let results = self.search.search(query, self.max_results).await;
        info!("Found {} search results", results.len());

        let links: Vec<String> = results
            .into_iter()
            .filter_map(|r| r.link)
            .filter(|link| !link.trim().is_empty())
            .collect();
        let chunks = self.scrape_and_chunk(links).await;
        info!("Scraped and processed {} chunks", chunks.len());

        if let Err(e) = self.indexer.index(&chunks).await {
            warn!("Indexing failed, retrieving from existing index: {}", e);
        }

        let retrieved = self.retriever.retrieve(query).await;
        info!("Retrieved {} chunks", retrieved.len());

        let context = self.reranker.rerank(query, retrieved, self.top_k).await;
        let answer = self.answerer.generate(query, &context).await;
        let evaluation = evaluation::evaluate(query, &answer, &context);

        PipelineResult {
            answer,
            sources: context.into_iter().map(|c| c.metadata).collect(),
            evaluation,
        }
    }

    /// Fetches pages with bounded concurrency. Pages that fail are skipped;
    /// chunk order across pages is unspecified.
    async fn scrape_and_chunk(&self, links: Vec<String>) -> Vec<Chunk> {
        stream::iter(links)
            .map(|url| async move {
                match self.fetcher.fetch(&url).await {
                    Some(page) => self.chunker.chunk(&page.text, &page.metadata),
                    None => Vec::new(),
                }
            })
            .buffer_unordered(self.concurrency)
            .concat()
            .await
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "stage panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ServiceError;
    use crate::pipeline::answer::ANSWER_FALLBACK;
    use crate::pipeline::evaluation::{FEEDBACK_NO_CITATIONS, FEEDBACK_TOO_SHORT};
    use crate::pipeline::types::{PageMetadata, RankedChunk, ScrapedPage, SearchResult};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    struct FixedSearch(Vec<SearchResult>);

    #[async_trait]
    impl SearchProvider for FixedSearch {
        async fn search(&self, _query: &str, max_results: usize) -> Vec<SearchResult> {
            self.0.iter().take(max_results).cloned().collect()
        }
    }

    /// Serves a short page for every URL except those containing "broken".
    struct FakeFetcher;

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Option<ScrapedPage> {
            if url.contains("broken") {
                return None;
            }
            Some(ScrapedPage {
                text: format!("Content of {}", url),
                metadata: PageMetadata {
                    source: url.to_string(),
                    title: format!("Page {}", url),
                },
            })
        }
    }

    /// Keeps chunks in memory; every stored chunk matches every query.
    #[derive(Default)]
    struct MemoryStore {
        chunks: Mutex<Vec<Chunk>>,
    }

    #[async_trait]
    impl VectorStore for MemoryStore {
        async fn upsert(&self, chunks: &[Chunk]) -> Result<usize, ServiceError> {
            self.chunks.lock().unwrap().extend_from_slice(chunks);
            Ok(chunks.len())
        }

        async fn query(&self, _text: &str, k: usize) -> Result<Vec<RankedChunk>, ServiceError> {
            Ok(self
                .chunks
                .lock()
                .unwrap()
                .iter()
                .take(k)
                .map(|chunk| RankedChunk {
                    chunk: chunk.clone(),
                    score: 1.0,
                })
                .collect())
        }

        async fn count(&self) -> Result<usize, ServiceError> {
            Ok(self.chunks.lock().unwrap().len())
        }

        async fn prune_older_than(&self, _cutoff: DateTime<Utc>) -> Result<usize, ServiceError> {
            Ok(0)
        }
    }

    struct DownStore;

    #[async_trait]
    impl VectorStore for DownStore {
        async fn upsert(&self, _chunks: &[Chunk]) -> Result<usize, ServiceError> {
            Err(ServiceError::Store("database is locked".to_string()))
        }

        async fn query(&self, _text: &str, _k: usize) -> Result<Vec<RankedChunk>, ServiceError> {
            Err(ServiceError::Store("database is locked".to_string()))
        }

        async fn count(&self) -> Result<usize, ServiceError> {
            Err(ServiceError::Store("database is locked".to_string()))
        }

        async fn prune_older_than(&self, _cutoff: DateTime<Utc>) -> Result<usize, ServiceError> {
            Err(ServiceError::Store("database is locked".to_string()))
        }
    }

    enum ModelBehaviour {
        Reply(&'static str),
        Fail,
        Panic,
    }

    struct FakeModel(ModelBehaviour);

    #[async_trait]
    impl LanguageModel for FakeModel {
        fn name(&self) -> &str {
            "fake"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, ServiceError> {
            match self.0 {
                ModelBehaviour::Reply(text) => Ok(text.to_string()),
                ModelBehaviour::Fail => Err(ServiceError::Model("unreachable".to_string())),
                ModelBehaviour::Panic => panic!("model client bug"),
            }
        }
    }

    fn result(link: Option<&str>) -> SearchResult {
        SearchResult {
            title: Some("t".to_string()),
            link: link.map(str::to_string),
            snippet: None,
        }
    }

    fn pipeline(
        search: Vec<SearchResult>,
        store: Arc<dyn VectorStore>,
        model: ModelBehaviour,
    ) -> FinancePipeline {
        FinancePipeline::new(
            Collaborators {
                search: Arc::new(FixedSearch(search)),
                fetcher: Arc::new(FakeFetcher),
                store,
                scorer: None,
                model: Arc::new(FakeModel(model)),
            },
            &Settings::default(),
        )
    }

    #[tokio::test]
    async fn one_failed_fetch_does_not_abort_the_run() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(
            vec![
                result(Some("https://a.example")),
                result(Some("https://broken.example")),
                result(Some("https://c.example")),
                result(None),
            ],
            store.clone(),
            ModelBehaviour::Reply("The GST council meets quarterly to revise rates [1]."),
        );

        let outcome = pipeline.run("When does the GST council meet").await.unwrap();

        let mut sources: Vec<String> = store
            .chunks
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.metadata.source.clone())
            .collect();
        sources.sort();
        assert_eq!(sources, vec!["https://a.example", "https://c.example"]);

        assert_eq!(outcome.sources.len(), 2);
        assert_eq!(
            outcome.answer,
            "The GST council meets quarterly to revise rates [1]."
        );
        assert_eq!(outcome.evaluation.score, 1.0);
    }

    #[tokio::test]
    async fn every_collaborator_failing_still_yields_an_envelope() {
        let pipeline = pipeline(
            vec![result(Some("https://broken.example"))],
            Arc::new(DownStore),
            ModelBehaviour::Fail,
        );

        let outcome = pipeline.run("What is GST?").await.unwrap();
        assert_eq!(outcome.answer, ANSWER_FALLBACK);
        assert!(outcome.sources.is_empty());
        assert!(outcome.evaluation.feedback.contains(&FEEDBACK_NO_CITATIONS.to_string()));
        assert!(!outcome.evaluation.feedback.contains(&FEEDBACK_TOO_SHORT.to_string()));
    }

    #[tokio::test]
    async fn sources_follow_the_reranked_context() {
        let store = Arc::new(MemoryStore::default());
        let mut settings = Settings::default();
        settings.reranker.top_k = 1;
        let pipeline = FinancePipeline::new(
            Collaborators {
                search: Arc::new(FixedSearch(vec![
                    result(Some("https://a.example")),
                    result(Some("https://b.example")),
                ])),
                fetcher: Arc::new(FakeFetcher),
                store,
                scorer: None,
                model: Arc::new(FakeModel(ModelBehaviour::Reply("ok"))),
            },
            &settings,
        );

        let outcome = pipeline.run("q").await.unwrap();
        assert_eq!(outcome.sources.len(), 1);
    }

    #[tokio::test]
    async fn blank_links_are_never_fetched() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(
            vec![
                result(Some("")),
                result(Some("   ")),
                result(Some("https://a.example")),
            ],
            store.clone(),
            ModelBehaviour::Reply("ok"),
        );

        pipeline.run("What is GST?").await.unwrap();

        let sources: Vec<String> = store
            .chunks
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.metadata.source.clone())
            .collect();
        assert_eq!(sources, vec!["https://a.example"]);
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let pipeline = pipeline(Vec::new(), Arc::new(MemoryStore::default()), ModelBehaviour::Fail);
        assert!(matches!(pipeline.run("   ").await, Err(PipelineError::EmptyQuery)));
    }

    #[tokio::test]
    async fn panics_surface_as_unexpected_errors() {
        let pipeline = pipeline(Vec::new(), Arc::new(MemoryStore::default()), ModelBehaviour::Panic);
        match pipeline.run("What is GST?").await {
            Err(PipelineError::Unexpected(msg)) => assert!(msg.contains("model client bug")),
            other => panic!("expected unexpected error, got {:?}", other.map(|r| r.answer)),
        }
    }
}
