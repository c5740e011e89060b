use std::sync::Arc;

use crate::auth::{AuthService, UserStore};
use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::core::database;
use crate::history::QueryHistoryStore;
use crate::llm::{build_embedder, build_language_model};
use crate::pipeline::{Collaborators, FinancePipeline};
use crate::rag::{SqliteVectorStore, VectorStore};
use crate::tools::{build_scorer, HttpPageFetcher, WebSearch};

pub mod error;

use error::InitializationError;

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    /// Settings captured at startup. Config edits apply on the next start.
    pub settings: Arc<Settings>,
    pub auth: Arc<AuthService>,
    pub history: QueryHistoryStore,
    pub store: Arc<dyn VectorStore>,
    pub pipeline: Arc<FinancePipeline>,
}

impl AppState {
    /// Builds every collaborator once, in order:
    /// 1. configuration
    /// 2. application database (users, then history) and the admin account
    /// 3. embedder and vector store
    /// 4. search, fetcher, scorer and language model, wired into the pipeline
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let settings = config
            .settings()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let pool = database::connect(&paths.db_path, 5)
            .await
            .map_err(|e| InitializationError::Database(e.into()))?;
        let users = UserStore::new(pool.clone())
            .await
            .map_err(|e| InitializationError::Users(e.into()))?;
        let history = QueryHistoryStore::new(pool)
            .await
            .map_err(|e| InitializationError::History(e.into()))?;

        let auth = AuthService::new(users, &settings.auth);
        if settings.auth.enabled {
            auth.bootstrap_admin(&settings.auth)
                .await
                .map_err(|e| InitializationError::Users(e.into()))?;
        } else {
            tracing::warn!("Authentication is disabled; every request acts as an administrator");
        }

        let (collaborators, store) = build_collaborators(&settings, &paths).await?;
        let pipeline = FinancePipeline::new(collaborators, &settings);

        tracing::info!(
            "Pipeline ready: search={}, llm={}/{}, embedding={}/{}, reranker={}",
            settings.search.provider,
            settings.llm.provider,
            settings.llm.model,
            settings.embedding.provider,
            settings.embedding.model,
            if settings.reranker.enabled {
                settings.reranker.provider.as_str()
            } else {
                "off"
            }
        );

        Ok(Arc::new(Self::from_parts(
            paths, config, settings, auth, history, store, pipeline,
        )))
    }

    pub fn from_parts(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: Settings,
        auth: AuthService,
        history: QueryHistoryStore,
        store: Arc<dyn VectorStore>,
        pipeline: FinancePipeline,
    ) -> Self {
        Self {
            paths,
            config,
            settings: Arc::new(settings),
            auth: Arc::new(auth),
            history,
            store,
            pipeline: Arc::new(pipeline),
        }
    }
}

/// The configured pipeline collaborators plus the vector store they share.
pub async fn build_collaborators(
    settings: &Settings,
    paths: &AppPaths,
) -> Result<(Collaborators, Arc<dyn VectorStore>), InitializationError> {
    let embedder = build_embedder(&settings.embedding)
        .map_err(|e| InitializationError::Collaborators(e.into()))?;

    let store: Arc<dyn VectorStore> = Arc::new(
        SqliteVectorStore::open(&paths.rag_db_path, embedder.clone())
            .await
            .map_err(|e| InitializationError::VectorStore(e.into()))?,
    );

    let search = WebSearch::new(&settings.search, &settings.scraper.user_agent)
        .map_err(|e| InitializationError::Collaborators(e.into()))?;
    let fetcher = HttpPageFetcher::new(&settings.scraper)
        .map_err(|e| InitializationError::Collaborators(e.into()))?;
    let scorer = build_scorer(&settings.reranker, embedder)
        .map_err(|e| InitializationError::Collaborators(e.into()))?;
    let model = build_language_model(&settings.llm)
        .map_err(|e| InitializationError::Collaborators(e.into()))?;

    let collaborators = Collaborators {
        search: Arc::new(search),
        fetcher: Arc::new(fetcher),
        store: store.clone(),
        scorer,
        model,
    };
    Ok((collaborators, store))
}
