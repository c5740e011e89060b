use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::core::errors::ApiError;
use crate::pipeline::types::PipelineResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
}

/// Runs the pipeline. Signed-in callers get the exchange saved to their history.
pub async fn ask(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<AskRequest>,
) -> Result<Json<PipelineResult>, ApiError> {
    let user = state.auth.optional_user(&headers).await;

    let started = Instant::now();
    let result = state.pipeline.run(&request.query).await?;
    let response_time = started.elapsed().as_secs_f64();

    if let Some(user) = user {
        if let Err(e) = state
            .history
            .save_query(user.id, request.query.trim(), &result, response_time)
            .await
        {
            tracing::warn!("Failed to save query history for user {}: {}", user.id, e);
        }
    }

    Ok(Json(result))
}
