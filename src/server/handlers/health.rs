use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let indexed_chunks = state.store.count().await?;
    let total_users = state.auth.users().count().await?;
    let settings = &state.settings;
    let reranker = if settings.reranker.enabled {
        json!({ "provider": settings.reranker.provider, "top_k": settings.reranker.top_k })
    } else {
        Value::Null
    };

    Ok(Json(json!({
        "status": "healthy",
        "indexed_chunks": indexed_chunks,
        "total_users": total_users,
        "auth_enabled": state.auth.enabled(),
        "providers": {
            "search": settings.search.provider,
            "llm": { "provider": settings.llm.provider, "model": settings.llm.model },
            "embedding": { "provider": settings.embedding.provider, "model": settings.embedding.model },
            "reranker": reranker,
        }
    })))
}
