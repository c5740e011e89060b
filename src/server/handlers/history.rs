use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::core::errors::ApiError;
use crate::history::DEFAULT_USER_LIMIT;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

pub async fn my_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.auth.require_user(&headers).await?;
    let records = state
        .history
        .user_queries(user.id, params.limit.unwrap_or(DEFAULT_USER_LIMIT))
        .await?;
    Ok(Json(records))
}
