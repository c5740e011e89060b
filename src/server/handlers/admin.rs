//! Administrator-only routes. Every handler checks the admin role first.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::history::DEFAULT_ADMIN_LIMIT;
use crate::server::handlers::history::LimitQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RoleUpdate {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct PruneQuery {
    pub older_than_days: Option<i64>,
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.require_admin(&headers).await?;
    Ok(Json(state.auth.users().list_users().await?))
}

/// Deleting a user also drops their query history.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = state.auth.require_admin(&headers).await?;
    if admin.id == user_id {
        return Err(ApiError::BadRequest(
            "Cannot delete your own account".to_string(),
        ));
    }
    if !state.auth.users().delete_user(user_id).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }
    Ok(Json(json!({ "status": "deleted", "id": user_id })))
}

pub async fn update_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
    Json(update): Json<RoleUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.require_admin(&headers).await?;
    if !state.auth.users().update_role(user_id, &update.role).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }
    let user = state
        .auth
        .users()
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(user))
}

pub async fn all_queries(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.require_admin(&headers).await?;
    let records = state
        .history
        .all_queries(params.limit.unwrap_or(DEFAULT_ADMIN_LIMIT))
        .await?;
    Ok(Json(records))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.require_admin(&headers).await?;
    Ok(Json(state.history.stats().await?))
}

pub async fn index_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.require_admin(&headers).await?;
    let chunks = state.store.count().await?;
    Ok(Json(json!({ "chunks": chunks })))
}

pub async fn prune_index(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<PruneQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.require_admin(&headers).await?;
    let days = match params.older_than_days {
        Some(days) if days >= 0 => days,
        _ => {
            return Err(ApiError::BadRequest(
                "older_than_days must be a non-negative integer".to_string(),
            ))
        }
    };

    let cutoff = Duration::try_days(days)
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .ok_or_else(|| ApiError::BadRequest("older_than_days is out of range".to_string()))?;
    let removed = state.store.prune_older_than(cutoff).await?;
    tracing::info!("Pruned {} chunks stored before {}", removed, cutoff);
    Ok(Json(json!({ "removed": removed, "cutoff": cutoff.to_rfc3339() })))
}

pub async fn get_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.require_admin(&headers).await?;
    let config = state.config.load_config()?;
    Ok(Json(state.config.redact_sensitive_values(&config)))
}

/// Merges and validates the patch. The running service keeps its startup settings.
pub async fn patch_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.require_admin(&headers).await?;
    state.config.update_config(payload, true)?;
    Ok(Json(json!({ "status": "success", "applies": "on restart" })))
}
