use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::json;

use crate::auth::RegisterRequest;
use crate::core::errors::ApiError;
use crate::state::AppState;

/// OAuth2 password-flow form; `username` may also be an email.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Result<impl IntoResponse, ApiError> {
    let (token, user) = state.auth.login(&form.username, &form.password).await?;
    Ok(Json(json!({
        "access_token": token,
        "token_type": "bearer",
        "user": user,
    })))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.auth.require_user(&headers).await?;
    Ok(Json(user))
}
