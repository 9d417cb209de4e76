//! The check boundary router.
//!
//! `POST /check` and `POST /check/batch` are authenticated (API key or
//! bearer JWT, scopes distinguished); `GET /check/health` is public
//! service status.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use http::HeaderMap;
use serde_json::{Value, json};

use crate::config::KeyScope;
use crate::domain::model::{BatchRequest, BatchResult, CheckRequest, CheckResult};
use crate::domain::service::CheckService;

use super::auth::ApiAuth;
use super::error::ApiError;

/// Shared state for the boundary.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CheckService>,
    pub auth: Arc<ApiAuth>,
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/check", post(check))
        .route("/check/batch", post(batch))
        .route("/check/health", get(health))
        .with_state(state)
}

async fn check(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CheckResult>, ApiError> {
    state.auth.authenticate(&headers, KeyScope::Check)?;
    let result = state.service.check(&request).await?;
    Ok(Json(result))
}

async fn batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchResult>, ApiError> {
    state.auth.authenticate(&headers, KeyScope::Batch)?;
    let result = state.service.batch_check(&request).await?;
    Ok(Json(result))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "enabled": state.service.is_enabled(),
    }))
}
