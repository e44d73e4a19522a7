//! Handler functions for the login and token refresh endpoints.
//!
//! Payloads are validated by the extractor; bcrypt verification runs on the
//! blocking pool so it does not stall the async workers.

use axum::{Json, extract::State};
use std::sync::Arc;

use crate::api::common::ValidatedJson;
use crate::app::AppState;
use crate::auth::models::{LoginRequest, RefreshTokenRequest, TokenPair};
use crate::auth::service::AuthService;
use crate::errors::{ServiceError, ServiceResult};

/// Handle user login request
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> ServiceResult<Json<TokenPair>> {
    let pair = run_blocking(state.auth_service, move |service| {
        service.login(&payload.username, &payload.password)
    })
    .await?;

    Ok(Json(pair))
}

/// Handle token refresh request
#[axum::debug_handler]
pub async fn refresh_token(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RefreshTokenRequest>,
) -> ServiceResult<Json<TokenPair>> {
    let pair = run_blocking(state.auth_service, move |service| {
        service.refresh(&payload.refresh_token)
    })
    .await?;

    Ok(Json(pair))
}

async fn run_blocking<F>(service: Arc<AuthService>, f: F) -> ServiceResult<TokenPair>
where
    F: FnOnce(&AuthService) -> ServiceResult<TokenPair> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| ServiceError::internal_error(format!("Auth task failed: {}", e)))?
}
