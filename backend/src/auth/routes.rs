//! Defines the HTTP routes specifically for authentication.
//!
//! These routes are nested under `/auth` (and `/api/v1/auth`) by the main
//! router.

use crate::app::AppState;
use crate::auth::handlers::*;
use axum::{Router, routing::post};

/// Creates the authentication router with all auth-related routes
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh_token))
}
