//! Defines the HTTP routes for health checks and predictions.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::api::prediction::handlers::{MAX_UPLOAD_BYTES, health, predict};
use crate::app::AppState;

/// Room for multipart boundaries and headers around the image itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Creates the prediction router
pub fn prediction_router() -> Router<AppState> {
    Router::new().route("/health", get(health)).route(
        "/predict",
        post(predict).layer(DefaultBodyLimit::max(
            MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD_BYTES,
        )),
    )
}
