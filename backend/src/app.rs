//! Application state and router assembly.
//!
//! Every route is served both at the root and under `/api/v1`. Requests
//! pass the rate limiter first, then the bearer-token middleware, then the
//! handler.

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::api::prediction::routes::prediction_router;
use crate::auth::{AuthService, authenticate_request, routes::auth_router};
use crate::config::Config;
use crate::errors::ServiceResult;
use crate::rate_limit::{RateLimiter, rate_limit_middleware};
use crate::services::inference_service::{InferenceRunner, PythonInferenceRunner};
use crate::utils::jwt::TokenCodec;

pub const API_PREFIX: &str = "/api/v1";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub token_codec: Arc<TokenCodec>,
    pub rate_limiter: Arc<RateLimiter>,
    pub inference: Arc<dyn InferenceRunner>,
    pub predict_allow_anonymous: bool,
    pub top_k: u32,
}

impl AppState {
    /// Wires the production collaborators from configuration.
    pub fn from_config(config: &Config) -> ServiceResult<Self> {
        Self::with_inference(
            config,
            Arc::new(PythonInferenceRunner::new(&config.inference)),
        )
    }

    /// Same as [`AppState::from_config`] with a caller-supplied inference runner.
    pub fn with_inference(
        config: &Config,
        inference: Arc<dyn InferenceRunner>,
    ) -> ServiceResult<Self> {
        let token_codec = Arc::new(TokenCodec::from_config(config)?);
        let auth_service = Arc::new(AuthService::from_config(config, token_codec.clone())?);

        Ok(AppState {
            auth_service,
            token_codec,
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            inference,
            predict_allow_anonymous: config.predict_allow_anonymous,
            top_k: config.inference.top_k,
        })
    }
}

/// Builds the full router with middleware applied.
pub fn build_router(state: AppState, config: &Config) -> Router {
    let routes = Router::new()
        .merge(prediction_router())
        .nest("/auth", auth_router());

    Router::new()
        .merge(routes.clone())
        .nest(API_PREFIX, routes)
        .layer(middleware::from_fn_with_state(
            state.token_codec.clone(),
            authenticate_request,
        ))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors_layer(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([HeaderName::from_static("retry-after")])
        .allow_credentials(false)
        .max_age(Duration::from_secs(3600))
}
