//! Rate limiting middleware.
//!
//! Applies [`RateLimiter`] to POST requests on the login, refresh and
//! predict endpoints (bare and under `/api/v1`). Everything else passes
//! through untouched.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

use super::{Admission, RateLimiter};
use crate::errors::ServiceError;
use crate::utils::original_path;

const RATE_LIMITED_PATHS: &[&str] = &[
    "/predict",
    "/auth/login",
    "/auth/refresh",
    "/api/v1/predict",
    "/api/v1/auth/login",
    "/api/v1/auth/refresh",
];

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Whether a request is subject to rate limiting.
pub fn is_rate_limited(method: &Method, path: &str) -> bool {
    method == Method::POST && RATE_LIMITED_PATHS.contains(&path)
}

/// Builds the counter key: client address plus request path.
///
/// With `trust_forwarded_for` the first `X-Forwarded-For` hop is used; this
/// lets any client pick its own key unless a trusted proxy rewrites the
/// header, so it is off by default.
pub fn client_key(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    path: &str,
    trust_forwarded_for: bool,
) -> String {
    let forwarded = trust_forwarded_for
        .then(|| {
            headers
                .get(FORWARDED_FOR)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(String::from)
        })
        .flatten();

    let client = forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    format!("{}:{}", client, path)
}

/// Rate limiting middleware function.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let path = original_path(&request);
    if !is_rate_limited(request.method(), &path) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(
        request.headers(),
        peer,
        &path,
        limiter.config().trust_forwarded_for,
    );

    match limiter.admit(&key, Utc::now()) {
        Admission::Admitted => next.run(request).await,
        Admission::Rejected {
            retry_after_seconds,
        } => {
            warn!(
                client_key = %key,
                retry_after_secs = retry_after_seconds,
                "Rate limit exceeded"
            );
            ServiceError::rate_exceeded(retry_after_seconds).into_response()
        }
    }
}
