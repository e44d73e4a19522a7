//! Collection of general utility functions shared by the middleware and
//! the authentication layer.

use axum::extract::{OriginalUri, Request};

pub mod crypto;
pub mod jwt;

/// Path of the request as the client sent it, before any router nesting
/// stripped a prefix.
pub fn original_path(request: &Request) -> String {
    request
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}
