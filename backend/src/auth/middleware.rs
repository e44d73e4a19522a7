//! Middleware attaching the bearer-token identity to requests.
//!
//! A request without a bearer `Authorization` header is passed on
//! unauthenticated; handlers decide whether they need an identity. A bearer
//! header that carries an empty or invalid token is rejected right here.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{Extensions, HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::sync::Arc;

use crate::auth::models::AuthenticatedUser;
use crate::errors::ServiceError;
use crate::utils::jwt::TokenCodec;
use crate::utils::original_path;

const BEARER_PREFIX: &str = "Bearer ";

/// Paths that never go through bearer-token checks.
const EXEMPT_PATHS: &[&str] = &[
    "/health",
    "/auth/login",
    "/auth/refresh",
    "/api/v1/health",
    "/api/v1/auth/login",
    "/api/v1/auth/refresh",
];

pub fn is_exempt(path: &str) -> bool {
    EXEMPT_PATHS.contains(&path)
}

/// Bearer-token authentication middleware
pub async fn authenticate_request(
    State(codec): State<Arc<TokenCodec>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    if is_exempt(&original_path(&request)) {
        return Ok(next.run(request).await);
    }

    let Some(token) = bearer_token(request.headers())? else {
        return Ok(next.run(request).await);
    };

    if token.is_empty() {
        return Err(ServiceError::unauthenticated("Missing bearer token."));
    }

    let username = codec
        .verify_access_token(&token)
        .ok_or_else(|| ServiceError::unauthenticated("Invalid access token."))?;

    attach_identity(request.extensions_mut(), AuthenticatedUser::api_user(username));

    Ok(next.run(request).await)
}

/// Extracts the token from a bearer `Authorization` header.
///
/// `Ok(None)` means there is no bearer credential at all. A bare `Bearer`
/// yields an empty token since HTTP servers strip trailing whitespace from
/// header values. Non-UTF-8 token bytes are rejected.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<String>, ServiceError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let bytes = value.as_bytes();

    let raw: &[u8] = match bytes.strip_prefix(BEARER_PREFIX.as_bytes()) {
        Some(rest) => rest,
        None if bytes.trim_ascii() == BEARER_PREFIX.trim_end().as_bytes() => &[],
        None => return Ok(None),
    };

    let token = std::str::from_utf8(raw)
        .map_err(|_| ServiceError::unauthenticated("Invalid access token."))?;
    Ok(Some(token.trim().to_string()))
}

/// Stores `user` unless an identity is already present.
pub fn attach_identity(extensions: &mut Extensions, user: AuthenticatedUser) {
    if extensions.get::<AuthenticatedUser>().is_none() {
        extensions.insert(user);
    }
}

/// Extract the identity from a request (use after the middleware)
pub fn current_user(extensions: &Extensions) -> Option<&AuthenticatedUser> {
    extensions.get::<AuthenticatedUser>()
}

/// Extractor yielding the authenticated caller, if any.
pub struct MaybeUser(pub Option<AuthenticatedUser>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(current_user(&parts.extensions).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::Role;
    use crate::utils::jwt::tests::codec;
    use axum::{
        Router,
        body::Body,
        http::{HeaderValue, Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
    };
    use chrono::Utc;
    use tower::ServiceExt;

    async fn whoami(MaybeUser(user): MaybeUser) -> String {
        user.map(|u| u.username).unwrap_or_else(|| "anonymous".to_string())
    }

    fn app(codec: Arc<TokenCodec>) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .route("/health", get(whoami))
            .layer(middleware::from_fn_with_state(codec, authenticate_request))
    }

    async fn call(app: Router, path: &str, auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = HttpRequest::builder().uri(path);
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_missing_header_passes_unauthenticated() {
        let (status, body) = call(app(Arc::new(codec())), "/whoami", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");
    }

    #[tokio::test]
    async fn test_non_bearer_scheme_passes_unauthenticated() {
        let (status, body) =
            call(app(Arc::new(codec())), "/whoami", Some("Basic Zm9vOmJhcg==")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");
    }

    #[tokio::test]
    async fn test_valid_token_attaches_identity() {
        let codec = Arc::new(codec());
        let token = codec.create_access_token("field-agent", Utc::now()).unwrap();

        let (status, body) = call(app(codec), "/whoami", Some(&format!("Bearer {}", token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "field-agent");
    }

    #[tokio::test]
    async fn test_empty_bearer_rejected() {
        for header in ["Bearer    ", "Bearer"] {
            let (status, body) = call(app(Arc::new(codec())), "/whoami", Some(header)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert!(body.contains("Missing bearer token."));
        }
    }

    #[test]
    fn test_bare_bearer_scheme_is_empty_token() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer"));
        assert_eq!(bearer_token(&headers).unwrap(), Some(String::new()));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearerish abc"));
        assert_eq!(bearer_token(&headers).unwrap(), None);
    }

    #[tokio::test]
    async fn test_non_utf8_bearer_rejected() {
        let request = HttpRequest::builder()
            .uri("/whoami")
            .header(
                AUTHORIZATION,
                HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap(),
            )
            .body(Body::empty())
            .unwrap();

        let response = app(Arc::new(codec())).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("Invalid access token."));
    }

    #[tokio::test]
    async fn test_invalid_bearer_rejected() {
        let codec = Arc::new(codec());
        let refresh = codec
            .create_refresh_token("field-agent", "rid", Utc::now())
            .unwrap();

        for token in ["garbage", refresh.as_str()] {
            let (status, body) =
                call(app(codec.clone()), "/whoami", Some(&format!("Bearer {}", token))).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert!(body.contains("Invalid access token."));
        }
    }

    #[tokio::test]
    async fn test_exempt_path_ignores_bad_token() {
        let (status, _) = call(app(Arc::new(codec())), "/health", Some("Bearer garbage")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn test_attach_identity_keeps_existing() {
        let mut extensions = Extensions::new();
        attach_identity(&mut extensions, AuthenticatedUser::api_user("first"));
        attach_identity(&mut extensions, AuthenticatedUser::api_user("second"));

        let user = current_user(&extensions).unwrap();
        assert_eq!(user.username, "first");
        assert_eq!(user.role, Role::ApiUser);
    }
}
