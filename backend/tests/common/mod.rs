//! Shared helpers for router-level tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use http_body_util::BodyExt;
use riceguard_backend::app::{AppState, build_router};
use riceguard_backend::config::{Config, InferenceConfig};
use riceguard_backend::errors::InferenceError;
use riceguard_backend::rate_limit::RateLimitConfig;
use riceguard_backend::services::inference_service::InferenceRunner;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

pub const USERNAME: &str = "field-agent";
pub const PASSWORD: &str = "Paddy-Field-2024!";
pub const BOUNDARY: &str = "riceguard-test-boundary";

pub fn test_config() -> Config {
    Config {
        api_username: USERNAME.to_string(),
        api_password: PASSWORD.to_string(),
        password_hash_cost: 4,
        jwt_secret: "integration-secret-that-is-long-enough-for-hs256".to_string(),
        jwt_issuer: "rice-disease-api".to_string(),
        access_token_ttl_seconds: 900,
        refresh_token_ttl_seconds: 604_800,
        rate_limit: RateLimitConfig {
            window_seconds: 60,
            max_requests: 100,
            trust_forwarded_for: false,
        },
        predict_allow_anonymous: false,
        cors_allowed_origins: vec!["http://localhost:5173".to_string()],
        inference: InferenceConfig::default(),
        server_port: 0,
    }
}

/// Inference runner that answers without spawning anything.
pub struct StubRunner {
    pub fail: bool,
}

#[async_trait]
impl InferenceRunner for StubRunner {
    async fn run_inference(
        &self,
        _image_path: &Path,
        top_k: u32,
    ) -> Result<Value, InferenceError> {
        if self.fail {
            return Err(InferenceError::NonZeroExit {
                code: Some(1),
                output: "model weights not found".to_string(),
            });
        }
        Ok(json!({
            "predictions": [
                { "label": "Brown Spot", "confidence": 0.91 },
                { "label": "Healthy", "confidence": 0.06 }
            ],
            "topK": top_k
        }))
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub fn new(config: Config) -> Self {
        Self::with_runner(config, StubRunner { fail: false })
    }

    pub fn with_runner(config: Config, runner: StubRunner) -> Self {
        let state = AppState::with_inference(&config, Arc::new(runner)).unwrap();
        let router = build_router(state.clone(), &config);
        Self { state, router }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Response<Body>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        (response.status(), response)
    }

    pub async fn post_json(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, response) = self.send(request).await;
        (status, body_json(response).await)
    }

    pub async fn login(&self) -> Value {
        let (status, body) = self
            .post_json(
                "/auth/login",
                json!({ "username": USERNAME, "password": PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}

/// Builds a multipart/form-data body with a single `file` field.
pub fn multipart_body(file_name: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn predict_request(path: &str, bearer: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body)).unwrap()
}
