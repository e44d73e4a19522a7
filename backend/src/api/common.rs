//! Error handling utilities for API responses.
//!
//! Every failure is returned as `{"detail": "<message>"}`. Authentication
//! messages are generic. Upstream and internal failures are logged and
//! never echo their cause to the client.
//!
//! # Error Handling Flow
//! 1. Extractors and services return a domain-specific `ServiceError`
//! 2. The `IntoResponse` impl picks the status code and body
//! 3. Validation errors report the first failing field only

use axum::{
    Json,
    extract::{FromRequest, Request},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, error};
use validator::{Validate, ValidationErrors};

use crate::errors::ServiceError;

pub const RATE_LIMIT_DETAIL: &str = "Rate limit exceeded. Please retry later.";
const UPSTREAM_DETAIL: &str = "Prediction failed. Please try again later.";
const INTERNAL_DETAIL: &str = "Internal server error.";
const INVALID_PAYLOAD: &str = "Invalid request payload.";

/// Body of every error response
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub detail: String,
}

impl ErrorBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// Maps a service error to its status code and client-facing message.
pub fn service_error_to_http(error: &ServiceError) -> (StatusCode, String) {
    match error {
        ServiceError::Validation { message } => (StatusCode::BAD_REQUEST, message.clone()),
        ServiceError::InvalidCredentials { message } | ServiceError::Unauthenticated { message } => {
            (StatusCode::UNAUTHORIZED, message.clone())
        }
        ServiceError::RateExceeded { .. } => {
            (StatusCode::TOO_MANY_REQUESTS, RATE_LIMIT_DETAIL.to_string())
        }
        ServiceError::Upstream { source } => {
            error!("Inference failure: {}", source);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                UPSTREAM_DETAIL.to_string(),
            )
        }
        ServiceError::Configuration { message } | ServiceError::InternalError { message } => {
            error!("Internal error: {}", message);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                INTERNAL_DETAIL.to_string(),
            )
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, detail) = service_error_to_http(&self);
        let mut response = (status, Json(ErrorBody::new(detail))).into_response();

        if let ServiceError::RateExceeded {
            retry_after_seconds,
        } = self
        {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_seconds));
        }

        response
    }
}

/// Picks the message of the first failing field, ordered by field name.
pub fn first_validation_message(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .first()
        .and_then(|(field, errors)| {
            errors.first().map(|error| {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{} {}", field, message)
            })
        })
        .unwrap_or_else(|| INVALID_PAYLOAD.to_string())
}

/// JSON body extractor that also runs `validator` checks.
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            debug!("Rejected JSON body: {}", rejection.body_text());
            ServiceError::validation(INVALID_PAYLOAD)
        })?;

        value
            .validate()
            .map_err(|errors| ServiceError::validation(first_validation_message(&errors)))?;

        Ok(ValidatedJson(value))
    }
}
