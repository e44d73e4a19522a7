//! Global application error types.
//!
//! This module defines the error taxonomy shared by the token codec, the
//! authentication service, the rate limiter and the prediction pipeline.
//! HTTP mapping lives in `api::common`.

use thiserror::Error;

/// Failures raised while decoding or checking a signed token.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Bad signature, wrong issuer, wrong kind, missing claims or expired.
    #[error("Invalid token")]
    InvalidToken,
    /// The signing step itself failed.
    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

/// Failures of the external inference process.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference timed out after {0} seconds")]
    Timeout(u64),
    #[error("Inference exited with status {code:?}: {output}")]
    NonZeroExit { code: Option<i32>, output: String },
    #[error("Inference output could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Inference IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Generic service error used across all request handling paths.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Wrong username/password or any refresh-token problem. The message
    /// never says which check failed.
    #[error("{message}")]
    InvalidCredentials { message: String },

    #[error("{message}")]
    Unauthenticated { message: String },

    #[error("Rate limit exceeded, retry after {retry_after_seconds}s")]
    RateExceeded { retry_after_seconds: u64 },

    #[error("Upstream failure: {source}")]
    Upstream {
        #[from]
        source: InferenceError,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    // Helper constructors for common patterns

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        Self::InvalidCredentials {
            message: message.into(),
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    pub fn rate_exceeded(retry_after_seconds: u64) -> Self {
        Self::RateExceeded {
            retry_after_seconds,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

impl From<TokenError> for ServiceError {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::InvalidToken => Self::invalid_credentials("Invalid refresh token."),
            TokenError::Encoding(message) => Self::internal_error(message),
        }
    }
}
