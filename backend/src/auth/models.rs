//! Data structures for authentication requests, responses and identities.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError};

/// Login request payload
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(custom(function = "not_blank"))]
    pub username: String,

    #[serde(default)]
    #[validate(custom(function = "not_blank"))]
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    #[serde(default)]
    #[validate(custom(function = "not_blank"))]
    pub refresh_token: String,
}

/// Access/refresh pair returned by login and refresh
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub token_type: String,
    pub access_token: String,
    pub expires_in_seconds: u64,
    pub refresh_token: String,
    pub refresh_expires_in_seconds: u64,
}

impl TokenPair {
    pub const BEARER: &'static str = "Bearer";
}

/// Coarse-grained role granted to every authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    #[serde(rename = "ROLE_API_USER")]
    ApiUser,
}

/// Identity attached to a request by the bearer-token middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub username: String,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn api_user(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: Role::ApiUser,
        }
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("not_blank").with_message(Cow::from("must not be blank")));
    }
    Ok(())
}
