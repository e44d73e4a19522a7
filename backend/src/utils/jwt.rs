//! JWT token utilities for the access/refresh token pair.
//!
//! Both token kinds are HS256-signed and carry the issuer, subject, a `type`
//! claim and issued-at/expiry timestamps. Refresh tokens additionally carry a
//! `jti` naming the server-side refresh record.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::errors::{ServiceError, ServiceResult, TokenError};
use crate::utils::crypto::{MIN_SIGNING_KEY_BYTES, derive_signing_key};

/// Discriminates access tokens from refresh tokens.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims shared by both token kinds.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub jti: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Verified contents of a refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenClaims {
    pub subject: String,
    pub refresh_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Longest accepted token lifetime (ten years).
pub const MAX_TOKEN_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

fn ttl_duration(kind: &str, seconds: u64) -> ServiceResult<Duration> {
    if seconds == 0 || seconds > MAX_TOKEN_TTL_SECONDS {
        return Err(ServiceError::configuration(format!(
            "{} token TTL must be between 1 and {} seconds",
            kind, MAX_TOKEN_TTL_SECONDS
        )));
    }
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| ServiceError::configuration(format!("{} token TTL out of range", kind)))
}

/// Creates and verifies signed tokens.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(
        secret: &str,
        issuer: impl Into<String>,
        access_ttl_seconds: u64,
        refresh_ttl_seconds: u64,
    ) -> ServiceResult<Self> {
        let key = derive_signing_key(secret)?;
        if key.len() < MIN_SIGNING_KEY_BYTES {
            return Err(ServiceError::configuration(format!(
                "JWT signing key must be at least {} bytes",
                MIN_SIGNING_KEY_BYTES
            )));
        }
        let issuer = issuer.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Ok(TokenCodec {
            encoding_key: EncodingKey::from_secret(&key),
            decoding_key: DecodingKey::from_secret(&key),
            validation,
            issuer,
            access_ttl: ttl_duration("access", access_ttl_seconds)?,
            refresh_ttl: ttl_duration("refresh", refresh_ttl_seconds)?,
        })
    }

    pub fn from_config(config: &Config) -> ServiceResult<Self> {
        Self::new(
            &config.jwt_secret,
            config.jwt_issuer.clone(),
            config.access_token_ttl_seconds,
            config.refresh_token_ttl_seconds,
        )
    }

    pub fn access_ttl_seconds(&self) -> u64 {
        self.access_ttl.num_seconds() as u64
    }

    pub fn refresh_ttl_seconds(&self) -> u64 {
        self.refresh_ttl.num_seconds() as u64
    }

    pub fn refresh_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.refresh_ttl
    }

    pub fn create_access_token(
        &self,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        self.sign(Claims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            kind: TokenKind::Access,
            jti: None,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        })
    }

    pub fn create_refresh_token(
        &self,
        subject: &str,
        refresh_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        self.sign(Claims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            kind: TokenKind::Refresh,
            jti: Some(refresh_id.to_string()),
            iat: now.timestamp(),
            exp: self.refresh_expiry(now).timestamp(),
        })
    }

    /// Returns the subject of a valid, unexpired access token.
    ///
    /// Every failure collapses to `None`.
    pub fn verify_access_token(&self, token: &str) -> Option<String> {
        let claims = self.decode(token).ok()?;
        if claims.kind != TokenKind::Access || claims.sub.is_empty() {
            return None;
        }
        Some(claims.sub)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, TokenError> {
        let claims = self.decode(token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(TokenError::InvalidToken);
        }

        let refresh_id = claims
            .jti
            .filter(|id| !id.is_empty())
            .ok_or(TokenError::InvalidToken)?;
        if claims.sub.is_empty() {
            return Err(TokenError::InvalidToken);
        }
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or(TokenError::InvalidToken)?;

        Ok(RefreshTokenClaims {
            subject: claims.sub,
            refresh_id,
            expires_at,
        })
    }

    fn sign(&self, claims: Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|token_data| token_data.claims)
            .map_err(|e| {
                debug!("Token rejected: {}", e);
                TokenError::InvalidToken
            })
    }
}
