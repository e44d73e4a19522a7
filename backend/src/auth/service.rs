//! Core business logic for the authentication system.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::models::TokenPair;
use crate::auth::refresh_store::RefreshTokenStore;
use crate::config::Config;
use crate::errors::{ServiceError, ServiceResult};
use crate::utils::crypto::{hash_password, verify_password};
use crate::utils::jwt::TokenCodec;

const INVALID_CREDENTIALS: &str = "Invalid credentials.";
const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token.";
const REFRESH_EXPIRED_OR_REVOKED: &str = "Refresh token expired or revoked.";

/// The single statically configured API identity.
#[derive(Debug, Clone)]
pub struct Credentials {
    username: String,
    password_hash: String,
}

impl Credentials {
    /// Hashes `password` with bcrypt at the given cost.
    pub fn new(username: impl Into<String>, password: &str, cost: u32) -> ServiceResult<Self> {
        Ok(Self {
            username: username.into(),
            password_hash: hash_password(password, cost)?,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn matches(&self, username: &str, password: &str) -> bool {
        // always run the hash check so a wrong username costs the same
        let password_ok = verify_password(password, &self.password_hash);
        self.username == username && password_ok
    }
}

/// Authentication service for handling login and refresh-token rotation
pub struct AuthService {
    credentials: Credentials,
    codec: Arc<TokenCodec>,
    refresh_store: Arc<RefreshTokenStore>,
}

impl AuthService {
    pub fn new(
        credentials: Credentials,
        codec: Arc<TokenCodec>,
        refresh_store: Arc<RefreshTokenStore>,
    ) -> Self {
        AuthService {
            credentials,
            codec,
            refresh_store,
        }
    }

    /// Builds the service from configuration, hashing the configured password.
    pub fn from_config(config: &Config, codec: Arc<TokenCodec>) -> ServiceResult<Self> {
        let credentials = Credentials::new(
            config.api_username.clone(),
            &config.api_password,
            config.password_hash_cost,
        )?;
        Ok(Self::new(
            credentials,
            codec,
            Arc::new(RefreshTokenStore::new()),
        ))
    }

    pub fn refresh_store(&self) -> &RefreshTokenStore {
        &self.refresh_store
    }

    /// Authenticate the configured user and issue a fresh token pair
    pub fn login(&self, username: &str, password: &str) -> ServiceResult<TokenPair> {
        self.login_at(username, password, Utc::now())
    }

    pub fn login_at(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<TokenPair> {
        if !self.credentials.matches(username, password) {
            warn!("Rejected login attempt");
            return Err(ServiceError::invalid_credentials(INVALID_CREDENTIALS));
        }

        let pair = self.issue_tokens(self.credentials.username(), now)?;
        info!(user = %self.credentials.username(), "Login succeeded");
        Ok(pair)
    }

    /// Redeem a refresh token and rotate it for a new pair
    pub fn refresh(&self, refresh_token: &str) -> ServiceResult<TokenPair> {
        self.refresh_at(refresh_token, Utc::now())
    }

    pub fn refresh_at(&self, refresh_token: &str, now: DateTime<Utc>) -> ServiceResult<TokenPair> {
        let claims = self
            .codec
            .verify_refresh_token(refresh_token)
            .map_err(|_| ServiceError::invalid_credentials(INVALID_REFRESH_TOKEN))?;

        if !self
            .refresh_store
            .consume(&claims.refresh_id, &claims.subject, now)
        {
            warn!(user = %claims.subject, "Refresh token expired, revoked or replayed");
            return Err(ServiceError::invalid_credentials(REFRESH_EXPIRED_OR_REVOKED));
        }

        self.issue_tokens(&claims.subject, now)
    }

    fn issue_tokens(&self, subject: &str, now: DateTime<Utc>) -> ServiceResult<TokenPair> {
        let refresh_id = Uuid::new_v4().to_string();
        let access_token = self.codec.create_access_token(subject, now)?;
        let refresh_token = self.codec.create_refresh_token(subject, &refresh_id, now)?;

        // both tokens exist before the record goes in, so a stored id is
        // always one that was handed out
        self.refresh_store
            .save(&refresh_id, subject, self.codec.refresh_expiry(now));

        Ok(TokenPair {
            token_type: TokenPair::BEARER.to_string(),
            access_token,
            expires_in_seconds: self.codec.access_ttl_seconds(),
            refresh_token,
            refresh_expires_in_seconds: self.codec.refresh_ttl_seconds(),
        })
    }
}
