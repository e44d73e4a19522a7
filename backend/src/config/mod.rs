//! Central module for application-wide configuration settings.
//!
//! Configuration is read once from the environment (optionally seeded from a
//! `.env` file) and validated before the server binds. Insecure defaults for
//! the API user or the signing secret abort startup.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{ServiceError, ServiceResult};
use crate::rate_limit::RateLimitConfig;
use crate::utils::crypto::{MIN_SIGNING_KEY_BYTES, derive_signing_key};

const BANNED_USERNAMES: &[&str] = &["admin", "root", "riceguard"];
const BANNED_PASSWORDS: &[&str] = &[
    "password",
    "changeme",
    "changeit",
    "changeThisPassword123!",
    "ChangeThisPassword123!",
];
const BANNED_JWT_SECRETS: &[&str] = &[
    "ReplaceWithYourOwnLongJwtSecretAtLeast32Chars",
    "secret",
    "changeme",
    "changeit",
];
const MIN_PASSWORD_LENGTH: usize = 12;

/// Settings for the external inference process.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub python_command: String,
    pub module: String,
    pub top_k: u32,
    pub project_root: PathBuf,
    pub timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            python_command: "python".to_string(),
            module: "model.predict_cli".to_string(),
            top_k: 3,
            project_root: PathBuf::from("."),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_username: String,
    pub api_password: String,
    pub password_hash_cost: u32,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub access_token_ttl_seconds: u64,
    pub refresh_token_ttl_seconds: u64,
    pub rate_limit: RateLimitConfig,
    pub predict_allow_anonymous: bool,
    pub cors_allowed_origins: Vec<String>,
    pub inference: InferenceConfig,
    pub server_port: u16,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_username = env::var("APP_API_USERNAME").context("APP_API_USERNAME not set")?;
        let api_password = env::var("APP_API_PASSWORD").context("APP_API_PASSWORD not set")?;
        let jwt_secret =
            env::var("APP_SECURITY_JWT_SECRET").context("APP_SECURITY_JWT_SECRET not set")?;

        let jwt_issuer =
            env::var("APP_JWT_ISSUER").unwrap_or_else(|_| "rice-disease-api".to_string());

        let window_seconds: u64 = env_or("APP_RATE_LIMIT_WINDOW_SECONDS", 60)?;
        let max_requests: u32 = env_or("APP_RATE_LIMIT_MAX_REQUESTS", 60)?;
        if window_seconds == 0 || max_requests == 0 {
            anyhow::bail!("rate limit window and max requests must be at least 1");
        }

        let top_k: u32 = env_or("APP_INFERENCE_TOP_K", 3)?;
        if top_k == 0 {
            anyhow::bail!("APP_INFERENCE_TOP_K must be at least 1");
        }

        let inference = InferenceConfig {
            python_command: env::var("APP_INFERENCE_PYTHON")
                .unwrap_or_else(|_| "python".to_string()),
            module: env::var("APP_INFERENCE_MODULE")
                .unwrap_or_else(|_| "model.predict_cli".to_string()),
            top_k,
            project_root: env::var("APP_INFERENCE_PROJECT_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            timeout: Duration::from_secs(env_or("APP_INFERENCE_TIMEOUT_SECONDS", 120)?),
        };

        let cors_allowed_origins = parse_origins(
            &env::var("APP_CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:5173,http://127.0.0.1:5173".to_string()),
        );

        Ok(Config {
            api_username,
            api_password,
            password_hash_cost: env_or("APP_PASSWORD_HASH_COST", bcrypt::DEFAULT_COST)?,
            jwt_secret,
            jwt_issuer,
            access_token_ttl_seconds: require_positive(
                "APP_ACCESS_TOKEN_TTL_SECONDS",
                env_or("APP_ACCESS_TOKEN_TTL_SECONDS", 900)?,
            )?,
            refresh_token_ttl_seconds: require_positive(
                "APP_REFRESH_TOKEN_TTL_SECONDS",
                env_or("APP_REFRESH_TOKEN_TTL_SECONDS", 604_800)?,
            )?,
            rate_limit: RateLimitConfig {
                window_seconds,
                max_requests,
                trust_forwarded_for: parse_bool(
                    &env::var("APP_TRUST_X_FORWARDED_FOR").unwrap_or_default(),
                ),
            },
            predict_allow_anonymous: parse_bool(
                &env::var("APP_PREDICT_ALLOW_ANONYMOUS").unwrap_or_default(),
            ),
            cors_allowed_origins,
            inference,
            server_port: env_or("SERVER_PORT", 8080)?,
        })
    }

    /// Refuses well-known default credentials and weak signing secrets.
    pub fn validate_security(&self) -> ServiceResult<()> {
        let username = self.api_username.trim();
        if username.is_empty() {
            return Err(ServiceError::configuration("APP_API_USERNAME must not be blank."));
        }
        if BANNED_USERNAMES.contains(&username.to_lowercase().as_str()) {
            return Err(ServiceError::configuration(
                "APP_API_USERNAME uses an insecure default/common value.",
            ));
        }

        if BANNED_PASSWORDS.contains(&self.api_password.trim()) {
            return Err(ServiceError::configuration(
                "APP_API_PASSWORD uses an insecure default/common value.",
            ));
        }
        if !is_strong_password(&self.api_password) {
            return Err(ServiceError::configuration(format!(
                "APP_API_PASSWORD must be at least {} characters and include uppercase, lowercase, digit, and symbol.",
                MIN_PASSWORD_LENGTH
            )));
        }

        if BANNED_JWT_SECRETS.contains(&self.jwt_secret.trim()) {
            return Err(ServiceError::configuration(
                "APP_SECURITY_JWT_SECRET uses an insecure default/common value.",
            ));
        }
        let key = derive_signing_key(&self.jwt_secret)?;
        if key.len() < MIN_SIGNING_KEY_BYTES {
            return Err(ServiceError::configuration(format!(
                "APP_SECURITY_JWT_SECRET must provide at least {} bytes of key material.",
                MIN_SIGNING_KEY_BYTES
            )));
        }

        Ok(())
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} must be a valid number", key)),
        Err(_) => Ok(default),
    }
}

fn require_positive(key: &str, value: u64) -> Result<u64> {
    if value == 0 {
        anyhow::bail!("{} must be at least 1", key);
    }
    Ok(value)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}

fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LENGTH
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_ascii_alphanumeric())
}
