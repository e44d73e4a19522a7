//! Key material and password hashing helpers.
//!
//! ## Signing key derivation
//!
//! The configured secret is first tried as standard base64. If it decodes to
//! at least [`MIN_SIGNING_KEY_BYTES`] bytes, the decoded bytes are the HMAC
//! key. Otherwise the raw UTF-8 bytes of the secret are used as-is.
//!
//! This means two different-looking secrets can produce the same key: the
//! base64 text `"QUJD..."` and the plain text it decodes to are equivalent.
//! Deployments relying on one interpretation must not switch secrets between
//! the two forms expecting a key change.

use base64::{Engine as _, engine::general_purpose};
use bcrypt::verify;

use crate::errors::{ServiceError, ServiceResult};

/// HS256 keys shorter than this are refused.
pub const MIN_SIGNING_KEY_BYTES: usize = 32;

/// Resolves the HMAC key bytes for a configured secret.
pub fn derive_signing_key(secret: &str) -> ServiceResult<Vec<u8>> {
    if secret.trim().is_empty() {
        return Err(ServiceError::configuration("JWT secret must not be blank."));
    }

    match general_purpose::STANDARD.decode(secret) {
        Ok(decoded) if decoded.len() >= MIN_SIGNING_KEY_BYTES => Ok(decoded),
        _ => Ok(secret.as_bytes().to_vec()),
    }
}

/// Hashes the configured API password once at startup.
pub fn hash_password(password: &str, cost: u32) -> ServiceResult<String> {
    bcrypt::hash(password, cost)
        .map_err(|e| ServiceError::configuration(format!("Password hashing failed: {}", e)))
}

/// Checks a candidate password against a bcrypt hash.
///
/// A malformed hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    verify(password, hash).unwrap_or(false)
}
