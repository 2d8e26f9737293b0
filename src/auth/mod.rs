use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::SecurityConfig;

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Platform user id
    pub sub: String,
    pub name: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(sub: impl Into<String>, name: impl Into<String>, role: impl Into<String>, expiry_hours: u64) -> Self {
        let issued = Utc::now();
        Self {
            sub: sub.into(),
            name: name.into(),
            role: role.into(),
            exp: (issued + Duration::hours(expiry_hours as i64)).timestamp(),
            iat: issued.timestamp(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("token signing is not configured")]
    MissingSecret,
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Sign `claims` with the gateway secret. Used by tests and by operators minting admin tokens.
pub fn generate_jwt(claims: &Claims, security: &SecurityConfig) -> Result<String, JwtError> {
    if security.jwt_secret.is_empty() {
        return Err(JwtError::MissingSecret);
    }
    let key = EncodingKey::from_secret(security.jwt_secret.as_bytes());
    Ok(encode(&Header::default(), claims, &key)?)
}

/// Credential version of a presented token. A new token, even for the same
/// user, yields a new version and so a new workbench session.
pub fn credential_version(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}
