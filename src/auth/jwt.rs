//! Bearer token verification
//!
//! Accounts are managed elsewhere; a caller is authenticated here only by an
//! HS256 token whose `sub` claim is its account id. Minting is kept for dev
//! tooling and tests.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::types::VestibuleError;

/// Shortest accepted signing secret, in bytes
pub const MIN_SECRET_LEN: usize = 32;

const DEV_SECRET: &str = "vestibule-dev-secret-never-use-in-production";

/// Claims read from an account token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: String,
    /// Login name, for logs only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Why a presented token did not authenticate its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenRejection {
    #[error("token expired")]
    Expired,
    #[error("bad signature")]
    BadSignature,
    #[error("malformed token")]
    Malformed,
    #[error("token names no account")]
    NoSubject,
}

/// Verifies (and in dev, mints) account tokens
#[derive(Clone)]
pub struct JwtValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Validator for a configured secret
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, VestibuleError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(VestibuleError::Config(format!(
                "JWT_SECRET must be at least {} characters",
                MIN_SECRET_LEN
            )));
        }
        Ok(Self::from_secret(secret.as_bytes(), expiry_seconds))
    }

    /// Validator on a fixed, public secret. Dev mode only.
    pub fn new_dev() -> Self {
        Self::from_secret(DEV_SECRET.as_bytes(), 3600)
    }

    fn from_secret(secret: &[u8], expiry_seconds: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            expiry_seconds,
        }
    }

    /// Mint a token for `auth_id`
    pub fn generate_token(
        &self,
        auth_id: &str,
        identifier: Option<String>,
    ) -> Result<String, VestibuleError> {
        let iat = Utc::now().timestamp();
        let claims = Claims {
            sub: auth_id.to_string(),
            identifier,
            iat,
            exp: iat.saturating_add(self.expiry_seconds as i64),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Check signature, expiry and subject
    pub fn verify_token(&self, token: &str) -> Result<Claims, TokenRejection> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenRejection::Expired,
                ErrorKind::InvalidSignature => TokenRejection::BadSignature,
                _ => TokenRejection::Malformed,
            })?;
        if data.claims.sub.trim().is_empty() {
            return Err(TokenRejection::NoSubject);
        }
        Ok(data.claims)
    }
}

/// Token carried by an `Authorization` value: `Bearer <token>`, or a bare
/// token as stored in the token cookie
pub fn bearer_token(authorization: Option<&str>) -> Option<&str> {
    let value = authorization?.trim_start();
    let token = match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        Some(_) => return None,
        None => value,
    };
    (!token.is_empty()).then_some(token)
}
