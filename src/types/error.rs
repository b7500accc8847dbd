//! Error types for vestibule
//!
//! Every domain failure carries a kind (mapped to an HTTP status and a stable
//! code) plus a human-readable message, so clients can tell "try another
//! name" apart from "session expired, re-init" and "not your artifact".

use hyper::StatusCode;
use serde::Serialize;

/// Main error type for vestibule operations
#[derive(Debug, thiserror::Error)]
pub enum VestibuleError {
    /// Malformed or missing input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or invalid credentials
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Uniqueness or merge conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Caller-supplied identifier does not match stored state
    #[error("Mismatch: {0}")]
    Mismatch(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Entry existed but its expiry has passed
    #[error("Expired: {0}")]
    Expired(String),

    /// Unexpected store or runtime failure
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl VestibuleError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Mismatch(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Expired(_) => StatusCode::GONE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Auth(_) => "AUTH_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Mismatch(_) => "MISMATCH",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Expired(_) => "EXPIRED",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// The message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(m)
            | Self::Auth(m)
            | Self::Conflict(m)
            | Self::Mismatch(m)
            | Self::NotFound(m)
            | Self::Expired(m)
            | Self::Internal(m)
            | Self::Config(m) => m,
        }
    }

    /// JSON body sent to clients
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.message().to_string(),
            code: self.code(),
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = serde_json::to_string(&self.to_body()).unwrap_or_else(|_| "{}".to_string());
        (status, body)
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

// Implement From conversions for common error types

impl From<std::io::Error> for VestibuleError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for VestibuleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for VestibuleError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for VestibuleError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Internal(format!("Store error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for VestibuleError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Auth(format!("JWT error: {}", err))
    }
}

/// Result type alias for vestibule operations
pub type Result<T> = std::result::Result<T, VestibuleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(VestibuleError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(VestibuleError::Auth("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(VestibuleError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(VestibuleError::Mismatch("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(VestibuleError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(VestibuleError::Expired("x".into()).status_code(), StatusCode::GONE);
        assert_eq!(
            VestibuleError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_body_carries_kind_and_message() {
        let (status, body) = VestibuleError::Conflict("name taken".into()).into_status_code_and_body();
        assert_eq!(status, StatusCode::CONFLICT);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "name taken");
        assert_eq!(json["code"], "CONFLICT");
    }
}
