//! Configuration for vestibule
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::JwtValidator;
use crate::types::{Result, VestibuleError};

/// Key-value backend holding all identity state
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KvBackend {
    /// In-process map, lost on restart
    Memory,
    /// MongoDB collection shared by every instance
    Mongodb,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Vestibule - guest sessions and identity resolution
#[derive(Parser, Debug, Clone)]
#[command(name = "vestibule")]
#[command(about = "Guest session and identity resolution service")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (built-in JWT secret allowed)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Key-value backend
    #[arg(long, env = "KV_BACKEND", value_enum, default_value = "memory")]
    pub kv_backend: KvBackend,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "vestibule")]
    pub mongodb_db: String,

    /// MongoDB collection holding the key-value documents
    #[arg(long, env = "MONGODB_COLLECTION", default_value = "kv")]
    pub mongodb_collection: String,

    /// JWT secret for token verification (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Guest session sliding window in seconds
    #[arg(long, env = "SESSION_TTL_SECS", default_value = "180")]
    pub session_ttl_secs: u64,

    /// Name of the guest session cookie
    #[arg(long, env = "SESSION_COOKIE", default_value = "sid")]
    pub session_cookie: String,

    /// Mark the session cookie Secure
    #[arg(long, env = "COOKIE_SECURE", default_value = "false")]
    pub cookie_secure: bool,

    /// How long an expired pending artifact is kept to report its expiry
    #[arg(long, env = "PENDING_RETENTION_SECS", default_value = "3600")]
    pub pending_retention_secs: u64,

    /// Interval between background sweeps, in seconds
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "60")]
    pub sweep_interval_secs: u64,

    /// Maximum accepted request body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "10240")]
    pub max_body_bytes: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

impl Args {
    /// Defaults for tests and embedding, without reading the environment
    pub fn dev() -> Self {
        Self {
            node_id: Uuid::new_v4(),
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            dev_mode: true,
            kv_backend: KvBackend::Memory,
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            mongodb_db: "vestibule".to_string(),
            mongodb_collection: "kv".to_string(),
            jwt_secret: None,
            jwt_expiry_seconds: 3600,
            session_ttl_secs: 180,
            session_cookie: "sid".to_string(),
            cookie_secure: false,
            pending_retention_secs: 3600,
            sweep_interval_secs: 60,
            max_body_bytes: 10240,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn pending_retention(&self) -> Duration {
        Duration::from_secs(self.pending_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Build the token validator (uses a built-in secret in dev mode)
    pub fn jwt_validator(&self) -> Result<JwtValidator> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => JwtValidator::new(secret.clone(), self.jwt_expiry_seconds),
            (None, true) => Ok(JwtValidator::new_dev()),
            (None, false) => Err(VestibuleError::Config(
                "JWT_SECRET is required in production mode".into(),
            )),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err(VestibuleError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }
        if self.session_ttl_secs == 0 {
            return Err(VestibuleError::Config("SESSION_TTL_SECS must be positive".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(VestibuleError::Config("SWEEP_INTERVAL_SECS must be positive".into()));
        }
        if self.session_cookie.is_empty()
            || !self
                .session_cookie
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(VestibuleError::Config(
                "SESSION_COOKIE must be a non-empty token".into(),
            ));
        }
        if self.kv_backend == KvBackend::Mongodb && self.mongodb_uri.is_empty() {
            return Err(VestibuleError::Config(
                "MONGODB_URI is required for the mongodb backend".into(),
            ));
        }
        Ok(())
    }
}
