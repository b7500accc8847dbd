//! Key-value storage layer
//!
//! All identity state lives behind [`KvStore`]: a shared backend with per-key
//! atomic operations and optional expiry, and no cross-key transactions.
//! Invariants spanning several keys are enforced by the components on top
//! (see [`crate::registry`]).
//!
//! Two backends are provided:
//! - [`MemoryKvStore`]: in-process `DashMap`, for development and tests
//! - [`MongoKvStore`]: a MongoDB collection shared by every instance

pub mod codec;
pub mod keys;
pub mod memory;
pub mod mongo;

pub use codec::{decode, encode};
pub use memory::{spawn_cleanup_task, KvStats, MemoryKvStore};
pub use mongo::MongoKvStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::types::Result;

/// Atomic single-key operations with optional per-key expiry.
///
/// Values are canonical text; typed access goes through [`codec`].
/// Expired keys behave exactly like missing keys for every operation.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a live value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one. `ttl = None` never expires.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Write only if no live value exists. Returns whether the write happened.
    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool>;

    /// Delete a key. Returns whether a live value was removed.
    async fn del(&self, key: &str) -> Result<bool>;

    /// List live keys starting with `prefix`
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Expiry of a live key; `None` if missing or without expiry
    async fn expires_at(&self, key: &str) -> Result<Option<DateTime<Utc>>>;
}

/// Shared store handle used by every component
pub type SharedKv = Arc<dyn KvStore>;
