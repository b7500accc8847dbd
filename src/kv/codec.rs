//! Serialization boundary for stored payloads
//!
//! Every record is written as canonical JSON text and read back through one
//! typed parser, so no call site branches on the shape of what the store
//! returned.

use serde::{de::DeserializeOwned, Serialize};

use super::KvStore;
use crate::types::{Result, VestibuleError};
use std::time::Duration;

/// Encode a value to its stored text form
pub fn encode<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| VestibuleError::Internal(format!("Failed to encode record: {}", e)))
}

/// Decode a stored text value, naming the key in the error
pub fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| VestibuleError::Internal(format!("Corrupt record at {}: {}", key, e)))
}

/// Typed read
pub async fn get_json<T: DeserializeOwned>(kv: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match kv.get(key).await? {
        Some(raw) => decode(key, &raw).map(Some),
        None => Ok(None),
    }
}

/// Typed write
pub async fn set_json<T: Serialize>(
    kv: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<()> {
    let raw = encode(value)?;
    kv.set(key, &raw, ttl).await
}
