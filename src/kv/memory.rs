//! In-memory KV backend
//!
//! `DashMap` storage with per-entry expiry, lazy eviction on read, and a
//! periodic cleanup task. Per-key atomicity comes from DashMap's shard locks;
//! `set_nx` uses the entry API so check-and-insert happens under one lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::KvStore;
use crate::clock::{system_clock, SharedClock};
use crate::types::{Result, VestibuleError};

/// A stored value with optional expiry
#[derive(Debug, Clone)]
struct KvEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl KvEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

/// Store statistics
#[derive(Debug, Clone, Default)]
pub struct KvStats {
    pub entries: usize,
    pub expiring: usize,
}

/// In-memory key-value store
pub struct MemoryKvStore {
    entries: DashMap<String, KvEntry>,
    clock: SharedClock,
}

impl MemoryKvStore {
    /// Create a store on the wall clock
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create a store reading time from `clock`
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    fn deadline(&self, ttl: Option<Duration>) -> Result<Option<DateTime<Utc>>> {
        match ttl {
            None => Ok(None),
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl)
                    .map_err(|e| VestibuleError::Internal(format!("TTL out of range: {}", e)))?;
                self.clock
                    .now()
                    .checked_add_signed(ttl)
                    .map(Some)
                    .ok_or_else(|| VestibuleError::Internal("TTL overflows clock".into()))
            }
        }
    }

    /// Remove expired entries
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            debug!(count = removed, "Cleaned up expired KV entries");
        }
        removed
    }

    /// Get store statistics
    pub fn stats(&self) -> KvStats {
        KvStats {
            entries: self.entries.len(),
            expiring: self
                .entries
                .iter()
                .filter(|entry| entry.expires_at.is_some())
                .count(),
        }
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.clone()));
            }
            // Release the shard lock before removing
            drop(entry);
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = self.deadline(ttl)?;
        self.entries.insert(
            key.to_string(),
            KvEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        let now = self.clock.now();
        let entry = KvEntry {
            value: value.to_string(),
            expires_at: self.deadline(ttl)?,
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(entry);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(true)
            }
        }
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, entry)| !entry.is_expired(now))
            .unwrap_or(false))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let now = self.clock.now();
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.is_expired(now))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn expires_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let now = self.clock.now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.expires_at))
    }
}

/// Spawn a background task to periodically cleanup expired entries
pub fn spawn_cleanup_task(store: Arc<MemoryKvStore>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let removed = store.cleanup();
            let stats = store.stats();
            debug!(
                removed = removed,
                entries = stats.entries,
                expiring = stats.expiring,
                "KV cleanup completed"
            );
        }
    });

    info!("KV cleanup task started");
}
