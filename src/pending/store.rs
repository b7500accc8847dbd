//! Pending artifact store
//!
//! Expiry is decided at fetch time against the artifact's own deadline. The
//! KV entry outlives that deadline by a retention window so the first fetch
//! after it can report `Expired` (and delete the entry) instead of a bare
//! `NotFound`.

use chrono::Duration as ChronoDuration;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::PendingArtifact;
use crate::clock::SharedClock;
use crate::kv::{codec, keys, SharedKv};
use crate::types::{Result, VestibuleError};

/// How long an expired artifact stays around to be reported as expired
pub const DEFAULT_PENDING_RETENTION_SECS: u64 = 3600;

/// Longest deadline a producer may set
pub const MAX_PENDING_TTL_SECS: u64 = 86_400;

#[derive(Clone)]
pub struct PendingArtifactStore {
    kv: SharedKv,
    clock: SharedClock,
    retention: Duration,
}

impl PendingArtifactStore {
    pub fn new(kv: SharedKv, clock: SharedClock, retention: Duration) -> Self {
        Self {
            kv,
            clock,
            retention,
        }
    }

    pub fn with_default_retention(kv: SharedKv, clock: SharedClock) -> Self {
        Self::new(kv, clock, Duration::from_secs(DEFAULT_PENDING_RETENTION_SECS))
    }

    /// Stage an artifact for `owner_key`, replacing any previous one
    pub async fn put(
        &self,
        owner_key: &str,
        script_id: &str,
        payload: Value,
        ttl_seconds: u64,
    ) -> Result<PendingArtifact> {
        let owner_key = owner_key.trim();
        let script_id = script_id.trim();
        if owner_key.is_empty() || script_id.is_empty() {
            return Err(VestibuleError::Validation(
                "Owner and script id are required".into(),
            ));
        }
        if ttl_seconds == 0 || ttl_seconds > MAX_PENDING_TTL_SECS {
            return Err(VestibuleError::Validation(format!(
                "ttlSeconds must be between 1 and {}",
                MAX_PENDING_TTL_SECS
            )));
        }

        let artifact = PendingArtifact {
            script_id: script_id.to_string(),
            owner_key: owner_key.to_string(),
            payload,
            expires_at: self.clock.now() + ChronoDuration::seconds(ttl_seconds as i64),
        };

        let ttl = Duration::from_secs(ttl_seconds) + self.retention;
        codec::set_json(self.kv.as_ref(), &keys::pending(owner_key), &artifact, Some(ttl)).await?;

        debug!(script_id = %artifact.script_id, ttl_secs = ttl_seconds, "Staged pending artifact");
        Ok(artifact)
    }

    /// Payload of the owner's artifact if it matches `script_id` and is
    /// still before its deadline.
    ///
    /// An expired artifact is deleted by the fetch that notices it, so the
    /// next fetch reports `NotFound`.
    pub async fn fetch(&self, owner_key: &str, script_id: &str) -> Result<Value> {
        if owner_key.trim().is_empty() || script_id.trim().is_empty() {
            return Err(VestibuleError::Validation(
                "Owner and script id are required".into(),
            ));
        }

        let key = keys::pending(owner_key.trim());
        let artifact: PendingArtifact = codec::get_json(self.kv.as_ref(), &key)
            .await?
            .ok_or_else(|| VestibuleError::NotFound("No pending artifact".into()))?;

        if artifact.is_expired(self.clock.now()) {
            self.kv.del(&key).await?;
            info!(script_id = %artifact.script_id, "Pending artifact expired, removed");
            return Err(VestibuleError::Expired("Pending artifact has expired".into()));
        }

        if artifact.script_id != script_id.trim() {
            warn!(
                stored = %artifact.script_id,
                requested = %script_id,
                "Pending artifact fetch for a superseded script"
            );
            return Err(VestibuleError::Mismatch(
                "Pending artifact belongs to a different script".into(),
            ));
        }

        Ok(artifact.payload)
    }

    /// Drop the owner's artifact
    pub async fn remove(&self, owner_key: &str) -> Result<bool> {
        self.kv.del(&keys::pending(owner_key.trim())).await
    }

    /// Delete artifacts past their deadline plus retention, and entries that
    /// no longer decode. Backstop for backends whose expiry is lazy.
    pub async fn sweep(&self) -> Result<usize> {
        let now = self.clock.now();
        let retention = ChronoDuration::seconds(self.retention.as_secs() as i64);
        let mut removed = 0;

        for key in self.kv.keys(keys::PENDING_PREFIX).await? {
            let stale = match codec::get_json::<PendingArtifact>(self.kv.as_ref(), &key).await {
                Ok(Some(artifact)) => now >= artifact.expires_at + retention,
                Ok(None) => false,
                Err(e) => {
                    warn!(key = %key, error = %e, "Removing undecodable pending artifact");
                    true
                }
            };
            if stale && self.kv.del(&key).await? {
                removed += 1;
            }
        }

        Ok(removed)
    }
}

/// Spawn a background task to periodically sweep pending artifacts
pub fn spawn_sweep_task(store: Arc<PendingArtifactStore>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match store.sweep().await {
                Ok(removed) => debug!(removed = removed, "Pending artifact sweep completed"),
                Err(e) => warn!(error = %e, "Pending artifact sweep failed"),
            }
        }
    });

    info!("Pending artifact sweep task started");
}
