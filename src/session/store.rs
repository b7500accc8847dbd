//! Guest session store
//!
//! Payloads live at `session:<sessionId>` with a sliding TTL: every successful
//! write resets expiry to the full window measured from that write.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::is_session_id;
use crate::kv::{codec, keys, SharedKv};
use crate::types::{Result, VestibuleError};

/// Default sliding window for guest sessions
pub const DEFAULT_SESSION_TTL_SECS: u64 = 180;

/// A live guest session
#[derive(Debug, Clone, PartialEq)]
pub struct GuestSession {
    pub session_id: String,
    pub payload: Map<String, Value>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Reads and merge-writes guest session payloads
#[derive(Clone)]
pub struct GuestSessionStore {
    kv: SharedKv,
    ttl: Duration,
}

impl GuestSessionStore {
    pub fn new(kv: SharedKv, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    pub fn with_default_ttl(kv: SharedKv) -> Self {
        Self::new(kv, Duration::from_secs(DEFAULT_SESSION_TTL_SECS))
    }

    /// The sliding window applied on every write
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create an empty session. Only the resolver mints sessions.
    pub(crate) async fn create(&self, session_id: &str) -> Result<()> {
        let key = keys::session(session_id);
        codec::set_json(self.kv.as_ref(), &key, &Map::new(), Some(self.ttl)).await?;
        info!(ttl_secs = self.ttl.as_secs(), "Created guest session");
        Ok(())
    }

    /// Payload of a live session; `None` if missing, malformed, or expired
    pub async fn get(&self, session_id: &str) -> Result<Option<Map<String, Value>>> {
        if !is_session_id(session_id) {
            return Ok(None);
        }
        codec::get_json(self.kv.as_ref(), &keys::session(session_id)).await
    }

    /// Payload plus current expiry
    pub async fn get_session(&self, session_id: &str) -> Result<Option<GuestSession>> {
        let payload = match self.get(session_id).await? {
            Some(payload) => payload,
            None => return Ok(None),
        };
        let expires_at = self.kv.expires_at(&keys::session(session_id)).await?;

        Ok(Some(GuestSession {
            session_id: session_id.to_string(),
            payload,
            expires_at,
        }))
    }

    /// Whether a live session exists
    pub async fn exists(&self, session_id: &str) -> Result<bool> {
        Ok(self.get(session_id).await?.is_some())
    }

    /// Apply `patch` over the stored payload and write it back with a fresh TTL.
    ///
    /// Fails with `NotFound` when no live session exists; never creates one.
    pub async fn merge(&self, session_id: &str, patch: Map<String, Value>) -> Result<()> {
        let mut payload = self
            .get(session_id)
            .await?
            .ok_or_else(|| VestibuleError::NotFound("Session not found or expired".into()))?;

        let fields = patch.len();
        payload.extend(patch);

        let key = keys::session(session_id);
        codec::set_json(self.kv.as_ref(), &key, &payload, Some(self.ttl)).await?;

        debug!(fields = fields, ttl_secs = self.ttl.as_secs(), "Merged guest session payload");
        Ok(())
    }

    /// Delete a session explicitly
    pub async fn remove(&self, session_id: &str) -> Result<bool> {
        if !is_session_id(session_id) {
            return Ok(false);
        }
        self.kv.del(&keys::session(session_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::kv::MemoryKvStore;
    use crate::session::generate_session_id;
    use serde_json::json;
    use std::sync::Arc;

    fn store() -> (GuestSessionStore, Arc<ManualClock>) {
        let clock = ManualClock::at_epoch();
        let kv: SharedKv = Arc::new(MemoryKvStore::with_clock(clock.clone()));
        (GuestSessionStore::with_default_ttl(kv), clock)
    }

    fn patch(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_create_then_get_empty_payload() {
        let (sessions, _) = store();
        let sid = generate_session_id();

        sessions.create(&sid).await.unwrap();
        assert_eq!(sessions.get(&sid).await.unwrap(), Some(Map::new()));
    }

    #[tokio::test]
    async fn test_merge_overlays_fields() {
        let (sessions, _) = store();
        let sid = generate_session_id();
        sessions.create(&sid).await.unwrap();

        sessions.merge(&sid, patch(json!({"moment": "hi", "mood": 1}))).await.unwrap();
        sessions.merge(&sid, patch(json!({"moment": "again"}))).await.unwrap();

        let payload = sessions.get(&sid).await.unwrap().unwrap();
        assert_eq!(payload["moment"], "again");
        assert_eq!(payload["mood"], 1);
    }

    #[tokio::test]
    async fn test_merge_missing_session_is_not_found() {
        let (sessions, _) = store();

        let err = sessions
            .merge("sXYZ", patch(json!({"moment": "hi"})))
            .await
            .unwrap_err();
        assert!(matches!(err, VestibuleError::NotFound(_)));

        let err = sessions
            .merge(&generate_session_id(), patch(json!({"moment": "hi"})))
            .await
            .unwrap_err();
        assert!(matches!(err, VestibuleError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_merge_after_expiry_does_not_resurrect() {
        let (sessions, clock) = store();
        let sid = generate_session_id();
        sessions.create(&sid).await.unwrap();

        clock.advance_secs(181);
        assert!(sessions.merge(&sid, Map::new()).await.is_err());
        assert!(!sessions.exists(&sid).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove() {
        let (sessions, _) = store();
        let sid = generate_session_id();
        sessions.create(&sid).await.unwrap();

        assert!(sessions.remove(&sid).await.unwrap());
        assert!(sessions.get(&sid).await.unwrap().is_none());
    }
}
