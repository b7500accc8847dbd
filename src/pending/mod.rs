//! Pending artifacts
//!
//! A single-slot staging area per owner for an asynchronously produced
//! artifact with an explicit deadline. See [`PendingArtifactStore`].

pub mod store;

pub use store::{
    spawn_sweep_task, PendingArtifactStore, DEFAULT_PENDING_RETENTION_SECS, MAX_PENDING_TTL_SECS,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stored at `pending:<ownerKey>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingArtifact {
    pub script_id: String,
    pub owner_key: String,
    pub payload: Value,
    pub expires_at: DateTime<Utc>,
}

impl PendingArtifact {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
