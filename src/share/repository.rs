//! Artifact storage at `artifact:<id>`

use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use super::{ArtifactRecord, FinalizedArtifact, IDENTIFIER_KEYS};
use crate::clock::SharedClock;
use crate::identity::Identity;
use crate::kv::{codec, keys, SharedKv};
use crate::types::{Result, VestibuleError};

/// Longest accepted artifact text, in characters
pub const MAX_TEXT_CHARS: usize = 4000;

/// Record fields that caller-supplied extras may not shadow
const RESERVED_KEYS: &[&str] = &[
    "id",
    "ownerKey",
    "sessionId",
    "authId",
    "displayName",
    "text",
    "finalized",
    "createdAt",
];

/// Fields a caller supplies for a new artifact
#[derive(Debug, Clone, Default)]
pub struct NewArtifact {
    pub display_name: Option<String>,
    pub text: String,
    pub finalized: Option<FinalizedArtifact>,
    pub extra: Map<String, Value>,
}

#[derive(Clone)]
pub struct ArtifactRepository {
    kv: SharedKv,
    clock: SharedClock,
}

impl ArtifactRepository {
    pub fn new(kv: SharedKv, clock: SharedClock) -> Self {
        Self { kv, clock }
    }

    pub async fn get(&self, id: &str) -> Result<Option<ArtifactRecord>> {
        if id.trim().is_empty() {
            return Ok(None);
        }
        codec::get_json(self.kv.as_ref(), &keys::artifact(id)).await
    }

    pub async fn put(&self, record: &ArtifactRecord) -> Result<()> {
        codec::set_json(self.kv.as_ref(), &keys::artifact(&record.id), record, None).await
    }

    /// Store a new artifact owned by the caller
    pub async fn create(&self, identity: &Identity, new: NewArtifact) -> Result<ArtifactRecord> {
        let owner_key = identity
            .owner_key_for_write()
            .ok_or_else(|| VestibuleError::Auth("No identity to own the artifact".into()))?;
        if new.text.trim().is_empty() {
            return Err(VestibuleError::Validation("Artifact text is required".into()));
        }
        if new.text.chars().count() > MAX_TEXT_CHARS {
            return Err(VestibuleError::Validation(format!(
                "Artifact text must be at most {} characters",
                MAX_TEXT_CHARS
            )));
        }

        let mut extra = new.extra;
        extra.retain(|key, _| {
            !RESERVED_KEYS.contains(&key.as_str()) && !IDENTIFIER_KEYS.contains(&key.as_str())
        });

        let record = ArtifactRecord {
            id: Uuid::new_v4().to_string(),
            owner_key,
            session_id: identity.session_id.clone(),
            auth_id: identity.auth_id.clone(),
            display_name: new.display_name.or_else(|| identity.profile_name.clone()),
            text: new.text,
            finalized: new.finalized,
            created_at: self.clock.now(),
            extra,
        };
        self.put(&record).await?;

        info!(artifact_id = %record.id, finalized = record.finalized.is_some(), "Stored artifact");
        Ok(record)
    }
}
