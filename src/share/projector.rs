//! Public projection of artifacts
//!
//! Copies an explicit allow-list of fields. Nothing else on the source
//! record can reach a share response, and identifier keys are also scrubbed
//! from inside the structured fields.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::ArtifactRecord;
use crate::types::{Result, VestibuleError};

/// Keys removed at any depth of the structured fields
pub const IDENTIFIER_KEYS: &[&str] = &[
    "ownerKey",
    "owner_key",
    "sessionId",
    "session_id",
    "authId",
    "auth_id",
    "deviceId",
    "device_id",
];

/// What a share link serves
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareableSnapshot {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    pub fields: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShareProjector;

impl ShareProjector {
    /// Project a finalized artifact. Unfinalized artifacts are `NotFound`.
    pub fn project(record: &ArtifactRecord) -> Result<ShareableSnapshot> {
        let finalized = record
            .finalized
            .as_ref()
            .ok_or_else(|| VestibuleError::NotFound("Artifact not found".into()))?;

        Ok(ShareableSnapshot {
            id: record.id.clone(),
            display_name: record.display_name.clone(),
            text: record.text.clone(),
            narrative: finalized.narrative.clone(),
            fields: scrub_map(&finalized.fields),
            created_at: record.created_at,
        })
    }
}

fn scrub_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter(|(key, _)| !IDENTIFIER_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), scrub(value)))
        .collect()
}

fn scrub(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(scrub_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(scrub).collect()),
        other => other.clone(),
    }
}
