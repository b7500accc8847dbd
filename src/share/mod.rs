//! Shareable artifacts
//!
//! Artifacts are stored with their owner's identifiers attached. Anything
//! served on a public link goes through [`ShareProjector`] first.

pub mod projector;
pub mod repository;

pub use projector::{ShareProjector, ShareableSnapshot, IDENTIFIER_KEYS};
pub use repository::{ArtifactRepository, NewArtifact, MAX_TEXT_CHARS};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Finished part of an artifact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedArtifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// Source record stored at `artifact:<id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    pub id: String,
    pub owner_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized: Option<FinalizedArtifact>,
    pub created_at: DateTime<Utc>,
    /// Producer-specific fields, kept but never shared
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
