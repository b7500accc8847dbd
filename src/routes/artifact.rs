//! Artifact routes
//!
//! - GET  /artifact/pending?sid=<scriptId> - fetch the caller's pending artifact
//! - POST /artifact/pending                - stage a pending artifact
//! - POST /artifact                        - store an artifact for sharing

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{json_response, ApiRequest};
use crate::identity::Identity;
use crate::server::AppState;
use crate::share::{FinalizedArtifact, NewArtifact};
use crate::types::{Result, VestibuleError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutPendingRequest {
    pub script_id: String,
    #[serde(default)]
    pub payload: Value,
    pub ttl_seconds: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PutPendingResponse {
    pub script_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateArtifactRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    pub text: String,
    #[serde(default)]
    pub finalized: Option<FinalizedArtifact>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// GET /artifact/pending?sid=<scriptId>
pub async fn fetch_pending(
    state: &AppState,
    req: &ApiRequest,
    caller: &Identity,
) -> Result<Response<Full<Bytes>>> {
    let script_id = req
        .query_param("sid")
        .ok_or_else(|| VestibuleError::Validation("sid query parameter is required".into()))?;
    let owner_key = caller
        .owner_key()
        .ok_or_else(|| VestibuleError::Auth("No identity owns a pending artifact".into()))?;

    let payload = state.pending.fetch(&owner_key, &script_id).await?;
    Ok(json_response(StatusCode::OK, &payload))
}

/// POST /artifact/pending
pub async fn put_pending(
    state: &AppState,
    req: &ApiRequest,
    caller: &Identity,
) -> Result<Response<Full<Bytes>>> {
    let body: PutPendingRequest = req.json()?;
    let owner_key = caller
        .owner_key_for_write()
        .ok_or_else(|| VestibuleError::Auth("No identity to own the artifact".into()))?;

    let artifact = state
        .pending
        .put(&owner_key, &body.script_id, body.payload, body.ttl_seconds)
        .await?;

    Ok(json_response(
        StatusCode::OK,
        &PutPendingResponse {
            script_id: artifact.script_id,
            expires_at: artifact.expires_at,
        },
    ))
}

/// POST /artifact
pub async fn create_artifact(
    state: &AppState,
    req: &ApiRequest,
    caller: &Identity,
) -> Result<Response<Full<Bytes>>> {
    let body: CreateArtifactRequest = req.json()?;
    let record = state
        .artifacts
        .create(
            caller,
            NewArtifact {
                display_name: body.display_name,
                text: body.text,
                finalized: body.finalized,
                extra: body.extra,
            },
        )
        .await?;

    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({ "id": record.id }),
    ))
}
