//! Identity routes
//!
//! - GET  /identity          - resolved caller
//! - POST /identity/guest    - create (or reuse) the caller's guest profile
//! - POST /identity/moment   - merge fields into the guest session
//! - GET  /identity/session  - guest session payload and expiry
//! - GET  /identity/profile  - the caller's profile
//! - POST /identity/claim    - move a guest profile to the authenticated account

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{json_response, ApiRequest};
use crate::identity::{account_owner_key, Identity};
use crate::registry::{ProfileRecord, ProfileStatus};
use crate::server::AppState;
use crate::types::{Result, VestibuleError};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestRequest {
    pub name: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GuestResponse {
    pub id: String,
    pub name: String,
}

/// Profile as shown to its owner
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: String,
    pub name: String,
    pub status: ProfileStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl From<ProfileRecord> for ProfileResponse {
    fn from(record: ProfileRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            status: record.status,
            created_at: record.created_at,
            claimed_at: record.claimed_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub payload: Map<String, Value>,
    pub expires_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// GET /identity
pub fn get_identity(caller: &Identity) -> Result<Response<Full<Bytes>>> {
    Ok(json_response(StatusCode::OK, caller))
}

/// POST /identity/guest
///
/// Idempotent per owner: a repeated call returns the existing profile.
pub async fn create_guest(
    state: &AppState,
    req: &ApiRequest,
    caller: &Identity,
) -> Result<Response<Full<Bytes>>> {
    let body: GuestRequest = req.json()?;
    let caller = caller.clone().with_device_id(body.device_id.as_deref());
    let owner_key = caller
        .owner_key_for_write()
        .ok_or_else(|| VestibuleError::Auth("No identity to own a profile".into()))?;

    let record = state.registry.create_guest_profile(&owner_key, &body.name).await?;

    Ok(json_response(
        StatusCode::OK,
        &GuestResponse {
            id: record.id,
            name: record.name,
        },
    ))
}

/// POST /identity/moment
///
/// Body is a JSON object with at least a string `moment`; every field is
/// merged into the session payload.
pub async fn save_moment(
    state: &AppState,
    req: &ApiRequest,
    caller: &Identity,
) -> Result<Response<Full<Bytes>>> {
    let patch: Map<String, Value> = req.json()?;
    match patch.get("moment") {
        Some(Value::String(moment)) if !moment.trim().is_empty() => {}
        _ => return Err(VestibuleError::Validation("moment is required".into())),
    }

    let session_id = caller
        .session_id
        .as_deref()
        .ok_or_else(|| VestibuleError::NotFound("Session not found or expired".into()))?;
    state.sessions.merge(session_id, patch).await?;

    Ok(json_response(StatusCode::OK, &serde_json::json!({ "saved": true })))
}

/// GET /identity/session
pub async fn get_session(state: &AppState, caller: &Identity) -> Result<Response<Full<Bytes>>> {
    let not_found = || VestibuleError::NotFound("Session not found or expired".into());
    let session_id = caller.session_id.as_deref().ok_or_else(not_found)?;
    let session = state
        .sessions
        .get_session(session_id)
        .await?
        .ok_or_else(not_found)?;

    Ok(json_response(
        StatusCode::OK,
        &SessionResponse {
            payload: session.payload,
            expires_at: session.expires_at,
        },
    ))
}

/// GET /identity/profile
pub async fn get_profile(state: &AppState, caller: &Identity) -> Result<Response<Full<Bytes>>> {
    let owner_key = caller
        .owner_key()
        .ok_or_else(|| VestibuleError::Auth("No identity to look up".into()))?;
    let record = state
        .registry
        .lookup_by_owner(&owner_key)
        .await?
        .ok_or_else(|| VestibuleError::NotFound("Profile not found".into()))?;

    Ok(json_response(StatusCode::OK, &ProfileResponse::from(record)))
}

/// POST /identity/claim
///
/// Requires an authenticated caller. The guest profile moved is the one
/// owned by the device id or live guest session presented with the same
/// request; nothing in the body names the owner.
pub async fn claim_profile(state: &AppState, caller: &Identity) -> Result<Response<Full<Bytes>>> {
    let account_key = match caller.auth_id.as_deref() {
        Some(auth_id) => account_owner_key(auth_id),
        None => return Err(VestibuleError::Auth("Authentication required".into())),
    };
    let guest_key = caller.guest_owner_key().ok_or_else(|| {
        VestibuleError::Validation("A device id or guest session is required to claim".into())
    })?;

    let record = state.registry.claim(&guest_key, &account_key).await?;
    Ok(json_response(StatusCode::OK, &ProfileResponse::from(record)))
}
