//! Effective identity of a request
//!
//! Every inbound request is resolved to exactly one [`Identity`] before any
//! handler runs. Scope precedence lives here and in [`resolver`] only:
//! an authenticated id always wins over a guest session.

pub mod context;
pub mod resolver;

pub use context::{parse_cookie_header, RequestContext, DEVICE_ID_COOKIE, DEVICE_ID_HEADER};
pub use resolver::{IdentityResolver, Resolution, SessionCookie};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::registry::ProfileRecord;

const ACCOUNT_OWNER_PREFIX: &str = "auth:";
const DEVICE_OWNER_PREFIX: &str = "device:";
const SESSION_OWNER_PREFIX: &str = "session:";

/// Owner key of an authenticated account
pub fn account_owner_key(auth_id: &str) -> String {
    format!("{}{}", ACCOUNT_OWNER_PREFIX, auth_id)
}

/// Owner key of a client device
pub fn device_owner_key(device_id: &str) -> String {
    format!("{}{}", DEVICE_OWNER_PREFIX, device_id)
}

/// Owner key of a guest session
pub fn session_owner_key(session_id: &str) -> String {
    format!("{}{}", SESSION_OWNER_PREFIX, session_id)
}

/// Which credential the identity rests on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveScope {
    Guest,
    Authenticated,
}

/// Resolved caller identity. Derived per request, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Travels in an HttpOnly cookie, so it is not echoed in bodies
    #[serde(skip)]
    pub session_id: Option<String>,
    pub auth_id: Option<String>,
    pub effective_scope: EffectiveScope,
    pub profile_id: Option<String>,
    pub profile_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub device_id: Option<String>,
    /// Session was created by this request
    #[serde(skip)]
    pub session_minted: bool,
}

impl Identity {
    pub fn guest(session_id: Option<String>, device_id: Option<String>, session_minted: bool) -> Self {
        Self {
            session_id,
            auth_id: None,
            effective_scope: EffectiveScope::Guest,
            profile_id: None,
            profile_name: None,
            created_at: None,
            device_id,
            session_minted,
        }
    }

    pub fn authenticated(auth_id: String, session_id: Option<String>, device_id: Option<String>) -> Self {
        Self {
            session_id,
            auth_id: Some(auth_id),
            effective_scope: EffectiveScope::Authenticated,
            profile_id: None,
            profile_name: None,
            created_at: None,
            device_id,
            session_minted: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.effective_scope == EffectiveScope::Authenticated
    }

    /// Key that owner-scoped records are filed under.
    ///
    /// The authenticated id, else the device id, else a session id that was
    /// already live before this request. A session minted just now owns
    /// nothing yet, so it yields `None`. Keys carry their credential kind, so
    /// a device id can never collide with an account id.
    pub fn owner_key(&self) -> Option<String> {
        match self.auth_id.as_deref() {
            Some(auth_id) => Some(account_owner_key(auth_id)),
            None => self.guest_owner_key(),
        }
    }

    /// Owner key for records being created by this request, which may be
    /// filed under a session minted just now
    pub fn owner_key_for_write(&self) -> Option<String> {
        self.owner_key()
            .or_else(|| self.session_id.as_deref().map(session_owner_key))
    }

    /// Owner key of the guest credentials presented with the request,
    /// ignoring any authenticated id
    pub fn guest_owner_key(&self) -> Option<String> {
        if let Some(device_id) = self.device_id.as_deref() {
            return Some(device_owner_key(device_id));
        }
        if self.session_minted {
            return None;
        }
        self.session_id.as_deref().map(session_owner_key)
    }

    /// Replace the device id, e.g. with one supplied in a request body
    pub fn with_device_id(mut self, device_id: Option<&str>) -> Self {
        if let Some(device_id) = device_id.map(str::trim).filter(|d| !d.is_empty()) {
            self.device_id = Some(device_id.to_string());
        }
        self
    }

    /// Fill the profile fields from a registry record
    pub fn attach_profile(&mut self, record: &ProfileRecord) {
        self.profile_id = Some(record.id.clone());
        self.profile_name = Some(record.name.clone());
        self.created_at = Some(record.created_at);
    }
}
