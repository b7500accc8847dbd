//! Identity resolution
//!
//! Turns a [`RequestContext`] into one [`Identity`], guaranteeing that every
//! unauthenticated caller leaves with a live guest session.

use tracing::debug;

use super::{Identity, RequestContext};
use crate::auth::SharedAuth;
use crate::registry::IdentityRegistry;
use crate::session::{generate_session_id, is_session_id, GuestSessionStore};
use crate::types::Result;

/// Name and attributes of the guest session cookie
#[derive(Debug, Clone)]
pub struct SessionCookie {
    pub name: String,
    pub secure: bool,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, secure: bool) -> Self {
        Self {
            name: name.into(),
            secure,
        }
    }

    /// `Set-Cookie` header value for a session id
    pub fn header_value(&self, session_id: &str) -> String {
        let mut value = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.name, session_id
        );
        if self.secure {
            value.push_str("; Secure");
        }
        value
    }
}

impl Default for SessionCookie {
    fn default() -> Self {
        Self::new("sid", false)
    }
}

/// Resolved identity plus the cookie to set, if a session was minted
#[derive(Debug, Clone)]
pub struct Resolution {
    pub identity: Identity,
    pub set_cookie: Option<String>,
}

/// Determines the effective identity of each request
#[derive(Clone)]
pub struct IdentityResolver {
    auth: SharedAuth,
    sessions: GuestSessionStore,
    registry: IdentityRegistry,
    cookie: SessionCookie,
}

impl IdentityResolver {
    pub fn new(
        auth: SharedAuth,
        sessions: GuestSessionStore,
        registry: IdentityRegistry,
        cookie: SessionCookie,
    ) -> Self {
        Self {
            auth,
            sessions,
            registry,
            cookie,
        }
    }

    pub fn cookie(&self) -> &SessionCookie {
        &self.cookie
    }

    /// Resolve the caller.
    ///
    /// Authenticated callers never get a new session. Guests whose cookie
    /// is missing, malformed, or points at an expired session get a fresh
    /// one; a live session id is never replaced.
    pub async fn resolve(&self, ctx: &RequestContext) -> Result<Resolution> {
        let auth_id = self.auth.authenticate(ctx).await?;
        let device_id = ctx.device_id().map(str::to_string);
        let live_session = self.live_session(ctx).await?;

        let mut set_cookie = None;
        let mut identity = match (auth_id, live_session) {
            (Some(auth_id), session_id) => Identity::authenticated(auth_id, session_id, device_id),
            (None, Some(session_id)) => Identity::guest(Some(session_id), device_id, false),
            (None, None) => {
                let session_id = generate_session_id();
                self.sessions.create(&session_id).await?;
                set_cookie = Some(self.cookie.header_value(&session_id));
                Identity::guest(Some(session_id), device_id, true)
            }
        };

        if let Some(owner_key) = identity.owner_key() {
            if let Some(record) = self.registry.lookup_by_owner(&owner_key).await? {
                identity.attach_profile(&record);
            }
        }

        debug!(
            scope = ?identity.effective_scope,
            minted = identity.session_minted,
            has_profile = identity.profile_id.is_some(),
            "Resolved identity"
        );

        Ok(Resolution {
            identity,
            set_cookie,
        })
    }

    /// Session id from the cookie, if well-formed and still live
    async fn live_session(&self, ctx: &RequestContext) -> Result<Option<String>> {
        let session_id = match ctx.cookie(&self.cookie.name) {
            Some(sid) if is_session_id(sid) => sid,
            _ => return Ok(None),
        };
        if self.sessions.exists(session_id).await? {
            Ok(Some(session_id.to_string()))
        } else {
            Ok(None)
        }
    }
}
