//! Authentication for vestibule
//!
//! Provides:
//! - [`AuthProvider`]: the lookup the resolver uses to find an authenticated id
//! - [`JwtAuthProvider`]: bearer-token implementation backed by [`JwtValidator`]

pub mod jwt;

pub use jwt::{bearer_token, Claims, JwtValidator, TokenRejection};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::identity::RequestContext;
use crate::types::Result;

/// Looks up the authenticated id of a request.
///
/// `Ok(None)` means "treat as guest", including for credentials that fail
/// verification. `Err` is reserved for the provider itself failing, and
/// propagates to the caller.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, ctx: &RequestContext) -> Result<Option<String>>;
}

/// Shared provider handle
pub type SharedAuth = Arc<dyn AuthProvider>;

/// Verifies `Authorization: Bearer <jwt>` (or the token cookie)
pub struct JwtAuthProvider {
    validator: JwtValidator,
}

impl JwtAuthProvider {
    pub fn new(validator: JwtValidator) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl AuthProvider for JwtAuthProvider {
    async fn authenticate(&self, ctx: &RequestContext) -> Result<Option<String>> {
        let token = match bearer_token(ctx.authorization()) {
            Some(token) => token,
            None => return Ok(None),
        };

        match self.validator.verify_token(token) {
            Ok(claims) => Ok(Some(claims.sub)),
            Err(reason) => {
                debug!(%reason, "Ignoring unverifiable token, treating caller as guest");
                Ok(None)
            }
        }
    }
}

/// Provider that never authenticates anyone
pub struct GuestOnlyProvider;

#[async_trait]
impl AuthProvider for GuestOnlyProvider {
    async fn authenticate(&self, _ctx: &RequestContext) -> Result<Option<String>> {
        Ok(None)
    }
}
