//! Key namespaces
//!
//! Each component owns one or more prefixes and never writes into another
//! component's namespace.
//!
//! | Prefix | Owner |
//! |---|---|
//! | `session:` | GuestSessionStore |
//! | `profile:`, `profile_name:`, `profile_owner:`, `profile_claim:` | IdentityRegistry |
//! | `pending:` | PendingArtifactStore |
//! | `artifact:` | ArtifactRepository |

pub const SESSION_PREFIX: &str = "session:";
pub const PROFILE_PREFIX: &str = "profile:";
pub const PROFILE_NAME_PREFIX: &str = "profile_name:";
pub const PROFILE_OWNER_PREFIX: &str = "profile_owner:";
pub const PROFILE_CLAIM_PREFIX: &str = "profile_claim:";
pub const PENDING_PREFIX: &str = "pending:";
pub const ARTIFACT_PREFIX: &str = "artifact:";

pub fn session(session_id: &str) -> String {
    format!("{}{}", SESSION_PREFIX, session_id)
}

pub fn profile(id: &str) -> String {
    format!("{}{}", PROFILE_PREFIX, id)
}

pub fn profile_name(name: &str) -> String {
    format!("{}{}", PROFILE_NAME_PREFIX, name)
}

pub fn profile_owner(owner_key: &str) -> String {
    format!("{}{}", PROFILE_OWNER_PREFIX, owner_key)
}

/// Lease held while a profile is being moved to an account
pub fn profile_claim(id: &str) -> String {
    format!("{}{}", PROFILE_CLAIM_PREFIX, id)
}

pub fn pending(owner_key: &str) -> String {
    format!("{}{}", PENDING_PREFIX, owner_key)
}

pub fn artifact(id: &str) -> String {
    format!("{}{}", ARTIFACT_PREFIX, id)
}

/// Strip a namespace prefix from a full key
pub fn strip<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix)
}
