//! Guest sessions
//!
//! Ephemeral, device-bound payloads keyed by an opaque `sid_` token. The
//! resolver mints sessions; [`GuestSessionStore`] reads and merge-writes them
//! with a sliding TTL.

pub mod store;

pub use store::{GuestSession, GuestSessionStore, DEFAULT_SESSION_TTL_SECS};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

/// Prefix distinguishing guest session ids from authenticated ids
pub const SESSION_ID_PREFIX: &str = "sid_";

/// Random bytes behind each session id
const SESSION_TOKEN_BYTES: usize = 32;

/// Mint a new unguessable session id
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("{}{}", SESSION_ID_PREFIX, URL_SAFE_NO_PAD.encode(bytes))
}

/// Cheap shape check: prefix plus a URL-safe token of the minted length.
///
/// Classifies by format only; liveness is decided by the store.
pub fn is_session_id(candidate: &str) -> bool {
    match candidate.strip_prefix(SESSION_ID_PREFIX) {
        Some(token) => {
            token.len() == encoded_token_len()
                && token
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        }
        None => false,
    }
}

fn encoded_token_len() -> usize {
    (SESSION_TOKEN_BYTES * 4).div_ceil(3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_have_prefix_and_shape() {
        let id = generate_session_id();
        assert!(id.starts_with(SESSION_ID_PREFIX));
        assert_eq!(id.len(), SESSION_ID_PREFIX.len() + 43);
        assert!(is_session_id(&id));
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        assert_ne!(generate_session_id(), generate_session_id());
    }

    #[test]
    fn test_shape_check_rejects_foreign_ids() {
        assert!(!is_session_id("u9"));
        assert!(!is_session_id("sid_"));
        assert!(!is_session_id("sid_short"));
        assert!(!is_session_id(&format!("sess_{}", "a".repeat(43))));
        assert!(!is_session_id(&format!("sid_{}", "a/".repeat(21) + "a")));
    }
}
