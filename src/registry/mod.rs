//! Profile registry
//!
//! Named profiles with unique names and a single owner, first as a guest
//! device and later as an authenticated account.

pub mod profile;
#[allow(clippy::module_inception)]
pub mod registry;

pub use profile::{validate_name, ProfileRecord, ProfileStatus, MAX_NAME_CHARS};
pub use registry::{IdentityRegistry, CLAIM_LEASE};
