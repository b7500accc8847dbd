//! Vestibule - guest sessions and identity resolution
//!
//! Every request is resolved to one effective identity, guest or
//! authenticated. Guests get an ephemeral session with a sliding TTL and may
//! register a uniquely named profile, later claimed by an authenticated
//! account. Time-boxed pending artifacts and public share projections hang
//! off the same identity.
//!
//! All state lives in a shared key-value store ([`kv::KvStore`]); the
//! process keeps nothing authoritative between requests.

pub mod auth;
pub mod clock;
pub mod config;
pub mod identity;
pub mod kv;
pub mod pending;
pub mod registry;
pub mod routes;
pub mod server;
pub mod session;
pub mod share;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, VestibuleError};
