//! Shared types for vestibule

pub mod error;

pub use error::{ErrorBody, Result, VestibuleError};
