//! Profile record and name rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Result, VestibuleError};

/// Maximum display name length, in characters, after trimming
pub const MAX_NAME_CHARS: usize = 20;

/// Ownership state. Only moves Guest -> Claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    /// Owned by a device key
    Guest,
    /// Owned by an authenticated id
    Claimed,
}

impl fmt::Display for ProfileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileStatus::Guest => write!(f, "guest"),
            ProfileStatus::Claimed => write!(f, "claimed"),
        }
    }
}

/// Stored at `profile:<id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub id: String,
    pub name: String,
    /// Device id while Guest, authenticated id once Claimed
    pub owner_key: String,
    pub status: ProfileStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl ProfileRecord {
    pub fn new_guest(id: String, name: String, owner_key: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            owner_key,
            status: ProfileStatus::Guest,
            created_at: now,
            claimed_at: None,
        }
    }

    /// Copy re-owned by `auth_id`
    pub fn claimed_by(&self, auth_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            owner_key: auth_id.to_string(),
            status: ProfileStatus::Claimed,
            claimed_at: Some(now),
            ..self.clone()
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.status == ProfileStatus::Claimed
    }
}

/// Trim and check a desired display name
pub fn validate_name(desired: &str) -> Result<String> {
    let name = desired.trim();
    if name.is_empty() {
        return Err(VestibuleError::Validation("Name is required".into()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(VestibuleError::Validation(format!(
            "Name must be at most {} characters",
            MAX_NAME_CHARS
        )));
    }
    Ok(name.to_string())
}

/// Check an owner key (device id or authenticated id)
pub fn validate_owner_key(owner_key: &str) -> Result<&str> {
    let owner_key = owner_key.trim();
    if owner_key.is_empty() {
        return Err(VestibuleError::Validation("Owner key is required".into()));
    }
    Ok(owner_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name_trims() {
        assert_eq!(validate_name("  Rosie ").unwrap(), "Rosie");
    }

    #[test]
    fn test_validate_name_limits() {
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"a".repeat(20)).is_ok());
        assert!(validate_name(&"a".repeat(21)).is_err());
        // Characters, not bytes
        assert!(validate_name(&"é".repeat(20)).is_ok());
    }

    #[test]
    fn test_record_wire_shape() {
        let record = ProfileRecord::new_guest("p1".into(), "Rosie".into(), "dev1".into(), Utc::now());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["ownerKey"], "dev1");
        assert_eq!(json["status"], "guest");
        assert!(json.get("claimedAt").is_none());
    }

    #[test]
    fn test_claimed_by_keeps_identity() {
        let now = Utc::now();
        let record = ProfileRecord::new_guest("p1".into(), "Rosie".into(), "dev1".into(), now);
        let claimed = record.claimed_by("u9", now);

        assert_eq!(claimed.id, "p1");
        assert_eq!(claimed.name, "Rosie");
        assert_eq!(claimed.owner_key, "u9");
        assert_eq!(claimed.created_at, record.created_at);
        assert!(claimed.is_claimed());
    }
}
