//! Identity registry
//!
//! A profile is stored once at `profile:<id>` and reachable through two
//! secondary indices, `profile_name:<name>` and `profile_owner:<ownerKey>`.
//! The store has no cross-key transactions, so uniqueness comes from
//! set-if-absent claims on the index keys:
//!
//! 1. claim the name index, then the owner index, each with a short lease TTL
//! 2. write the profile record
//! 3. make both claims permanent
//!
//! A failure at any step releases what was claimed. A request abandoned
//! midway leaves only leases, which expire by themselves. A permanent index
//! that points at a missing record is removed when encountered; an owner
//! index whose record has moved to another owner is rolled forward.
//!
//! Moving a profile to an account additionally holds a `profile_claim:<id>`
//! lease, so only one claim can rewrite a record at a time.

use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::profile::{validate_name, validate_owner_key, ProfileRecord};
use crate::clock::SharedClock;
use crate::kv::{codec, keys, SharedKv};
use crate::types::{Result, VestibuleError};

/// Lifetime of an index claim before its record is committed
pub const CLAIM_LEASE: Duration = Duration::from_secs(30);

/// What an index key currently holds
enum IndexState {
    /// No live claim
    Free,
    /// Claimed and the record is filed under this key
    Bound(ProfileRecord),
    /// Permanent owner index whose record now belongs to another owner
    Moved(ProfileRecord),
    /// Leased by a request that has not written its record yet
    InFlight,
}

/// Profile records and their uniqueness indices
#[derive(Clone)]
pub struct IdentityRegistry {
    kv: SharedKv,
    clock: SharedClock,
}

impl IdentityRegistry {
    pub fn new(kv: SharedKv, clock: SharedClock) -> Self {
        Self { kv, clock }
    }

    /// Create a guest profile for `owner_key`, or return the one it already owns.
    ///
    /// Fails with `Conflict` if the name is held by another profile.
    pub async fn create_guest_profile(
        &self,
        owner_key: &str,
        desired_name: &str,
    ) -> Result<ProfileRecord> {
        let name = validate_name(desired_name)?;
        let owner_key = validate_owner_key(owner_key)?;

        if let Some(existing) = self.lookup_by_owner(owner_key).await? {
            debug!(profile_id = %existing.id, "Owner already has a profile, reusing");
            return Ok(existing);
        }

        let id = Uuid::new_v4().to_string();
        let name_key = keys::profile_name(&name);
        let owner_index = keys::profile_owner(owner_key);

        if !self.claim_index(&name_key, &id).await? {
            warn!(name = %name, "Guest profile rejected, name taken");
            return Err(VestibuleError::Conflict("Name is already taken".into()));
        }

        if !self.claim_index(&owner_index, &id).await? {
            self.release_index(&name_key, &id).await;
            // A concurrent init for the same owner got there first
            return match self.lookup_by_owner(owner_key).await? {
                Some(winner) => Ok(winner),
                None => Err(VestibuleError::Conflict(
                    "Profile creation already in progress for this owner".into(),
                )),
            };
        }

        let record = ProfileRecord::new_guest(id, name, owner_key.to_string(), self.clock.now());
        if let Err(e) = self
            .commit(&record, &[name_key.as_str(), owner_index.as_str()])
            .await
        {
            error!(profile_id = %record.id, error = %e, "Failed to write profile, releasing claims");
            self.release_index(&owner_index, &record.id).await;
            self.release_index(&name_key, &record.id).await;
            return Err(VestibuleError::Internal(format!(
                "Failed to create profile: {}",
                e.message()
            )));
        }

        info!(profile_id = %record.id, name = %record.name, "Created guest profile");
        Ok(record)
    }

    /// Move the profile owned by `owner_key_old` to the account whose owner
    /// key is `account_key`.
    ///
    /// Idempotent for the same account. Rejects with `Conflict` if the
    /// account already owns a different profile or another claim on the same
    /// profile is in progress; nothing is merged.
    pub async fn claim(&self, owner_key_old: &str, account_key: &str) -> Result<ProfileRecord> {
        let owner_key_old = validate_owner_key(owner_key_old)?;
        let account_key = validate_owner_key(account_key)?;

        let old_index = keys::profile_owner(owner_key_old);
        let record = match self.read_index(&old_index).await? {
            IndexState::Bound(record) => record,
            IndexState::Moved(record) if record.owner_key == account_key => {
                // Retry of a claim that stopped before dropping the old index
                self.finish_claim(&record, &old_index).await?;
                debug!(profile_id = %record.id, "Profile already claimed by caller");
                return Ok(record);
            }
            IndexState::Moved(record) => {
                self.roll_forward(&record, &old_index).await?;
                return Err(VestibuleError::NotFound("No profile for this owner".into()));
            }
            IndexState::Free | IndexState::InFlight => {
                return Err(VestibuleError::NotFound("No profile for this owner".into()))
            }
        };

        if record.is_claimed() {
            if record.owner_key == account_key {
                debug!(profile_id = %record.id, "Profile already claimed by caller");
                return Ok(record);
            }
            warn!(profile_id = %record.id, "Claim rejected, profile owned by another account");
            return Err(VestibuleError::Conflict(
                "Profile already claimed by another account".into(),
            ));
        }

        let new_index = keys::profile_owner(account_key);
        if !matches!(self.resolve_index(&new_index).await?, IndexState::Free) {
            warn!(profile_id = %record.id, "Claim rejected, account already owns a profile");
            return Err(VestibuleError::Conflict(
                "Account already owns a different profile".into(),
            ));
        }

        let lease_key = keys::profile_claim(&record.id);
        let token = Uuid::new_v4().to_string();
        if !self
            .kv
            .set_nx(&lease_key, &codec::encode(&token)?, Some(CLAIM_LEASE))
            .await?
        {
            warn!(profile_id = %record.id, "Claim rejected, another claim in progress");
            return Err(VestibuleError::Conflict(
                "Profile claim already in progress".into(),
            ));
        }

        let result = self
            .claim_leased(&record.id, owner_key_old, account_key, &old_index, &new_index)
            .await;
        self.release_index(&lease_key, &token).await;
        result
    }

    /// Rewrite the record as claimed. Runs while holding the claim lease.
    async fn claim_leased(
        &self,
        id: &str,
        owner_key_old: &str,
        account_key: &str,
        old_index: &str,
        new_index: &str,
    ) -> Result<ProfileRecord> {
        // Re-read under the lease: a claim that finished in between has moved it
        let record = self
            .lookup_by_id(id)
            .await?
            .ok_or_else(|| VestibuleError::NotFound("No profile for this owner".into()))?;
        if record.owner_key == account_key {
            self.finish_claim(&record, old_index).await?;
            return Ok(record);
        }
        if record.owner_key != owner_key_old || record.is_claimed() {
            warn!(profile_id = %record.id, "Claim rejected, profile claimed concurrently");
            return Err(VestibuleError::Conflict(
                "Profile already claimed by another account".into(),
            ));
        }

        if !self.claim_index(new_index, &record.id).await? {
            return Err(VestibuleError::Conflict(
                "Account already owns a different profile".into(),
            ));
        }

        let claimed = record.claimed_by(account_key, self.clock.now());
        if let Err(e) = self.commit(&claimed, &[new_index]).await {
            error!(profile_id = %record.id, error = %e, "Failed to write claimed profile, releasing claim");
            self.release_index(new_index, &record.id).await;
            return Err(VestibuleError::Internal(format!(
                "Failed to claim profile: {}",
                e.message()
            )));
        }
        self.finish_claim(&claimed, old_index).await?;

        info!(profile_id = %claimed.id, "Profile claimed by authenticated account");
        Ok(claimed)
    }

    /// Profile currently owned by `owner_key`
    pub async fn lookup_by_owner(&self, owner_key: &str) -> Result<Option<ProfileRecord>> {
        let owner_key = owner_key.trim();
        if owner_key.is_empty() {
            return Ok(None);
        }
        match self.resolve_index(&keys::profile_owner(owner_key)).await? {
            IndexState::Bound(record) => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    /// Profile holding `name` (exact, case-sensitive match after trimming)
    pub async fn lookup_by_name(&self, name: &str) -> Result<Option<ProfileRecord>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        match self.resolve_index(&keys::profile_name(name)).await? {
            IndexState::Bound(record) => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    /// Profile by id
    pub async fn lookup_by_id(&self, id: &str) -> Result<Option<ProfileRecord>> {
        codec::get_json(self.kv.as_ref(), &keys::profile(id)).await
    }

    /// Set-if-absent with a lease TTL
    async fn claim_index(&self, index_key: &str, id: &str) -> Result<bool> {
        // Clears a permanent stale claim
        self.resolve_index(index_key).await?;
        let value = codec::encode(&id)?;
        self.kv.set_nx(index_key, &value, Some(CLAIM_LEASE)).await
    }

    /// Write the record, then make the given index claims permanent
    async fn commit(&self, record: &ProfileRecord, index_keys: &[&str]) -> Result<()> {
        codec::set_json(self.kv.as_ref(), &keys::profile(&record.id), record, None).await?;
        let value = codec::encode(&record.id)?;
        for index_key in index_keys {
            self.kv.set(index_key, &value, None).await?;
        }
        Ok(())
    }

    /// Make the new owner index permanent and drop the old one
    async fn finish_claim(&self, record: &ProfileRecord, old_index: &str) -> Result<()> {
        let value = codec::encode(&record.id)?;
        self.kv
            .set(&keys::profile_owner(&record.owner_key), &value, None)
            .await?;
        if old_index != keys::profile_owner(&record.owner_key) {
            self.kv.del(old_index).await?;
        }
        Ok(())
    }

    /// File a moved record under its current owner, unless that owner index
    /// is held by another profile, and drop the stale index
    async fn roll_forward(&self, record: &ProfileRecord, stale_index: &str) -> Result<()> {
        let owner_index = keys::profile_owner(&record.owner_key);
        let value = codec::encode(&record.id)?;
        match codec::get_json::<String>(self.kv.as_ref(), &owner_index).await? {
            None => {
                self.kv.set_nx(&owner_index, &value, None).await?;
            }
            Some(current) if current == record.id => {
                self.kv.set(&owner_index, &value, None).await?;
            }
            Some(_) => {}
        }

        warn!(key = %stale_index, profile_id = %record.id, "Removing owner index of a moved profile");
        self.kv.del(stale_index).await?;
        Ok(())
    }

    /// Delete a claim if it still holds `value`. Best effort.
    async fn release_index(&self, index_key: &str, value: &str) {
        let current: Result<Option<String>> = codec::get_json(self.kv.as_ref(), index_key).await;
        match current {
            Ok(Some(current)) if current == value => {
                if let Err(e) = self.kv.del(index_key).await {
                    error!(key = %index_key, error = %e, "Failed to release index claim");
                }
            }
            Ok(_) => {}
            Err(e) => error!(key = %index_key, error = %e, "Failed to read index claim"),
        }
    }

    /// Like [`Self::read_index`], but a moved owner index is rolled forward
    /// and reported as free
    async fn resolve_index(&self, index_key: &str) -> Result<IndexState> {
        match self.read_index(index_key).await? {
            IndexState::Moved(record) => {
                self.roll_forward(&record, index_key).await?;
                Ok(IndexState::Free)
            }
            state => Ok(state),
        }
    }

    /// Resolve an index key, removing it if it is permanent and dangling
    async fn read_index(&self, index_key: &str) -> Result<IndexState> {
        let id: String = match codec::get_json(self.kv.as_ref(), index_key).await? {
            Some(id) => id,
            None => return Ok(IndexState::Free),
        };

        if let Some(record) = self.lookup_by_id(&id).await? {
            if files_under(&record, index_key) {
                return Ok(IndexState::Bound(record));
            }
        }

        if self.kv.expires_at(index_key).await?.is_some() {
            return Ok(IndexState::InFlight);
        }

        // A claim turns permanent only after its record is written, so the
        // record may have appeared or changed since the first read
        match self.lookup_by_id(&id).await? {
            Some(record) if files_under(&record, index_key) => Ok(IndexState::Bound(record)),
            Some(record) if index_key.starts_with(keys::PROFILE_OWNER_PREFIX) => {
                Ok(IndexState::Moved(record))
            }
            _ => {
                warn!(key = %index_key, profile_id = %id, "Removing index pointing at a missing profile");
                self.kv.del(index_key).await?;
                Ok(IndexState::Free)
            }
        }
    }
}

/// Whether `index_key` is one of the keys `record` is filed under
fn files_under(record: &ProfileRecord, index_key: &str) -> bool {
    index_key == keys::profile_owner(&record.owner_key) || index_key == keys::profile_name(&record.name)
}
