//! Entitlement store contract and an in-memory implementation.
//!
//! The engine only needs a handful of operations against a transactional
//! store. Every method reports failure as [`LicenseError::Storage`], distinct
//! from an absent row (`Ok(None)`).

use crate::error::{LicenseError, LicenseResult};
use crate::record::{AppVersionEntry, LicenseRecord, UsedLicenseEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};

/// Persistence required by the entitlement engine.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Reads the singleton license record, if it has been created.
    async fn load_record(&self) -> LicenseResult<Option<LicenseRecord>>;

    /// Inserts `record` unless one already exists, then returns the stored row.
    async fn init_record(&self, record: &LicenseRecord) -> LicenseResult<LicenseRecord>;

    /// Sets the installation id to `candidate` if none is stored yet.
    ///
    /// Returns the id in effect afterwards, which is the previously stored one
    /// when present.
    async fn claim_installation_id(&self, candidate: &str) -> LicenseResult<String>;

    /// Overwrites the expiry date of the license record.
    async fn set_expiry(&self, expiry: DateTime<Utc>) -> LicenseResult<()>;

    /// Looks up a redeemed key for the given installation.
    async fn find_used_key(
        &self,
        license_key: &str,
        installation_id: &str,
    ) -> LicenseResult<Option<UsedLicenseEntry>>;

    /// Appends `entry` to the ledger and sets the record's key and expiry in
    /// one transaction.
    ///
    /// Fails with [`LicenseError::KeyAlreadyUsed`] when the key is already in
    /// the ledger for the same installation, leaving the record untouched.
    async fn commit_redemption(
        &self,
        entry: &UsedLicenseEntry,
        new_expiry: DateTime<Utc>,
    ) -> LicenseResult<()>;

    /// Returns the most recently recorded version entry.
    async fn latest_version(&self) -> LicenseResult<Option<AppVersionEntry>>;

    /// Appends a version entry.
    async fn record_version(&self, entry: &AppVersionEntry) -> LicenseResult<()>;
}

#[derive(Debug, Default)]
struct MemoryState {
    record: Option<LicenseRecord>,
    used: Vec<UsedLicenseEntry>,
    versions: Vec<AppVersionEntry>,
}

/// Volatile store, for tests and hosts without persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `record`.
    #[must_use]
    pub fn with_record(record: LicenseRecord) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                record: Some(record),
                ..MemoryState::default()
            }),
        }
    }

    /// Returns a copy of the redemption ledger.
    pub fn used_keys(&self) -> LicenseResult<Vec<UsedLicenseEntry>> {
        Ok(self.lock()?.used.clone())
    }

    /// Returns a copy of the version history, oldest first.
    pub fn versions(&self) -> LicenseResult<Vec<AppVersionEntry>> {
        Ok(self.lock()?.versions.clone())
    }

    fn lock(&self) -> LicenseResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| LicenseError::Storage("memory store lock poisoned".to_string()))
    }
}

fn missing_record() -> LicenseError {
    LicenseError::Storage("license record not initialised".to_string())
}

#[async_trait]
impl EntitlementStore for MemoryStore {
    async fn load_record(&self) -> LicenseResult<Option<LicenseRecord>> {
        Ok(self.lock()?.record.clone())
    }

    async fn init_record(&self, record: &LicenseRecord) -> LicenseResult<LicenseRecord> {
        let mut state = self.lock()?;
        Ok(state.record.get_or_insert_with(|| record.clone()).clone())
    }

    async fn claim_installation_id(&self, candidate: &str) -> LicenseResult<String> {
        let mut state = self.lock()?;
        let record = state.record.as_mut().ok_or_else(missing_record)?;
        Ok(record
            .installation_id
            .get_or_insert_with(|| candidate.to_string())
            .clone())
    }

    async fn set_expiry(&self, expiry: DateTime<Utc>) -> LicenseResult<()> {
        let mut state = self.lock()?;
        let record = state.record.as_mut().ok_or_else(missing_record)?;
        record.expiry_date = expiry;
        Ok(())
    }

    async fn find_used_key(
        &self,
        license_key: &str,
        installation_id: &str,
    ) -> LicenseResult<Option<UsedLicenseEntry>> {
        Ok(self
            .lock()?
            .used
            .iter()
            .find(|e| e.license_key == license_key && e.installation_id == installation_id)
            .cloned())
    }

    async fn commit_redemption(
        &self,
        entry: &UsedLicenseEntry,
        new_expiry: DateTime<Utc>,
    ) -> LicenseResult<()> {
        let mut state = self.lock()?;
        let duplicate = state.used.iter().any(|e| {
            e.license_key == entry.license_key && e.installation_id == entry.installation_id
        });
        if duplicate {
            return Err(LicenseError::KeyAlreadyUsed {
                installation_id: entry.installation_id.clone(),
            });
        }

        let record = state.record.as_mut().ok_or_else(missing_record)?;
        record.license_key = Some(entry.license_key.clone());
        record.expiry_date = new_expiry;
        state.used.push(entry.clone());
        Ok(())
    }

    async fn latest_version(&self) -> LicenseResult<Option<AppVersionEntry>> {
        Ok(self.lock()?.versions.last().cloned())
    }

    async fn record_version(&self, entry: &AppVersionEntry) -> LicenseResult<()> {
        self.lock()?.versions.push(entry.clone());
        Ok(())
    }
}
