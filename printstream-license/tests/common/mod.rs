//! Shared test helpers for license tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use printstream_license::{
    AppVersionEntry, EntitlementStore, KeyCodec, LicenseEngine, LicenseError, LicenseRecord,
    LicenseResult, MemoryStore, TimeSource, UsedLicenseEntry,
};
use std::sync::{Arc, Mutex};

/// A fixed reference instant used across tests.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

/// A clock the test controls.
#[derive(Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn get(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[async_trait]
impl TimeSource for FixedClock {
    async fn now(&self) -> DateTime<Utc> {
        self.get()
    }
}

pub type TestEngine = LicenseEngine<MemoryStore, FixedClock>;

/// Engine over an empty store at [`base_time`].
pub fn fresh_engine() -> (TestEngine, FixedClock) {
    let clock = FixedClock::new(base_time());
    (LicenseEngine::new(MemoryStore::new(), clock.clone()), clock)
}

/// Engine over a store holding `record`, at [`base_time`].
pub fn engine_with_record(record: LicenseRecord) -> (TestEngine, FixedClock) {
    let clock = FixedClock::new(base_time());
    (
        LicenseEngine::new(MemoryStore::with_record(record), clock.clone()),
        clock,
    )
}

/// A trial record expiring `days_left` days after [`base_time`].
pub fn trial_record(days_left: i64) -> LicenseRecord {
    LicenseRecord {
        license_key: None,
        expiry_date: base_time() + Duration::days(days_left),
        installation_id: Some("install-1".to_string()),
        installation_date: base_time() - Duration::days(60),
    }
}

/// A licensed record with a valid key expiring `days_left` days after [`base_time`].
pub fn licensed_record(days_left: i64) -> LicenseRecord {
    LicenseRecord {
        license_key: Some(KeyCodec::default().generate_key(365, "customer-7")),
        ..trial_record(days_left)
    }
}

/// Store whose every operation fails.
pub struct FailingStore;

fn unavailable<T>() -> LicenseResult<T> {
    Err(LicenseError::Storage("database unavailable".to_string()))
}

#[async_trait]
impl EntitlementStore for FailingStore {
    async fn load_record(&self) -> LicenseResult<Option<LicenseRecord>> {
        unavailable()
    }

    async fn init_record(&self, _record: &LicenseRecord) -> LicenseResult<LicenseRecord> {
        unavailable()
    }

    async fn claim_installation_id(&self, _candidate: &str) -> LicenseResult<String> {
        unavailable()
    }

    async fn set_expiry(&self, _expiry: DateTime<Utc>) -> LicenseResult<()> {
        unavailable()
    }

    async fn find_used_key(
        &self,
        _license_key: &str,
        _installation_id: &str,
    ) -> LicenseResult<Option<UsedLicenseEntry>> {
        unavailable()
    }

    async fn commit_redemption(
        &self,
        _entry: &UsedLicenseEntry,
        _new_expiry: DateTime<Utc>,
    ) -> LicenseResult<()> {
        unavailable()
    }

    async fn latest_version(&self) -> LicenseResult<Option<AppVersionEntry>> {
        unavailable()
    }

    async fn record_version(&self, _entry: &AppVersionEntry) -> LicenseResult<()> {
        unavailable()
    }
}
