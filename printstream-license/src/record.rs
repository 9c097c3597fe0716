//! Persisted entitlement records.

use crate::version::AppVersion;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Length of the trial granted on first run.
pub const DEFAULT_TRIAL_DAYS: i64 = 30;

/// The singleton license row of an installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// Last redeemed activation key, `None` while in trial.
    pub license_key: Option<String>,
    /// When the current entitlement ends.
    pub expiry_date: DateTime<Utc>,
    /// Installation identity, generated lazily on first use.
    pub installation_id: Option<String>,
    /// When the record was first created.
    pub installation_date: DateTime<Utc>,
}

impl LicenseRecord {
    /// Creates a fresh trial record starting at `now`.
    #[must_use]
    pub fn trial(now: DateTime<Utc>, trial_days: i64) -> Self {
        Self {
            license_key: None,
            expiry_date: now + Duration::days(trial_days),
            installation_id: None,
            installation_date: now,
        }
    }

    /// Returns true when no activation key has been applied.
    #[must_use]
    pub fn is_trial(&self) -> bool {
        self.license_key.is_none()
    }
}

/// A key redeemed on this installation (anti-replay ledger row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedLicenseEntry {
    /// The redeemed key, normalized.
    pub license_key: String,
    /// When the key was redeemed.
    pub first_used_date: DateTime<Utc>,
    /// Installation that redeemed the key.
    pub installation_id: String,
}

/// A version transition observed on this installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppVersionEntry {
    /// The version that started running.
    pub version: AppVersion,
    /// Installation that ran it.
    pub installation_id: String,
    /// When the transition was recorded.
    pub recorded_at: DateTime<Utc>,
}
