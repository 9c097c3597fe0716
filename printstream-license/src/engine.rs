//! The entitlement state machine.
//!
//! An installation is in one of three states:
//! - **Trial**: no activation key applied, bounded by the record's expiry.
//! - **Licensed**: a key is applied, passes validation and has not expired.
//! - **Expired**: past the expiry date, or the stored key fails validation.
//!
//! Every public operation is fail-closed: store failures are logged and turn
//! into "not valid" / "not applied" results instead of errors.

use crate::error::{LicenseError, LicenseResult};
use crate::key::{KeyCodec, KeyValidation, normalize_key};
use crate::record::{AppVersionEntry, DEFAULT_TRIAL_DAYS, LicenseRecord, UsedLicenseEntry};
use crate::store::EntitlementStore;
use crate::time::TimeSource;
use crate::version::AppVersion;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Tunables for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Trial length granted on first run.
    pub trial_days: i64,
    /// Minimum runway guaranteed after an upgrade is detected.
    pub upgrade_runway_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trial_days: DEFAULT_TRIAL_DAYS,
            upgrade_runway_days: 30,
        }
    }
}

/// Entitlement state of an installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseState {
    /// No key applied and the trial is running.
    Trial,
    /// A valid key is applied and has not expired.
    Licensed,
    /// Not authorized to run.
    Expired,
}

/// Result of a license check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseCheck {
    /// Whether the installation may run.
    pub is_valid: bool,
    /// Whole days left, rounded up and never negative.
    pub days_left: u32,
    /// The state the check resolved to.
    pub state: LicenseState,
}

impl LicenseCheck {
    /// The fail-closed result.
    pub const DENIED: Self = Self {
        is_valid: false,
        days_left: 0,
        state: LicenseState::Expired,
    };
}

/// A license check together with the record it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseStatus {
    /// The check result.
    pub check: LicenseCheck,
    /// The stored record.
    pub record: LicenseRecord,
    /// Time the check was evaluated at.
    pub checked_at: DateTime<Utc>,
}

/// Signed whole days from `now` until `expiry`, rounded up.
#[must_use]
pub fn days_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (expiry - now).num_milliseconds();
    millis.div_euclid(MILLIS_PER_DAY) + i64::from(millis.rem_euclid(MILLIS_PER_DAY) > 0)
}

/// Decides whether the installation is authorized and manages extensions.
pub struct LicenseEngine<S, T> {
    store: S,
    clock: T,
    codec: KeyCodec,
    config: EngineConfig,
    redeem_lock: Mutex<()>,
}

impl<S: EntitlementStore, T: TimeSource> LicenseEngine<S, T> {
    /// Creates an engine with the default codec and configuration.
    pub fn new(store: S, clock: T) -> Self {
        Self::with_config(store, clock, KeyCodec::default(), EngineConfig::default())
    }

    /// Creates an engine with an explicit codec and configuration.
    pub fn with_config(store: S, clock: T, codec: KeyCodec, config: EngineConfig) -> Self {
        Self {
            store,
            clock,
            codec,
            config,
            redeem_lock: Mutex::new(()),
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the key codec.
    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Checks whether the installation is currently authorized.
    pub async fn check_license(&self) -> LicenseCheck {
        match self.status().await {
            Ok(status) => status.check,
            Err(e) => {
                error!("License check failed: {e}");
                LicenseCheck::DENIED
            }
        }
    }

    /// Like [`check_license`](Self::check_license) but also returns the record.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the record cannot be read.
    pub async fn status(&self) -> LicenseResult<LicenseStatus> {
        let now = self.clock.now().await;
        let record = self.load_or_init_record(now).await?;
        let check = self.evaluate(&record, now);
        Ok(LicenseStatus {
            check,
            record,
            checked_at: now,
        })
    }

    /// Redeems an activation key, extending the expiry by the key's days.
    ///
    /// Returns false when the key is malformed, was already redeemed on this
    /// installation, or the store fails.
    pub async fn extend_license(&self, key: &str) -> bool {
        let key = normalize_key(key);
        match self.try_extend_license(&key).await {
            Ok(new_expiry) => {
                info!(%new_expiry, "License extended");
                true
            }
            Err(LicenseError::KeyAlreadyUsed { installation_id }) => {
                warn!(%installation_id, "Rejected license key: already used on this installation");
                false
            }
            Err(LicenseError::InvalidKeyFormat(reason)) => {
                warn!("Rejected license key: {reason}");
                false
            }
            Err(e) => {
                error!("Failed to extend license: {e}");
                false
            }
        }
    }

    async fn try_extend_license(&self, key: &str) -> LicenseResult<DateTime<Utc>> {
        let _guard = self.redeem_lock.lock().await;
        let now = self.clock.now().await;
        let record = self.load_or_init_record(now).await?;
        let installation_id = self.resolve_installation_id(&record).await?;

        if self.store.find_used_key(key, &installation_id).await?.is_some() {
            return Err(LicenseError::KeyAlreadyUsed { installation_id });
        }

        let days = match self.codec.validate_key(key) {
            KeyValidation {
                valid: true,
                days: Some(days),
            } => days,
            _ => {
                return Err(LicenseError::InvalidKeyFormat(
                    "checksum or structure mismatch".to_string(),
                ));
            }
        };

        let new_expiry = record.expiry_date + Duration::days(i64::from(days));
        let entry = UsedLicenseEntry {
            license_key: key.to_string(),
            first_used_date: now,
            installation_id,
        };
        self.store.commit_redemption(&entry, new_expiry).await?;
        debug!(days, "Recorded key redemption");
        Ok(new_expiry)
    }

    /// Records the running version and extends the entitlement on upgrade.
    ///
    /// Returns true if the expiry date was moved as a side effect. The first
    /// version ever seen is recorded without extending anything.
    pub async fn check_and_update_version(&self, current_version: &str) -> bool {
        let version = match AppVersion::parse(current_version) {
            Ok(version) => version,
            Err(e) => {
                warn!("Skipping version check: {e}");
                return false;
            }
        };
        match self.try_check_and_update_version(version).await {
            Ok(extended) => extended,
            Err(e) => {
                error!("Version check failed: {e}");
                false
            }
        }
    }

    async fn try_check_and_update_version(&self, version: AppVersion) -> LicenseResult<bool> {
        let now = self.clock.now().await;
        let record = self.load_or_init_record(now).await?;
        let installation_id = self.resolve_installation_id(&record).await?;

        let previous = self.store.latest_version().await?;
        let entry = AppVersionEntry {
            version,
            installation_id,
            recorded_at: now,
        };

        let Some(previous) = previous else {
            info!(%version, "First run, recording version");
            self.store.record_version(&entry).await?;
            return Ok(false);
        };
        if version <= previous.version {
            debug!(%version, previous = %previous.version, "Version not newer");
            return Ok(false);
        }

        info!(%version, previous = %previous.version, "Upgrade detected");
        self.store.record_version(&entry).await?;

        let runway = now + Duration::days(self.config.upgrade_runway_days);
        if record.is_trial() {
            self.store.set_expiry(runway).await?;
            return Ok(true);
        }

        let check = self.evaluate(&record, now);
        if i64::from(check.days_left) < self.config.upgrade_runway_days {
            self.store.set_expiry(runway).await?;
            return Ok(true);
        }
        Ok(false)
    }

    fn evaluate(&self, record: &LicenseRecord, now: DateTime<Utc>) -> LicenseCheck {
        let state = match &record.license_key {
            None => LicenseState::Trial,
            Some(key) if self.codec.validate_key(key).valid => LicenseState::Licensed,
            Some(_) => {
                warn!("Stored license key failed validation");
                return LicenseCheck::DENIED;
            }
        };

        let days = days_until(record.expiry_date, now);
        if days > 0 {
            LicenseCheck {
                is_valid: true,
                days_left: u32::try_from(days).unwrap_or(u32::MAX),
                state,
            }
        } else {
            LicenseCheck::DENIED
        }
    }

    async fn load_or_init_record(&self, now: DateTime<Utc>) -> LicenseResult<LicenseRecord> {
        if let Some(record) = self.store.load_record().await? {
            return Ok(record);
        }
        info!("No license record found, starting trial");
        let trial = LicenseRecord::trial(now, self.config.trial_days);
        self.store.init_record(&trial).await
    }

    async fn resolve_installation_id(&self, record: &LicenseRecord) -> LicenseResult<String> {
        if let Some(id) = &record.installation_id {
            return Ok(id.clone());
        }
        let candidate = uuid::Uuid::new_v4().to_string();
        let id = self.store.claim_installation_id(&candidate).await?;
        info!(installation_id = %id, "Installation id assigned");
        Ok(id)
    }
}
