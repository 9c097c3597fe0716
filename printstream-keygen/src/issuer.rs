//! Key issuance and the append-only issuance log.

use crate::error::{IssuerError, IssuerResult};
use chrono::{DateTime, Utc};
use printstream_license::KeyCodec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

/// Longest duration a single key may grant (ten years).
pub const MAX_ISSUE_DAYS: u32 = 3650;

/// One issued key as stored in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedKey {
    /// Customer the key was issued to.
    pub customer_id: String,
    /// Days granted.
    pub days: u32,
    /// The activation key.
    pub license_key: String,
    /// When the key was issued.
    #[serde(rename = "generatedAt", alias = "issuedAt")]
    pub issued_at: DateTime<Utc>,
}

/// JSON file holding every key issued so far.
#[derive(Debug)]
pub struct IssuanceLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl IssuanceLog {
    /// Uses the log at `path`. The file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every record, oldest first. A missing file is an empty log.
    pub fn load(&self) -> IssuerResult<Vec<IssuedKey>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Appends a record and rewrites the file.
    pub fn append(&self, record: &IssuedKey) -> IssuerResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| IssuerError::LockPoisoned)?;
        let mut records = self.load()?;
        records.push(record.clone());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&records)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Generates keys and records them in the issuance log.
#[derive(Debug)]
pub struct Issuer {
    codec: KeyCodec,
    log: IssuanceLog,
}

impl Issuer {
    /// Creates an issuer writing to `log`.
    pub fn new(codec: KeyCodec, log: IssuanceLog) -> Self {
        Self { codec, log }
    }

    /// Returns the issuance log.
    pub fn log(&self) -> &IssuanceLog {
        &self.log
    }

    /// Issues a key for `customer_id` granting `days` days.
    ///
    /// # Errors
    ///
    /// Rejects blank customer ids and day counts outside `1..=MAX_ISSUE_DAYS`,
    /// and fails if the log cannot be written.
    pub fn issue(&self, customer_id: &str, days: i64) -> IssuerResult<IssuedKey> {
        let customer_id = customer_id.trim();
        if customer_id.is_empty() {
            return Err(IssuerError::EmptyCustomer);
        }
        let days = u32::try_from(days)
            .ok()
            .filter(|d| (1..=MAX_ISSUE_DAYS).contains(d))
            .ok_or(IssuerError::InvalidDays {
                days,
                max: MAX_ISSUE_DAYS,
            })?;

        let record = IssuedKey {
            customer_id: customer_id.to_string(),
            days,
            license_key: self.codec.generate_key(days, customer_id),
            issued_at: Utc::now(),
        };
        self.log.append(&record)?;
        info!(customer = %record.customer_id, days, "Issued license key");
        Ok(record)
    }

    /// Lists previously issued keys, oldest first.
    pub fn list(&self) -> IssuerResult<Vec<IssuedKey>> {
        self.log.load()
    }
}
