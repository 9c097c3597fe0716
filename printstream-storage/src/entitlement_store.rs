//! SQLite-backed [`EntitlementStore`].
//!
//! Three tables back the license subsystem:
//! - `license`: the singleton record (row id pinned to 1)
//! - `used_licenses`: the anti-replay ledger, unique per key and installation
//! - `app_versions`: every version transition seen on this installation

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use printstream_license::{
    AppVersion, AppVersionEntry, EntitlementStore, LicenseError, LicenseRecord, LicenseResult,
    UsedLicenseEntry,
};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Persistent entitlement store backed by SQLite.
#[derive(Clone)]
pub struct SqliteEntitlementStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEntitlementStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        debug!(path = %path.display(), "Opened entitlement store");
        Self::from_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StorageResult<()> {
        self.lock()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS license (
                id                INTEGER PRIMARY KEY CHECK (id = 1),
                installation_date TEXT    NOT NULL,
                expiry_date       TEXT    NOT NULL,
                license_key       TEXT,
                installation_id   TEXT
            );

            CREATE TABLE IF NOT EXISTS used_licenses (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                license_key     TEXT    NOT NULL,
                first_used_date TEXT    NOT NULL,
                installation_id TEXT    NOT NULL,
                UNIQUE(license_key, installation_id)
            );

            CREATE TABLE IF NOT EXISTS app_versions (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                version         TEXT    NOT NULL,
                installation_id TEXT    NOT NULL,
                recorded_at     TEXT    NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    // ── License record ───────────────────────────────────────────

    fn read_record(conn: &Connection) -> StorageResult<Option<LicenseRecord>> {
        let row = conn
            .query_row(
                "SELECT installation_date, expiry_date, license_key, installation_id
                 FROM license WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(installed, expiry, license_key, installation_id)| -> StorageResult<_> {
            Ok(LicenseRecord {
                license_key,
                expiry_date: parse_timestamp(&expiry)?,
                installation_id,
                installation_date: parse_timestamp(&installed)?,
            })
        })
        .transpose()
    }

    /// Reads the license record.
    pub fn record(&self) -> StorageResult<Option<LicenseRecord>> {
        let conn = self.lock()?;
        Self::read_record(&conn)
    }

    fn insert_record_if_absent(&self, record: &LicenseRecord) -> StorageResult<LicenseRecord> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO license
                (id, installation_date, expiry_date, license_key, installation_id)
             VALUES (1, ?1, ?2, ?3, ?4)",
            params![
                record.installation_date.to_rfc3339(),
                record.expiry_date.to_rfc3339(),
                record.license_key,
                record.installation_id,
            ],
        )?;
        Self::read_record(&conn)?.ok_or(StorageError::MissingRecord)
    }

    fn set_installation_id_if_absent(&self, candidate: &str) -> StorageResult<String> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE license SET installation_id = ?1 WHERE id = 1 AND installation_id IS NULL",
            params![candidate],
        )?;
        conn.query_row(
            "SELECT installation_id FROM license WHERE id = 1",
            [],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?
        .flatten()
        .ok_or(StorageError::MissingRecord)
    }

    fn update_expiry(&self, expiry: DateTime<Utc>) -> StorageResult<()> {
        let updated = self.lock()?.execute(
            "UPDATE license SET expiry_date = ?1 WHERE id = 1",
            params![expiry.to_rfc3339()],
        )?;
        if updated == 0 {
            return Err(StorageError::MissingRecord);
        }
        Ok(())
    }

    // ── Redemption ledger ────────────────────────────────────────

    fn used_key(
        &self,
        license_key: &str,
        installation_id: &str,
    ) -> StorageResult<Option<UsedLicenseEntry>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT license_key, first_used_date, installation_id FROM used_licenses
                 WHERE license_key = ?1 AND installation_id = ?2",
                params![license_key, installation_id],
                used_entry_columns,
            )
            .optional()?;
        row.map(used_entry_from_columns).transpose()
    }

    /// Lists every redeemed key, oldest first.
    pub fn used_keys(&self) -> StorageResult<Vec<UsedLicenseEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT license_key, first_used_date, installation_id FROM used_licenses
             ORDER BY id",
        )?;
        let rows = stmt.query_map([], used_entry_columns)?;
        rows.map(|row| -> StorageResult<_> { used_entry_from_columns(row?) })
            .collect()
    }

    fn redeem(&self, entry: &UsedLicenseEntry, new_expiry: DateTime<Utc>) -> LicenseResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StorageError::from)?;

        let inserted = tx.execute(
            "INSERT INTO used_licenses (license_key, first_used_date, installation_id)
             VALUES (?1, ?2, ?3)",
            params![
                entry.license_key,
                entry.first_used_date.to_rfc3339(),
                entry.installation_id,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(LicenseError::KeyAlreadyUsed {
                    installation_id: entry.installation_id.clone(),
                });
            }
            Err(e) => return Err(StorageError::from(e).into()),
        }

        let updated = tx
            .execute(
                "UPDATE license SET license_key = ?1, expiry_date = ?2 WHERE id = 1",
                params![entry.license_key, new_expiry.to_rfc3339()],
            )
            .map_err(StorageError::from)?;
        if updated == 0 {
            return Err(StorageError::MissingRecord.into());
        }

        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    // ── Version history ──────────────────────────────────────────

    fn last_version(&self) -> StorageResult<Option<AppVersionEntry>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT version, installation_id, recorded_at FROM app_versions
                 ORDER BY id DESC LIMIT 1",
                [],
                version_columns,
            )
            .optional()?;
        row.map(version_from_columns).transpose()
    }

    /// Lists the version history, oldest first.
    pub fn versions(&self) -> StorageResult<Vec<AppVersionEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT version, installation_id, recorded_at FROM app_versions ORDER BY id",
        )?;
        let rows = stmt.query_map([], version_columns)?;
        rows.map(|row| -> StorageResult<_> { version_from_columns(row?) })
            .collect()
    }

    fn insert_version(&self, entry: &AppVersionEntry) -> StorageResult<()> {
        self.lock()?.execute(
            "INSERT INTO app_versions (version, installation_id, recorded_at)
             VALUES (?1, ?2, ?3)",
            params![
                entry.version.to_string(),
                entry.installation_id,
                entry.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

type Columns = (String, String, String);

fn used_entry_columns(row: &Row<'_>) -> rusqlite::Result<Columns> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn used_entry_from_columns(
    (license_key, first_used, installation_id): Columns,
) -> StorageResult<UsedLicenseEntry> {
    Ok(UsedLicenseEntry {
        license_key,
        first_used_date: parse_timestamp(&first_used)?,
        installation_id,
    })
}

fn version_columns(row: &Row<'_>) -> rusqlite::Result<Columns> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn version_from_columns(
    (version, installation_id, recorded_at): Columns,
) -> StorageResult<AppVersionEntry> {
    Ok(AppVersionEntry {
        version: AppVersion::parse(&version)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?,
        installation_id,
        recorded_at: parse_timestamp(&recorded_at)?,
    })
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("bad timestamp {raw:?}: {e}")))
}

#[async_trait]
impl EntitlementStore for SqliteEntitlementStore {
    async fn load_record(&self) -> LicenseResult<Option<LicenseRecord>> {
        Ok(self.record()?)
    }

    async fn init_record(&self, record: &LicenseRecord) -> LicenseResult<LicenseRecord> {
        Ok(self.insert_record_if_absent(record)?)
    }

    async fn claim_installation_id(&self, candidate: &str) -> LicenseResult<String> {
        Ok(self.set_installation_id_if_absent(candidate)?)
    }

    async fn set_expiry(&self, expiry: DateTime<Utc>) -> LicenseResult<()> {
        Ok(self.update_expiry(expiry)?)
    }

    async fn find_used_key(
        &self,
        license_key: &str,
        installation_id: &str,
    ) -> LicenseResult<Option<UsedLicenseEntry>> {
        Ok(self.used_key(license_key, installation_id)?)
    }

    async fn commit_redemption(
        &self,
        entry: &UsedLicenseEntry,
        new_expiry: DateTime<Utc>,
    ) -> LicenseResult<()> {
        self.redeem(entry, new_expiry)
    }

    async fn latest_version(&self) -> LicenseResult<Option<AppVersionEntry>> {
        Ok(self.last_version()?)
    }

    async fn record_version(&self, entry: &AppVersionEntry) -> LicenseResult<()> {
        Ok(self.insert_version(entry)?)
    }
}
