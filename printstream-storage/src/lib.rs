//! SQLite storage for PrintStream license state.
//!
//! Implements [`printstream_license::EntitlementStore`] on a single SQLite
//! file. Redemptions run in one transaction so the replay check (a unique
//! constraint on key and installation) and the record update land together.

mod entitlement_store;
mod error;

pub use entitlement_store::SqliteEntitlementStore;
pub use error::{StorageError, StorageResult};
