//! Licensing and trial entitlement for PrintStream.
//!
//! This crate handles:
//! - Activation key generation and validation (shared with the vendor keygen)
//! - Trusted time acquisition from public time APIs with local fallback
//! - The entitlement state machine (trial, licensed, expired)
//! - Version-triggered extensions that reward keeping the app updated
//!
//! # Design Principles
//!
//! - **Fail-closed entitlement**: any store failure reports "not valid"
//! - **Fail-soft time**: unreachable time providers degrade to the local clock
//! - **Per-installation replay protection**: a key redeems once per install
//!
//! # Startup sequence
//!
//! The host calls [`LicenseEngine::check_and_update_version`] and then
//! [`LicenseEngine::check_license`]. Keys entered by the user go through
//! [`LicenseEngine::extend_license`].

mod engine;
mod error;
mod key;
mod record;
mod store;
mod time;
mod version;

pub use engine::{
    EngineConfig, LicenseCheck, LicenseEngine, LicenseState, LicenseStatus, days_until,
};
pub use error::{LicenseError, LicenseResult};
pub use key::{
    DAYS_FACTOR, DEFAULT_KEY_SECRET, KeyCodec, KeyValidation, decode_days, encode_days, hash32,
    normalize_key,
};
pub use record::{AppVersionEntry, DEFAULT_TRIAL_DAYS, LicenseRecord, UsedLicenseEntry};
pub use store::{EntitlementStore, MemoryStore};
pub use time::{
    NetworkTime, NetworkTimeConfig, ResponseShape, SystemClock, TimeProvider, TimeReading,
    TimeSource, TimeSourceKind,
};
pub use version::AppVersion;
