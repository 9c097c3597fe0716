//! Error types for the licensing module.

use thiserror::Error;

/// Licensing-specific errors.
///
/// Engine entry points never surface these to the host; they are logged and
/// folded into fail-closed results. They exist so the store contract and the
/// internal steps can report failure distinctly from "not found".
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Invalid license key format.
    #[error("invalid license key format: {0}")]
    InvalidKeyFormat(String),

    /// The key has already been redeemed on this installation.
    #[error("license key already used on installation {installation_id}")]
    KeyAlreadyUsed {
        /// Installation that redeemed the key.
        installation_id: String,
    },

    /// Version string is not `major.minor.patch`.
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
