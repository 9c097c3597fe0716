//! Error types for the key issuer.

use thiserror::Error;

/// Result type for issuer operations.
pub type IssuerResult<T> = Result<T, IssuerError>;

/// Errors raised while issuing keys or touching the issuance log.
#[derive(Debug, Error)]
pub enum IssuerError {
    /// Customer identifier missing or blank.
    #[error("customer id must not be empty")]
    EmptyCustomer,

    /// Day count outside the issuable range.
    #[error("days must be between 1 and {max}, got {days}")]
    InvalidDays {
        /// Requested day count.
        days: i64,
        /// Largest issuable day count.
        max: u32,
    },

    /// IO error on the issuance log.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Issuance log is not valid JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The log mutex was poisoned.
    #[error("issuance log lock poisoned")]
    LockPoisoned,
}

impl IssuerError {
    /// True when the caller supplied bad input, as opposed to a log failure.
    #[must_use]
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Self::EmptyCustomer | Self::InvalidDays { .. })
    }
}
