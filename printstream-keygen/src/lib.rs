//! Vendor-side activation key issuer for PrintStream.
//!
//! Runs disconnected from any installation: it generates keys with the same
//! codec the application validates with and keeps an audit log of what was
//! issued to whom. It never sees an installation's license record or ledger.

pub mod api;
mod error;
mod issuer;

pub use api::build_router;
pub use error::{IssuerError, IssuerResult};
pub use issuer::{IssuanceLog, IssuedKey, Issuer, MAX_ISSUE_DAYS};
