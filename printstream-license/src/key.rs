//! Activation key encoding and validation.
//!
//! Keys use the format `XXXX-YYYY-ZZZZ-WWWW`:
//! - `XXXX`: first four hex chars of the customer id hash
//! - `YYYY`: the day count, scaled by [`DAYS_FACTOR`] and hex encoded
//!   (may be longer than four chars for large day counts)
//! - `ZZZZ-WWWW`: checksum over the first two segments plus the shared secret
//!
//! The scheme is obfuscation only. The secret is baked into both the issuing
//! tool and the application, so anyone holding a binary can mint keys.

use serde::{Deserialize, Serialize};

/// Multiplier applied to the day count before hex encoding.
pub const DAYS_FACTOR: u64 = 7919;

/// Shared literal used when no secret is supplied at build time.
const FALLBACK_SECRET: &str = "PrintStream-Secret-Key";

/// Secret mixed into every checksum.
///
/// Set `PRINTSTREAM_KEY_SECRET` when compiling to override it. The issuer and
/// the application must be built with the same value.
pub const DEFAULT_KEY_SECRET: &str = match option_env!("PRINTSTREAM_KEY_SECRET") {
    Some(secret) => secret,
    None => FALLBACK_SECRET,
};

/// Maximum hex digits accepted for the encoded day segment.
const MAX_DAYS_DIGITS: usize = 8;

/// Rolling 32-bit string hash (`h = h * 31 + c`) over UTF-16 code units.
///
/// Arithmetic wraps like a two's-complement `i32`. The absolute value is
/// rendered as eight lowercase hex digits.
#[must_use]
pub fn hash32(input: &str) -> String {
    let hash = input
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
    format!("{:08x}", hash.unsigned_abs())
}

/// Encodes a day count as `hex(days * DAYS_FACTOR)`, padded to four chars.
#[must_use]
pub fn encode_days(days: u32) -> String {
    format!("{:04x}", u64::from(days) * DAYS_FACTOR)
}

/// Decodes a day segment produced by [`encode_days`].
///
/// Returns `None` when the segment is not hex. Inputs not produced by
/// [`encode_days`] decode to the floor of the quotient.
#[must_use]
pub fn decode_days(encoded: &str) -> Option<u64> {
    u64::from_str_radix(encoded, 16)
        .ok()
        .map(|value| value / DAYS_FACTOR)
}

/// Outcome of validating an activation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValidation {
    /// Whether the key passed every structural and checksum check.
    pub valid: bool,
    /// Day count carried by the key, present only when valid.
    pub days: Option<u32>,
}

impl KeyValidation {
    const INVALID: Self = Self {
        valid: false,
        days: None,
    };

    fn valid(days: u32) -> Self {
        Self {
            valid: true,
            days: Some(days),
        }
    }
}

/// Key generator and validator bound to one shared secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    secret: String,
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_SECRET)
    }
}

impl KeyCodec {
    /// Creates a codec using the given shared secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Computes the eight-char checksum of `input`.
    #[must_use]
    pub fn checksum(&self, input: &str) -> String {
        hash32(&format!("{input}{}", self.secret))
    }

    /// Generates a key granting `days` days for `customer_id`.
    #[must_use]
    pub fn generate_key(&self, days: u32, customer_id: &str) -> String {
        let customer_hash = hash32(customer_id);
        let customer_hash = &customer_hash[..4];
        let days_encoded = encode_days(days);
        let checksum = self.checksum(&format!("{customer_hash}{days_encoded}"));
        format!(
            "{customer_hash}-{days_encoded}-{}-{}",
            &checksum[..4],
            &checksum[4..8]
        )
    }

    /// Validates a key and extracts its day count.
    ///
    /// Never fails loudly: malformed input yields an invalid result. Surrounding
    /// whitespace and letter case are ignored.
    #[must_use]
    pub fn validate_key(&self, key: &str) -> KeyValidation {
        let key = normalize_key(key);
        let parts: Vec<&str> = key.split('-').collect();
        let [customer_hash, days_encoded, check_a, check_b] = parts.as_slice() else {
            return KeyValidation::INVALID;
        };

        if !is_hex(customer_hash, 4..=4)
            || !is_hex(days_encoded, 1..=MAX_DAYS_DIGITS)
            || !is_hex(check_a, 4..=4)
            || !is_hex(check_b, 4..=4)
        {
            return KeyValidation::INVALID;
        }

        let expected = self.checksum(&format!("{customer_hash}{days_encoded}"));
        if format!("{check_a}{check_b}") != expected {
            return KeyValidation::INVALID;
        }

        match decode_days(days_encoded).and_then(|d| u32::try_from(d).ok()) {
            Some(days) if days > 0 => KeyValidation::valid(days),
            _ => KeyValidation::INVALID,
        }
    }
}

/// Trims and lowercases a key so equivalent spellings compare equal.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

fn is_hex(segment: &str, len: std::ops::RangeInclusive<usize>) -> bool {
    len.contains(&segment.len()) && segment.bytes().all(|b| b.is_ascii_hexdigit())
}
