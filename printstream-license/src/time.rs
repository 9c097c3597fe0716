//! Trusted-time acquisition.
//!
//! Trial and license expiry must not be extendable by rolling back the system
//! clock, so the engine asks a list of public time APIs first. Each provider is
//! queried with a bounded timeout; the first one that answers with a known
//! response shape wins. If they all fail the local clock is used, so startup is
//! never blocked for longer than `providers × timeout`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Something that can tell the current time.
#[async_trait]
pub trait TimeSource: Send + Sync {
    /// Returns the current time. Never fails.
    async fn now(&self) -> DateTime<Utc>;
}

/// The local system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl TimeSource for SystemClock {
    async fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A networked time API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeProvider {
    /// Name used in logs.
    pub name: String,
    /// Endpoint queried with a GET request.
    pub url: String,
}

impl TimeProvider {
    /// Creates a provider entry.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Configuration for [`NetworkTime`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkTimeConfig {
    /// Providers in the order they are tried.
    pub providers: Vec<TimeProvider>,
    /// Per-provider timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for NetworkTimeConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                TimeProvider::new(
                    "timeapi.io",
                    "https://timeapi.io/api/Time/current/zone?timeZone=UTC",
                ),
                TimeProvider::new(
                    "worldtimeapi",
                    "https://worldtimeapi.org/api/timezone/Etc/UTC",
                ),
                TimeProvider::new(
                    "linx",
                    "https://showcase.api.linx.twenty57.net/UnixTime/tounix",
                ),
            ],
            timeout_ms: 5_000,
        }
    }
}

impl NetworkTimeConfig {
    /// Returns the per-provider timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Upper bound on how long [`NetworkTime::fetch`] can take.
    #[must_use]
    pub fn worst_case(&self) -> Duration {
        self.timeout() * u32::try_from(self.providers.len()).unwrap_or(u32::MAX)
    }
}

/// Known provider response bodies, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `{"datetime": "2024-05-01T12:00:00.123+00:00"}`
    IsoDatetime,
    /// `{"dateTime": "2024-05-01T12:00:00.1234567"}`
    CamelDateTime,
    /// `{"formatted": "2024-05-01 12:00:00"}`
    Formatted,
    /// `{"timestamp": 1714564800}`
    UnixTimestamp,
    /// `1714564800`
    BareNumber,
}

impl ResponseShape {
    /// All shapes in matching order.
    pub const ALL: [Self; 5] = [
        Self::IsoDatetime,
        Self::CamelDateTime,
        Self::Formatted,
        Self::UnixTimestamp,
        Self::BareNumber,
    ];

    /// Extracts a timestamp if `body` has this shape.
    #[must_use]
    pub fn parse(self, body: &Value) -> Option<DateTime<Utc>> {
        match self {
            Self::IsoDatetime => body.get("datetime")?.as_str().and_then(parse_datetime),
            Self::CamelDateTime => body.get("dateTime")?.as_str().and_then(parse_datetime),
            Self::Formatted => body.get("formatted")?.as_str().and_then(parse_datetime),
            Self::UnixTimestamp => body.get("timestamp").and_then(unix_seconds),
            Self::BareNumber => unix_seconds(body),
        }
    }

    /// Tries every shape in order and returns the first match.
    #[must_use]
    pub fn parse_any(body: &Value) -> Option<(Self, DateTime<Utc>)> {
        Self::ALL
            .into_iter()
            .find_map(|shape| shape.parse(body).map(|time| (shape, time)))
    }
}

/// Parses RFC 3339, or a naive `T`/space separated datetime taken as UTC.
fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn unix_seconds(value: &Value) -> Option<DateTime<Utc>> {
    let millis = match value {
        Value::Number(n) => n
            .as_i64()
            .map(|secs| secs.checked_mul(1000))
            .unwrap_or_else(|| n.as_f64().map(|secs| (secs * 1000.0) as i64))?,
        _ => return None,
    };
    Utc.timestamp_millis_opt(millis).single()
}

/// Where a [`TimeReading`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeSourceKind {
    /// A network provider answered.
    Provider {
        /// Provider name.
        name: String,
        /// Shape its body matched.
        shape: ResponseShape,
    },
    /// Every provider failed; the system clock was used.
    LocalClock,
}

/// A point in time and the source that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeReading {
    /// The time obtained.
    pub time: DateTime<Utc>,
    /// Its provenance.
    pub source: TimeSourceKind,
}

impl TimeReading {
    /// Returns true if the reading came from a network provider.
    #[must_use]
    pub fn is_trusted(&self) -> bool {
        matches!(self.source, TimeSourceKind::Provider { .. })
    }
}

/// Time oracle backed by public time APIs.
pub struct NetworkTime {
    config: NetworkTimeConfig,
    client: Client,
}

impl NetworkTime {
    /// Creates an oracle with the given configuration.
    pub fn new(config: NetworkTimeConfig) -> Self {
        let client = Client::builder()
            .user_agent(concat!("printstream-license/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to configure HTTP client, using defaults: {e}");
                Client::new()
            });
        Self { config, client }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &NetworkTimeConfig {
        &self.config
    }

    /// Queries providers in order and falls back to the local clock.
    pub async fn fetch(&self) -> TimeReading {
        let timeout = self.config.timeout();
        for provider in &self.config.providers {
            match tokio::time::timeout(timeout, self.query(provider)).await {
                Ok(Some((shape, time))) => {
                    debug!(provider = %provider.name, ?shape, %time, "Network time acquired");
                    return TimeReading {
                        time,
                        source: TimeSourceKind::Provider {
                            name: provider.name.clone(),
                            shape,
                        },
                    };
                }
                Ok(None) => {}
                Err(_) => warn!(provider = %provider.name, "Time provider timed out"),
            }
        }

        warn!("All time providers failed, using local clock");
        TimeReading {
            time: Utc::now(),
            source: TimeSourceKind::LocalClock,
        }
    }

    /// One request against one provider. `None` means "try the next one".
    async fn query(&self, provider: &TimeProvider) -> Option<(ResponseShape, DateTime<Utc>)> {
        let response = self
            .client
            .get(&provider.url)
            .header("Accept", "application/json")
            .header("Cache-Control", "no-cache")
            .send()
            .await
            .map_err(|e| warn!(provider = %provider.name, "Time provider request failed: {e}"))
            .ok()?;

        let status = response.status();
        if !status.is_success() {
            warn!(provider = %provider.name, %status, "Time provider returned error status");
            return None;
        }

        let body = response
            .text()
            .await
            .map_err(|e| warn!(provider = %provider.name, "Failed to read time response: {e}"))
            .ok()?;

        let parsed = serde_json::from_str::<Value>(body.trim())
            .ok()
            .and_then(|value| ResponseShape::parse_any(&value));
        if parsed.is_none() {
            warn!(provider = %provider.name, "Unrecognised time response");
        }
        parsed
    }
}

impl Default for NetworkTime {
    fn default() -> Self {
        Self::new(NetworkTimeConfig::default())
    }
}

#[async_trait]
impl TimeSource for NetworkTime {
    async fn now(&self) -> DateTime<Utc> {
        self.fetch().await.time
    }
}
