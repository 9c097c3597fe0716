//! Configuration and wiring for `printstream-licensectl`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use printstream_license::{
    EngineConfig, KeyCodec, LicenseEngine, NetworkTime, NetworkTimeConfig, SystemClock,
    TimeSource,
};
use printstream_storage::SqliteEntitlementStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings read from the optional JSON config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseCtlConfig {
    /// SQLite file holding the license state.
    pub database: PathBuf,
    /// Time providers.
    pub time: NetworkTimeConfig,
    /// Engine tunables.
    pub engine: EngineConfig,
    /// Skip the network and trust the local clock.
    pub offline: bool,
}

impl Default for LicenseCtlConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("printstream.db"),
            time: NetworkTimeConfig::default(),
            engine: EngineConfig::default(),
            offline: false,
        }
    }
}

impl LicenseCtlConfig {
    /// Loads the config at `path`. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Loads `path` when given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}

/// Time source selected by configuration.
pub enum Clock {
    /// Public time APIs with local fallback.
    Network(NetworkTime),
    /// The local clock only.
    Local(SystemClock),
}

impl Clock {
    /// Builds the clock for `config`.
    pub fn from_config(config: &LicenseCtlConfig) -> Self {
        if config.offline {
            Self::Local(SystemClock)
        } else {
            Self::Network(NetworkTime::new(config.time.clone()))
        }
    }
}

#[async_trait]
impl TimeSource for Clock {
    async fn now(&self) -> DateTime<Utc> {
        match self {
            Self::Network(oracle) => oracle.now().await,
            Self::Local(clock) => clock.now().await,
        }
    }
}

/// Engine over the SQLite store.
pub type Engine = LicenseEngine<SqliteEntitlementStore, Clock>;

/// Opens the store and builds the engine described by `config`.
pub fn open_engine(config: &LicenseCtlConfig) -> Result<Engine> {
    let store = SqliteEntitlementStore::open(&config.database).with_context(|| {
        format!("failed to open license store {}", config.database.display())
    })?;
    Ok(LicenseEngine::with_config(
        store,
        Clock::from_config(config),
        KeyCodec::default(),
        config.engine.clone(),
    ))
}
