//! Configuration for the process-wide durable store.
//!
//! On native targets the durable scope is a [`FileStore`](crate::store::FileStore).
//! Its location comes from, in order:
//! 1. a [`StoreConfig`] passed to [`configure`] before first use
//! 2. the `PANTRY_DURABLE_PATH` environment variable
//! 3. `<local data dir>/pantry/durable.json`

use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Environment variable overriding the durable store location.
pub const DURABLE_PATH_ENV: &str = "PANTRY_DURABLE_PATH";

static CONFIG: OnceLock<StoreConfig> = OnceLock::new();

/// Where the process-wide stores keep their data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// File backing the durable scope
    pub durable_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            durable_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pantry")
                .join("durable.json"),
        }
    }
}

impl StoreConfig {
    /// Defaults, with the durable path taken from `PANTRY_DURABLE_PATH` if set.
    pub fn from_env() -> Self {
        match std::env::var_os(DURABLE_PATH_ENV) {
            Some(path) if !path.is_empty() => Self {
                durable_path: PathBuf::from(path),
            },
            _ => Self::default(),
        }
    }

    pub fn with_durable_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.durable_path = path.into();
        self
    }
}

/// Set the configuration used when the durable store is first opened.
///
/// Fails once a configuration is in place, either from an earlier call or
/// because the durable store was already opened.
pub fn configure(config: StoreConfig) -> Result<(), StoreError> {
    CONFIG
        .set(config)
        .map_err(|_| StoreError::AlreadyInstalled("store configuration"))
}

/// The active configuration, read from the environment on first use.
pub fn current() -> &'static StoreConfig {
    CONFIG.get_or_init(StoreConfig::from_env)
}
