//! Settings file plus environment overrides.
//!
//! Resolution order, lowest to highest: built-in defaults, the optional TOML
//! settings file, `MATTERS_*` environment variables (including those loaded
//! from `.env`), then command-line flags applied by the binary.

mod helpers;
mod store;

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

pub use store::{ServerConfig, StoreConfig};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub source_path: String,
    pub db_path: String,
    pub locator_base: String,
    pub seed_if_missing: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            source_path: "litify_matters.csv".to_string(),
            db_path: "legal_matters.db".to_string(),
            locator_base: crate::store::DEFAULT_LOCATOR_BASE.to_string(),
            seed_if_missing: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
        }
    }
}

impl Settings {
    /// Read settings from `path`, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|message| ConfigError::ParseFile {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, String> {
        toml::from_str(raw).map_err(|e| e.to_string())
    }
}
