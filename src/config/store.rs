use std::net::SocketAddr;
use std::path::PathBuf;

use crate::config::Settings;
use crate::config::helpers::{optional_env, parse_bool_env, parse_string_env};
use crate::error::ConfigError;

/// Where the matter store reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub source_path: PathBuf,
    pub db_path: PathBuf,
    pub locator_base: String,
    pub seed_if_missing: bool,
}

/// HTTP query endpoint settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

fn validate_file_path(key: &str, raw: &str) -> Result<PathBuf, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "path must not be empty".to_string(),
        });
    }
    if trimmed.ends_with('/') || trimmed.ends_with('\\') {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "path must name a file, not a directory".to_string(),
        });
    }
    Ok(PathBuf::from(trimmed))
}

fn validate_locator_base(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('/') {
        return Err(ConfigError::InvalidValue {
            key: "MATTERS_LOCATOR_BASE".to_string(),
            message: "locator base must start with '/'".to_string(),
        });
    }
    if trimmed
        .chars()
        .any(|c| c.is_whitespace() || c == '?' || c == '#')
    {
        return Err(ConfigError::InvalidValue {
            key: "MATTERS_LOCATOR_BASE".to_string(),
            message: "locator base must be a bare path without whitespace, query or fragment"
                .to_string(),
        });
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

fn validate_bind(raw: &str) -> Result<SocketAddr, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue {
            key: "MATTERS_BIND".to_string(),
            message: format!("'{}' is not a socket address: {e}", raw.trim()),
        })
}

impl StoreConfig {
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            source_path: {
                let raw =
                    parse_string_env("MATTERS_SOURCE_PATH", settings.store.source_path.clone())?;
                validate_file_path("MATTERS_SOURCE_PATH", &raw)?
            },
            db_path: {
                let raw = parse_string_env("MATTERS_DB_PATH", settings.store.db_path.clone())?;
                validate_file_path("MATTERS_DB_PATH", &raw)?
            },
            locator_base: {
                let raw = parse_string_env(
                    "MATTERS_LOCATOR_BASE",
                    settings.store.locator_base.clone(),
                )?;
                validate_locator_base(&raw)?
            },
            seed_if_missing: parse_bool_env(
                "MATTERS_SEED_IF_MISSING",
                settings.store.seed_if_missing,
            )?,
        })
    }

    /// Apply command-line overrides on top of the resolved values.
    pub fn with_overrides(
        mut self,
        source_path: Option<PathBuf>,
        db_path: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = source_path {
            self.source_path = validate_file_path("--source", &path.to_string_lossy())?;
        }
        if let Some(path) = db_path {
            self.db_path = validate_file_path("--db", &path.to_string_lossy())?;
        }
        Ok(self)
    }
}

impl ServerConfig {
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let raw = optional_env("MATTERS_BIND")?.unwrap_or_else(|| settings.server.bind.clone());
        Ok(Self {
            bind: validate_bind(&raw)?,
        })
    }
}
