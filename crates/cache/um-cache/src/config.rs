//! Cache configuration
//!
//! Loading flow:
//! 1. Start with [`CacheConfig::default()`]
//! 2. If the TOML file exists, its values replace the defaults
//! 3. Environment variable overrides are applied last

use crate::error::ConfigError;
use crate::sync::DEFAULT_HOST_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::{env, fs};
use tracing::{debug, warn};

/// Environment variable overriding [`CacheConfig::initial_host_capacity`]
pub const ENV_INITIAL_HOST_CAPACITY: &str = "UMCACHE_INITIAL_HOST_CAPACITY";

/// Environment variable overriding [`CacheConfig::string_purge_interval`]
pub const ENV_STRING_PURGE_INTERVAL: &str = "UMCACHE_STRING_PURGE_INTERVAL";

/// Tuning knobs for [`crate::MacroCache`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Host slots reserved when the first snapshot is built
    pub initial_host_capacity: usize,
    /// Purge unreferenced strings every this many syncs; 0 disables purging
    pub string_purge_interval: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            initial_host_capacity: DEFAULT_HOST_CAPACITY,
            string_purge_interval: 16,
        }
    }
}

impl CacheConfig {
    /// Parses a TOML document; missing keys keep their defaults
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the document is not valid TOML or has
    /// unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads the config file at `path`, falling back to defaults if it does
    /// not exist, then applies environment overrides
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file exists but cannot be read and
    /// `ConfigError::Parse` if its contents are invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            debug!(?path, "loading macro cache config");
            let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_toml_str(&text)?
        } else {
            debug!(?path, "macro cache config not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies `UMCACHE_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Applies overrides read through `lookup`; invalid values are ignored
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = parse_override(&lookup, ENV_INITIAL_HOST_CAPACITY) {
            self.initial_host_capacity = value;
        }
        if let Some(value) = parse_override(&lookup, ENV_STRING_PURGE_INTERVAL) {
            self.string_purge_interval = value;
        }
    }
}

fn parse_override<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "invalid env var, ignoring");
            None
        }
    }
}
