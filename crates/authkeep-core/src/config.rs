//! Session configuration management.
//!
//! This module handles loading and saving the session configuration: the
//! authentication URL, the liveness window, extra headers for authenticated
//! requests and the base URL relative paths resolve against.
//!
//! Configuration is stored at `~/.config/authkeep/config.json` and written
//! with defaults on first load; a handful of fields can be overridden from
//! the environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "authkeep";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default verification endpoint, relative to the base URL
pub const DEFAULT_AUTHENTICATE_URL: &str = "/api/authenticate";

/// Default liveness window: three hours of inactivity
pub const DEFAULT_SESSION_MINUTES: f64 = 180.0;

/// Default period of the background liveness check
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

pub const DEFAULT_BASE_URL: &str = "http://localhost/";

pub const ENV_AUTHENTICATE_URL: &str = "AUTHKEEP_AUTHENTICATE_URL";
pub const ENV_BASE_URL: &str = "AUTHKEEP_BASE_URL";
pub const ENV_SESSION_MINUTES: &str = "AUTHKEEP_SESSION_MINUTES";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub authenticate_url: String,
    pub session_minutes: f64,
    /// Extra headers attached to every authenticated request
    pub headers: HashMap<String, String>,
    /// Context relative URLs resolve against; its host is the default endpoint
    pub base_url: String,
    pub check_interval_secs: u64,
    /// Timeout for requests made through the authenticated client
    pub request_timeout_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            authenticate_url: DEFAULT_AUTHENTICATE_URL.to_string(),
            session_minutes: DEFAULT_SESSION_MINUTES,
            headers: HashMap::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            request_timeout_secs: None,
        }
    }
}

impl SessionConfig {
    /// Load from the default location, writing a default config there first
    /// when none exists
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) => Self::load_or_create(&path),
            None => {
                warn!("Could not find config directory, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Like [`SessionConfig::load_from`], but a missing file is created with
    /// the defaults. Failing to write it only warns.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::load_from(path);
        }
        let config = Self::default();
        match config.save_to(path) {
            Ok(()) => debug!(?path, "Created default config"),
            Err(e) => warn!(?path, error = %e, "Could not write default config"),
        }
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join(APP_NAME))
    }

    /// Apply environment overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any variable source. Unparseable values are
    /// ignored with a warning.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_AUTHENTICATE_URL) {
            self.authenticate_url = url;
        }
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(raw) = lookup(ENV_SESSION_MINUTES) {
            match raw.trim().parse::<f64>() {
                Ok(minutes) if minutes.is_finite() => self.session_minutes = minutes,
                _ => warn!(value = %raw, "Ignoring invalid {}", ENV_SESSION_MINUTES),
            }
        }
        self
    }
}
