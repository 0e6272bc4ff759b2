//! Local credential store and sync timing settings.
//!
//! `AppConfig` is read once at startup to decide whether a remote store is
//! configured and which session to resume. A missing or unreadable file is
//! never an error: it just means "no remote, no session".

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::RemoteConfig;
use crate::error::Result;
use crate::util::normalize_text_option;

const CONFIG_DIR_NAME: &str = "tasker";
const CONFIG_FILE_NAME: &str = "config.json";
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 5;

pub const REMOTE_URL_ENV: &str = "TASKER_REMOTE_URL";
pub const REMOTE_TOKEN_ENV: &str = "TASKER_REMOTE_TOKEN";

#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub remote_auth_token: Option<String>,
    /// Token of the session to resume on this machine
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub probe_interval_secs: Option<u64>,
    #[serde(default)]
    pub remote_timeout_secs: Option<u64>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("remote_url", &self.remote_url)
            .field(
                "remote_auth_token",
                &self.remote_auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("probe_interval_secs", &self.probe_interval_secs)
            .field("remote_timeout_secs", &self.remote_timeout_secs)
            .finish()
    }
}

/// How often the monitor probes and how long a remote call may take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTimings {
    pub probe_interval: Duration,
    pub remote_timeout: Duration,
}

impl Default for SyncTimings {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(DEFAULT_PROBE_INTERVAL_SECS),
            remote_timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
        }
    }
}

/// `<config_dir>/tasker/config.json`, when the platform has a config directory
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// `<data_dir>/tasker/tasker.db`, falling back to the working directory
pub fn default_database_path() -> PathBuf {
    dirs::data_dir().map_or_else(
        || PathBuf::from("tasker.db"),
        |dir| dir.join(CONFIG_DIR_NAME).join("tasker.db"),
    )
}

impl AppConfig {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Self {
        let config = default_config_path()
            .map(|path| Self::load_from_path(&path))
            .unwrap_or_default();
        config.with_overrides(
            std::env::var(REMOTE_URL_ENV).ok(),
            std::env::var(REMOTE_TOKEN_ENV).ok(),
        )
    }

    /// Read a config file, treating any failure as an empty config
    pub fn load_from_path(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) => {
                tracing::warn!("Ignoring unreadable config at {}: {error}", path.display());
                return Self::default();
            }
        };
        match serde_json::from_str::<Self>(&raw) {
            Ok(mut config) => {
                config.normalize();
                config
            }
            Err(error) => {
                tracing::warn!("Ignoring malformed config at {}: {error}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = default_config_path().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no configuration directory on this platform",
            )
        })?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    /// Non-blank environment values replace the remote settings from the file.
    #[must_use]
    pub fn with_overrides(mut self, url: Option<String>, token: Option<String>) -> Self {
        if let Some(url) = normalize_text_option(url) {
            self.remote_url = Some(url);
        }
        if let Some(token) = normalize_text_option(token) {
            self.remote_auth_token = Some(token);
        }
        self
    }

    /// Remote connection settings; `None` when no URL is configured
    pub fn remote(&self) -> Option<RemoteConfig> {
        let url = normalize_text_option(self.remote_url.clone())?;
        let token = normalize_text_option(self.remote_auth_token.clone()).unwrap_or_default();
        Some(RemoteConfig::new(url, token))
    }

    pub fn timings(&self) -> SyncTimings {
        let defaults = SyncTimings::default();
        SyncTimings {
            probe_interval: self
                .probe_interval_secs
                .filter(|secs| *secs > 0)
                .map_or(defaults.probe_interval, Duration::from_secs),
            remote_timeout: self
                .remote_timeout_secs
                .filter(|secs| *secs > 0)
                .map_or(defaults.remote_timeout, Duration::from_secs),
        }
    }

    fn normalize(&mut self) {
        self.remote_url = normalize_text_option(self.remote_url.take());
        self.remote_auth_token = normalize_text_option(self.remote_auth_token.take());
        self.session_token = normalize_text_option(self.session_token.take());
    }
}
