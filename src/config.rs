//! Runtime configuration.
//!
//! Precedence: built-in defaults < `~/.geocascade/config.json` (or an
//! explicit `--config` path) < `GEOCASCADE_*` environment variables < CLI
//! flags (applied by the binary).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://countriesnow.space/api/v0.1";

pub const ENV_API_URL: &str = "GEOCASCADE_API_URL";
pub const ENV_TIMEOUT: &str = "GEOCASCADE_TIMEOUT_SECS";
pub const ENV_HOST: &str = "GEOCASCADE_HOST";
pub const ENV_PORT: &str = "GEOCASCADE_PORT";
pub const ENV_SESSION_IDLE: &str = "GEOCASCADE_SESSION_IDLE_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the geography API, without trailing slash.
    pub api_base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    pub host: String,
    pub port: u16,
    /// HTTP API sessions unused for this many seconds are dropped.
    pub session_idle_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 10,
            host: "127.0.0.1".to_string(),
            port: 3030,
            session_idle_secs: crate::server::DEFAULT_SESSION_IDLE_SECS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

impl Config {
    /// `~/.geocascade/config.json`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".geocascade")
            .join("config.json")
    }

    /// Load from `path` (must exist) or from the default path (optional),
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Override fields from environment-style variables. `lookup` is
    /// `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT) {
            self.timeout_secs = parse_value(ENV_TIMEOUT, &raw)?;
        }
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(raw) = lookup(ENV_PORT) {
            self.port = parse_value(ENV_PORT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SESSION_IDLE) {
            self.session_idle_secs = parse_value(ENV_SESSION_IDLE, &raw)?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}
