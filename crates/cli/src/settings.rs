//! CLI settings: optional TOML file, then TASKQ_* environment variables.
//! Command-line flags are applied on top by the caller.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use taskq_infra_resp::ConnectionConfig;

pub const DEFAULT_URL: &str = "redis://127.0.0.1:6379";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Server URL (`redis://...`)
    pub url: String,
    pub client_name: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    /// `0` disables the command timeout
    pub command_timeout_ms: Option<u64>,
    /// `json` or `pretty`
    pub log_format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            client_name: None,
            connect_timeout_ms: None,
            command_timeout_ms: None,
            log_format: "pretty".to_string(),
        }
    }
}

impl Settings {
    /// Load from `path` (must exist) or the default location (may be absent)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Some(File::from(path).required(true)),
            None => default_path().map(|path| File::from(path).required(false)),
        };

        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(file);
        }
        builder
            .add_source(Environment::with_prefix("TASKQ").try_parsing(true))
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    /// Connection parameters: URL first, explicit timeout settings win
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        let mut config = ConnectionConfig::from_url(&self.url)
            .with_context(|| format!("Invalid server URL: {}", self.url))?;

        if let Some(name) = &self.client_name {
            config = config.with_client_name(name.clone());
        }
        if let Some(ms) = self.connect_timeout_ms {
            config = config.with_connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.command_timeout_ms {
            config = config.with_command_timeout((ms > 0).then(|| Duration::from_millis(ms)));
        }
        config.validate()?;
        Ok(config)
    }
}

/// `<platform config dir>/taskq/config.toml`
pub fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "taskq").map(|dirs| dirs.config_dir().join("config.toml"))
}
