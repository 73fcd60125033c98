//! Configuration management for the tunnel server.
//!
//! Settings come from an optional `config.toml` in the platform config
//! directory; flags and environment variables override it in `main`.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Largest inbound WebSocket message in bytes
    pub max_message_size: Option<usize>,
    pub connect_timeout_secs: Option<u64>,
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("", "", "ws-tunnel")
            .context("Could not determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}
