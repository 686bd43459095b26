//! Server configuration
//!
//! Static identity metadata reported by `initialize`, plus the default log
//! level. Everything is optional; a missing file means defaults.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "calc-mcp.toml";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Identity reported in `serverInfo` and `protocolVersion`
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    pub protocol_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "calculator-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: "2024-11-05".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive; `RUST_LOG` wins when set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::load_from_str(&content)
            .with_context(|| format!("Invalid config file: {:?}", path.as_ref()))
    }

    /// Load configuration from string
    pub fn load_from_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).context("Failed to parse server configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Pick the configuration source.
    ///
    /// An explicit path must exist. Otherwise `calc-mcp.toml` in the working
    /// directory is used if present, else the defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            return Self::load_from_file(local);
        }

        Ok(Self::default())
    }

    fn validate(&self) -> Result<()> {
        if self.server.name.trim().is_empty() {
            bail!("server.name must not be empty");
        }
        if self.server.version.trim().is_empty() {
            bail!("server.version must not be empty");
        }
        if self.server.protocol_version.trim().is_empty() {
            bail!("server.protocol_version must not be empty");
        }
        Ok(())
    }
}
