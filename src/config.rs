use crate::core::db::ConnectionOptions;
use crate::core::{OrmError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Connection made current after all connections are opened
    pub default: Option<String>,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

/// One named database connection.
#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,
    pub dsn: String,
    pub foreign_keys: Option<bool>,
    pub busy_timeout_ms: Option<u64>,
}

impl ConnectionConfig {
    /// Connection options with unset keys taken from the defaults
    pub fn options(&self) -> ConnectionOptions {
        let defaults = ConnectionOptions::default();
        ConnectionOptions {
            foreign_keys: self.foreign_keys.unwrap_or(defaults.foreign_keys),
            busy_timeout_ms: self.busy_timeout_ms.unwrap_or(defaults.busy_timeout_ms),
        }
    }
}

impl FromStr for Config {
    type Err = OrmError;

    fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| OrmError::Config(e.to_string()))
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// let config = rowmap::config::load_config("rowmap.toml").expect("Failed to load config");
/// let registry = rowmap::Registry::from_config(&config).expect("Failed to open connections");
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    content.parse()
}
