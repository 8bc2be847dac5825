//! Configuration file loading.
//!
//! The adapter reads `adapter.toml` from the working directory unless a path
//! is given explicitly. Every key is optional:
//!
//! ```toml
//! engine_store = "engines"
//! engine_timeout_ms = 30000
//!
//! [game]
//! host = "localhost"
//! port = 4502
//! secure = false
//!
//! [test]
//! host = "localhost"
//! port = 4504
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// The file is not valid TOML or has fields of the wrong type.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Where a server can be reached.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// Omitted from the URL when unset.
    #[serde(default)]
    pub port: Option<u16>,
    /// Use `wss://` instead of `ws://`.
    #[serde(default)]
    pub secure: bool,
}

impl ServerConfig {
    fn local(port: u16) -> Self {
        Self {
            host: default_host(),
            port: Some(port),
            secure: false,
        }
    }

    /// WebSocket URL of the server.
    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        match self.port {
            Some(port) => format!("{}://{}:{}", scheme, self.host, port),
            None => format!("{}://{}", scheme, self.host),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_game_server() -> ServerConfig {
    ServerConfig::local(4502)
}

fn default_test_server() -> ServerConfig {
    ServerConfig::local(4504)
}

fn default_engine_store() -> PathBuf {
    PathBuf::from("engines")
}

/// Adapter configuration.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Directory holding installed engine binaries. Defaults to `engines`.
    #[serde(default = "default_engine_store")]
    pub engine_store: PathBuf,
    /// Upper bound on every wait for an engine reply. Unset means no limit.
    #[serde(default)]
    pub engine_timeout_ms: Option<u64>,
    /// Name announced to the test server. Defaults to the host name.
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default = "default_game_server")]
    pub game: ServerConfig,
    #[serde(default = "default_test_server")]
    pub test: ServerConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            engine_store: default_engine_store(),
            engine_timeout_ms: None,
            device_name: None,
            game: default_game_server(),
            test: default_test_server(),
        }
    }
}

impl AdapterConfig {
    /// Load from `path`, or from [`Self::config_path`] if it exists.
    ///
    /// An explicit path must exist; the default one falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Self::config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn config_path() -> PathBuf {
        PathBuf::from("adapter.toml")
    }

    pub fn engine_timeout(&self) -> Option<Duration> {
        self.engine_timeout_ms.map(Duration::from_millis)
    }
}
