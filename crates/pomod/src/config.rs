//! Daemon configuration.
//!
//! Settings come from, lowest precedence first: built-in defaults, a TOML
//! file, then environment variables and command-line flags (the latter two
//! are merged by clap in `main`).
//!
//! ```toml
//! bind = "0.0.0.0"
//! port = 8080
//! outbound_buffer = 256
//!
//! [presets]
//! pomodoro = 1500
//! shortBreak = 300
//! longBreak = 900
//! ```

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use pomo_core::Presets;

use crate::server::{DEFAULT_OUTBOUND_BUFFER, DEFAULT_PORT};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "POMOD_CONFIG";

/// Daemon settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Interface to listen on
    pub bind: IpAddr,

    /// TCP port to listen on
    pub port: u16,

    /// Per-connection outbound queue capacity
    pub outbound_buffer: usize,

    /// Presets for newly created sessions
    pub presets: Presets,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            presets: Presets::default(),
        }
    }
}

impl DaemonConfig {
    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Syntax(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Self::from_toml_str(&text).map_err(|e| match e {
            ConfigError::Syntax(message) => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Loads the configuration file, if any.
    ///
    /// An explicit path (flag or `POMOD_CONFIG`) must exist. The per-user
    /// default location is optional; when absent, defaults are returned.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            debug!(path = %path.display(), "Loading config");
            return Self::from_file(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "Loading config");
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Address the server binds.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.outbound_buffer == 0 {
            return Err(ConfigError::Invalid(
                "outbound_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns `<config_dir>/pomosync/pomod.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pomosync").join("pomod.toml"))
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {message}", .path.display())]
    Read { path: PathBuf, message: String },

    #[error("Failed to parse config: {0}")]
    Syntax(String),

    #[error("Failed to parse config file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}
