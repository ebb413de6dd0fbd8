//! Daemon configuration.
//!
//! Read from a TOML file, then overridden by the environment and the
//! command line. Every key is optional:
//!
//! ```toml
//! listen_addr = "0.0.0.0:5000"
//! max_observers = 512
//! outbox_capacity = 64
//! write_timeout_ms = 10000
//! idle_timeout_secs = 600
//! log_level = "fencewatchd=debug"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observer::DEFAULT_MAX_OBSERVERS;

/// Environment variable overriding `listen_addr`
pub const ADDR_ENV: &str = "FENCEWATCH_ADDR";

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5000";

/// Runtime settings for the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Address the TCP server binds to
    pub listen_addr: String,

    /// Maximum number of connected observers
    pub max_observers: usize,

    /// Frames queued per observer before it counts as too slow
    pub outbox_capacity: usize,

    /// Longest a single write to an observer may take
    pub write_timeout_ms: u64,

    /// Idle time after which a connection that sends nothing is dropped.
    ///
    /// Off by default: observers usually only listen, and dead peers are
    /// found by failing or stalled writes instead.
    pub idle_timeout_secs: Option<u64>,

    /// Extra `tracing` filter directives, e.g. `fencewatchd=debug`
    pub log_level: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            max_observers: DEFAULT_MAX_OBSERVERS,
            outbox_capacity: 64,
            write_timeout_ms: 10_000,
            idle_timeout_secs: None,
            log_level: None,
        }
    }
}

impl DaemonConfig {
    /// Default config file location: `<config dir>/fencewatch/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("fencewatch").join("config.toml"))
    }

    /// Loads the configuration.
    ///
    /// With an explicit `path` the file must exist and parse. Without one,
    /// the default location is tried and silently skipped if absent.
    /// `FENCEWATCH_ADDR` is applied last.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Read` if an explicit file cannot be read
    /// - `ConfigError::Parse` if a file is not valid TOML for this struct
    /// - `ConfigError::Invalid` if a value is out of range
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };

        if let Ok(addr) = std::env::var(ADDR_ENV) {
            config.listen_addr = addr;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses a config file without applying overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml(&contents).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parses TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })
    }

    /// Checks values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.outbox_capacity == 0 {
            return Err(ConfigError::Invalid("outbox_capacity must be at least 1".to_string()));
        }
        if self.max_observers == 0 {
            return Err(ConfigError::Invalid("max_observers must be at least 1".to_string()));
        }
        if self.write_timeout_ms == 0 || self.idle_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    /// `listen_addr` parsed as a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("listen_addr '{}' is not host:port", self.listen_addr)))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// `None` when idle connections are kept open.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}

/// Errors loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config {path}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}
