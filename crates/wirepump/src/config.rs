//! Pump configuration.
//!
//! Discovery follows the platform convention: the display server
//! advertises its socket through `WIREPUMP_SOCKET`. An optional JSON
//! config file (pointed at by `WIREPUMP_CONFIG`) can pin the socket
//! path and tune dispatch behavior; environment variables win over the
//! file so a session can be redirected without editing anything.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::PumpError;

/// Environment variable naming the display server socket.
pub const SOCKET_ENV: &str = "WIREPUMP_SOCKET";

/// Environment variable naming an optional JSON config file.
pub const CONFIG_ENV: &str = "WIREPUMP_CONFIG";

/// When set (to anything but `0`), disables high-frequency event
/// coalescing.
pub const NO_COALESCE_ENV: &str = "WIREPUMP_NO_COALESCE";

fn default_coalesce() -> bool {
    true
}

fn default_wait_timeout_ms() -> u64 {
    5_000
}

/// Configuration for a pump connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PumpConfig {
    /// Path to the display server socket. `~` is expanded. When absent,
    /// the socket is discovered from [`SOCKET_ENV`].
    #[serde(default)]
    pub socket_path: Option<PathBuf>,

    /// Drop superseded motion/configure records still pending in the
    /// same drain window.
    #[serde(default = "default_coalesce")]
    pub coalesce_high_frequency: bool,

    /// Default timeout for bounded synchronous waits, in milliseconds.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            coalesce_high_frequency: default_coalesce(),
            wait_timeout_ms: default_wait_timeout_ms(),
        }
    }
}

impl PumpConfig {
    /// Load configuration: file named by [`CONFIG_ENV`] if present,
    /// then environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `PumpError::ConfigRead`/`ConfigParse` if [`CONFIG_ENV`]
    /// names a file that cannot be read or parsed. A missing
    /// [`CONFIG_ENV`] is not an error; defaults apply.
    pub fn load() -> Result<Self, PumpError> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => {
                let path: PathBuf = shellexpand::tilde(&path).into_owned().into();
                Self::from_file(&path)?
            }
            Err(_) => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns `PumpError::ConfigRead` if the file cannot be read, or
    /// `PumpError::ConfigParse` if it is not valid JSON for this
    /// schema.
    pub fn from_file(path: &Path) -> Result<Self, PumpError> {
        let contents = std::fs::read_to_string(path).map_err(|source| PumpError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| PumpError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var(SOCKET_ENV) {
            self.socket_path = Some(shellexpand::tilde(&path).into_owned().into());
        }
        if let Ok(value) = std::env::var(NO_COALESCE_ENV) {
            if value != "0" {
                self.coalesce_high_frequency = false;
            }
        }
    }

    /// Resolve the socket path to connect to, validating that it
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns `PumpError::SocketNotSet` when neither the config nor
    /// [`SOCKET_ENV`] names a path, and `PumpError::SocketNotFound`
    /// when the named path does not exist.
    pub fn resolve_socket_path(&self) -> Result<PathBuf, PumpError> {
        let path = match &self.socket_path {
            Some(path) => path.clone(),
            None => {
                let raw = std::env::var(SOCKET_ENV).map_err(|_| PumpError::SocketNotSet)?;
                shellexpand::tilde(&raw).into_owned().into()
            }
        };
        if !path.exists() {
            return Err(PumpError::SocketNotFound { path });
        }
        Ok(path)
    }
}
