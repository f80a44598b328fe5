//! Client configuration parsing and validation.
//!
//! Every section of the TOML file is optional; a missing file section falls
//! back to the defaults below, so running without `--config` is equivalent
//! to loading an empty document.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::protocol::outbound::ServerService;
use crate::{AppError, Result};

/// Protocol version this client was written against.
pub const DEFAULT_PROTOCOL_VERSION: &str = "1.39.0";

/// How to launch the service process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Executable to spawn (looked up on `PATH`).
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
        }
    }
}

fn default_command() -> String {
    "dart".into()
}

fn default_args() -> Vec<String> {
    vec!["language-server".into(), "--protocol=analyzer".into()]
}

/// Timeout values in seconds.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Upper bound on the handshake wait.
    #[serde(default = "default_connect_seconds")]
    pub connect_seconds: u64,
    /// Grace period before the service process is force-killed.
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_seconds: default_connect_seconds(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
        }
    }
}

fn default_connect_seconds() -> u64 {
    15
}

fn default_shutdown_grace_seconds() -> u64 {
    5
}

/// Protocol negotiation and subscription settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProtocolConfig {
    /// Version the handshake compares the announced version against.
    #[serde(default = "default_expected_version")]
    pub expected_version: String,
    /// Abort the session when the announced version differs.
    #[serde(default)]
    pub abort_on_version_mismatch: bool,
    /// Notification categories requested after the handshake.
    #[serde(default = "default_subscriptions")]
    pub subscriptions: Vec<ServerService>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            expected_version: default_expected_version(),
            abort_on_version_mismatch: false,
            subscriptions: default_subscriptions(),
        }
    }
}

fn default_expected_version() -> String {
    DEFAULT_PROTOCOL_VERSION.into()
}

fn default_subscriptions() -> Vec<ServerService> {
    vec![ServerService::Status]
}

/// Extra analysis-root settings applied alongside the CLI target.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RootsConfig {
    /// Paths excluded from analysis, sent in order.
    #[serde(default)]
    pub excluded: Vec<PathBuf>,
}

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    /// Service launch settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Handshake and shutdown timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Version and subscription settings.
    #[serde(default)]
    pub protocol: ProtocolConfig,
    /// Analysis-root settings.
    #[serde(default)]
    pub roots: RootsConfig,
}

impl ClientConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, contains
    /// invalid TOML, or fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Replace the server command and, when given, its arguments.
    ///
    /// Used for `--server` / `--server-arg` overrides on the command line.
    pub fn override_server(&mut self, command: Option<String>, args: Vec<String>) {
        if let Some(command) = command {
            self.server.command = command;
            self.server.args = args;
        } else if !args.is_empty() {
            self.server.args = args;
        }
    }

    /// Handshake timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.connect_seconds)
    }

    /// Grace period between the graceful stop request and a forced kill.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.timeouts.shutdown_grace_seconds)
    }

    /// Validate field invariants.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.server.command.trim().is_empty() {
            return Err(AppError::Config("server.command must not be empty".into()));
        }
        if self.timeouts.connect_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.connect_seconds must be greater than zero".into(),
            ));
        }
        if self.protocol.subscriptions.is_empty() {
            return Err(AppError::Config(
                "protocol.subscriptions must name at least one service".into(),
            ));
        }
        Ok(())
    }

    fn normalize(&mut self) {
        let mut seen = Vec::with_capacity(self.protocol.subscriptions.len());
        self.protocol.subscriptions.retain(|service| {
            if seen.contains(service) {
                false
            } else {
                seen.push(*service);
                true
            }
        });
    }
}
