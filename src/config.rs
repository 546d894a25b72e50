//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Nested bridge configuration: how the messaging-protocol bridge process
/// is launched and addressed.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BridgeConfig {
    /// Bridge executable (e.g., `node`).
    pub command: String,
    /// Arguments passed to the bridge executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Directory handed to the bridge for credential persistence.
    ///
    /// Credential storage is owned entirely by the bridge; the gateway only
    /// forwards this path via the `COURIER_DATA_DIR` environment variable.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Suffix appended to bare targets to form a protocol address.
    #[serde(default = "default_address_suffix")]
    pub address_suffix: String,
    /// Seconds to wait for the bridge to acknowledge a `message/send`.
    #[serde(default = "default_send_ack_seconds")]
    pub send_ack_seconds: u64,
}

fn default_address_suffix() -> String {
    "@c.us".into()
}

fn default_send_ack_seconds() -> u64 {
    30
}

/// Configurable timeout values (seconds) for blocking operations.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// How long a `send` suspends waiting for the session to become ready.
    #[serde(default = "default_send_wait_seconds")]
    pub send_wait_seconds: u64,
    /// Bound on graceful shutdown; when exceeded the process terminates
    /// with a non-zero exit code.
    #[serde(default = "default_shutdown_seconds")]
    pub shutdown_seconds: u64,
}

fn default_send_wait_seconds() -> u64 {
    60
}

fn default_shutdown_seconds() -> u64 {
    10
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            send_wait_seconds: default_send_wait_seconds(),
            shutdown_seconds: default_shutdown_seconds(),
        }
    }
}

/// Reconnection policy after the bridge reports a disconnect.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReconnectConfig {
    /// Debounce window (milliseconds) between a disconnect event and the
    /// re-initialization attempt. Bursts of disconnects within the window
    /// collapse into a single attempt.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Whether a disconnect that follows an authentication failure also
    /// triggers automatic reconnection. Off by default: a failed
    /// authentication requires operator re-pairing.
    #[serde(default)]
    pub on_auth_failure: bool,
}

fn default_debounce_ms() -> u64 {
    2000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            on_auth_failure: false,
        }
    }
}

fn default_http_port() -> u16 {
    3001
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// HTTP port for the gateway API.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Bridge process settings.
    pub bridge: BridgeConfig,
    /// Timeout configuration for blocking flows.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Reconnection policy.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
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
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Bound on a `send` call's implicit wait for readiness.
    #[must_use]
    pub fn send_wait(&self) -> Duration {
        Duration::from_secs(self.timeouts.send_wait_seconds)
    }

    /// Bound on graceful shutdown before the process force-terminates.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.timeouts.shutdown_seconds)
    }

    /// Debounce window between a disconnect and the reconnect attempt.
    #[must_use]
    pub fn reconnect_debounce(&self) -> Duration {
        Duration::from_millis(self.reconnect.debounce_ms)
    }

    /// Bound on the bridge acknowledging an outbound message.
    #[must_use]
    pub fn send_ack(&self) -> Duration {
        Duration::from_secs(self.bridge.send_ack_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.bridge.command.trim().is_empty() {
            return Err(AppError::Config("bridge.command must not be empty".into()));
        }

        if self.reconnect.debounce_ms == 0 {
            return Err(AppError::Config(
                "reconnect.debounce_ms must be greater than zero".into(),
            ));
        }

        if self.timeouts.send_wait_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.send_wait_seconds must be greater than zero".into(),
            ));
        }

        if self.timeouts.shutdown_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.shutdown_seconds must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
