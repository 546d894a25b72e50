//! Error types shared across the application.

use std::fmt::{Display, Formatter};

use crate::session::state::Phase;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Bridge process or stdio stream failure.
    Transport(String),
    /// Session is not in the `Ready` phase; the caller may retry later.
    NotReady {
        /// Phase observed when the operation was rejected.
        phase: Phase,
    },
    /// Authentication with the messaging service failed; operator re-pairing
    /// is required.
    AuthFailed(String),
    /// Pairing-code image generation failed; the code itself is still valid.
    Render(String),
    /// Message delivery failed; wraps the collaborator-level cause verbatim.
    Send(String),
    /// A bounded wait for session readiness elapsed.
    Timeout {
        /// Phase observed when the wait expired.
        phase: Phase,
    },
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::NotReady { phase } => write!(f, "not ready: session is {phase}"),
            Self::AuthFailed(msg) => write!(f, "authentication failed: {msg}"),
            Self::Render(msg) => write!(f, "pairing render: {msg}"),
            Self::Send(msg) => write!(f, "send: {msg}"),
            Self::Timeout { phase } => {
                write!(f, "timed out waiting for readiness: session is {phase}")
            }
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
