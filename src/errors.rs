//! Error types shared across the client.

use std::fmt::{Display, Formatter};

/// Shared client result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Client error enumeration covering every session failure mode.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The service process could not be spawned.
    Launch(String),
    /// The handshake did not complete (timeout or closed channel).
    ConnectFailed(String),
    /// The service announced a protocol version other than the expected one.
    UnsupportedProtocolVersion {
        /// Version this client was built against.
        expected: String,
        /// Version announced by the service.
        actual: String,
    },
    /// A single inbound message was malformed; the stream continues.
    Protocol(String),
    /// An outbound message could not be written (channel closed).
    Write(String),
    /// The service closed its output stream while the session was running.
    Disconnected(String),
    /// The session state machine was driven incorrectly.
    Session(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether this error ends the current session.
    ///
    /// `Protocol` errors are dropped per message and a version mismatch is
    /// left to caller policy; everything else is fatal.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Protocol(_) | Self::UnsupportedProtocolVersion { .. }
        )
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Launch(msg) => write!(f, "launch: {msg}"),
            Self::ConnectFailed(msg) => write!(f, "connect failed: {msg}"),
            Self::UnsupportedProtocolVersion { expected, actual } => write!(
                f,
                "unsupported protocol version: expected {expected}, server reported {actual}"
            ),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Write(msg) => write!(f, "write: {msg}"),
            Self::Disconnected(msg) => write!(f, "disconnected: {msg}"),
            Self::Session(msg) => write!(f, "session: {msg}"),
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
