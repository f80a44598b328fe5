//! Connection handshake.
//!
//! After the transport is up the client sends one `server.getVersion` request
//! and then reads the message stream until the service announces its
//! protocol version, either through a `server.connected` notification or a
//! response to that request carrying `result.version`.
//!
//! The wait is bounded. Whatever arrives before the announcement is logged
//! at `DEBUG` and skipped. The dispatcher must not be started until
//! [`connect`] returns, because the handshake borrows the only stream.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::protocol::inbound::{Inbound, Notification};
use crate::protocol::outbound::GET_VERSION;
use crate::transport::{MessageStream, Transport};
use crate::{AppError, Result};

/// Outcome of a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connected {
    server_version: String,
    pid: Option<u32>,
    expected_version: String,
}

impl Connected {
    /// Version announced by the service.
    #[must_use]
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Service process id, when announced.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the announced version equals the expected one.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.server_version == self.expected_version
    }

    /// Report a version mismatch as an error; the connection itself stays
    /// usable and the caller decides whether to abort.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnsupportedProtocolVersion` on mismatch.
    pub fn ensure_supported(&self) -> Result<()> {
        if self.is_supported() {
            Ok(())
        } else {
            Err(AppError::UnsupportedProtocolVersion {
                expected: self.expected_version.clone(),
                actual: self.server_version.clone(),
            })
        }
    }
}

/// Ask the service for its version and wait up to `timeout` for its version announcement.
///
/// # Errors
///
/// - `AppError::ConnectFailed("… within …")` — nothing announced in time.
/// - `AppError::ConnectFailed("service closed …")` — the stream ended first.
/// - `AppError::ConnectFailed("version request not sent …")` — the request could not be
///   written.
pub async fn connect(
    transport: &Transport,
    messages: &mut MessageStream,
    timeout: Duration,
    expected_version: &str,
) -> Result<Connected> {
    let request_id = transport
        .send_request(GET_VERSION, None)
        .await
        .map_err(|e| AppError::ConnectFailed(format!("version request not sent: {e}")))?;
    debug!(%request_id, "handshake: version requested");

    let (server_version, pid) = tokio::time::timeout(timeout, wait_for_version(messages, &request_id))
        .await
        .map_err(|_| {
            AppError::ConnectFailed(format!(
                "no version announcement within {timeout:?}"
            ))
        })??;

    let connected = Connected {
        server_version,
        pid,
        expected_version: expected_version.to_owned(),
    };

    if connected.is_supported() {
        info!(version = connected.server_version(), "handshake: connected");
    } else {
        warn!(
            expected = expected_version,
            actual = connected.server_version(),
            "handshake: connected with unexpected protocol version"
        );
    }

    Ok(connected)
}

async fn wait_for_version(
    messages: &mut MessageStream,
    request_id: &str,
) -> Result<(String, Option<u32>)> {
    loop {
        let Some(item) = messages.next().await else {
            return Err(AppError::ConnectFailed(
                "service closed its output during handshake".into(),
            ));
        };

        match item {
            Ok(Inbound::Notification(Notification::Connected { version, pid })) => {
                return Ok((version, pid));
            }
            Ok(Inbound::Response { id, result, error }) if id == request_id => {
                if let Some(version) = result.as_ref().and_then(version_of) {
                    return Ok((version, None));
                }
                debug!(?error, "handshake: version request answered without a version");
            }
            Ok(other) => {
                debug!(?other, "handshake: skipping message before version announcement");
            }
            Err(e) => {
                debug!(error = %e, "handshake: skipping malformed line");
            }
        }
    }
}

fn version_of(result: &Value) -> Option<String> {
    result.get("version").and_then(Value::as_str).map(str::to_owned)
}
