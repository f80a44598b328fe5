//! Inbound messages (service → client).
//!
//! # Known events
//!
//! | Event              | Maps to                                  |
//! |--------------------|------------------------------------------|
//! | `server.connected` | [`Notification::Connected`]              |
//! | `analysis.errors`  | [`Notification::ErrorsFound`]            |
//! | `server.status`    | [`Notification::StatusChanged`]          |
//! | `server.error`     | [`Notification::ServerError`]            |
//! | *(any other)*      | [`Notification::Unknown`]                |

use serde::Deserialize;
use serde_json::Value;

use crate::{AppError, Result};

/// Issue type that is informational and never counted in the tally.
pub const EXCLUDED_ISSUE_TYPE: &str = "TODO";

// ── Envelope ──────────────────────────────────────────────────────────────────

/// Raw envelope shared by responses and notifications.
#[derive(Debug, Deserialize)]
struct Envelope {
    id: Option<Value>,
    event: Option<String>,
    #[serde(default)]
    params: Value,
    result: Option<Value>,
    error: Option<ResponseError>,
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResponseError {
    /// Machine-readable error code, e.g. `INVALID_PARAMETER`.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Server-side stack trace, when provided.
    #[serde(rename = "stackTrace")]
    pub stack_trace: Option<String>,
}

/// One decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to a request previously sent by the client.
    Response {
        /// Id of the request being answered.
        id: String,
        /// Result payload on success.
        result: Option<Value>,
        /// Error payload on failure.
        error: Option<ResponseError>,
    },
    /// Unsolicited notification.
    Notification(Notification),
}

// ── Notifications ─────────────────────────────────────────────────────────────

/// Tagged union over the notification categories the client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The service is ready and announces its protocol version.
    Connected {
        /// Announced protocol version.
        version: String,
        /// Process id of the service, when reported.
        pid: Option<u32>,
    },
    /// Issues found in one file; replaces any previous list for that file.
    ErrorsFound {
        /// File the issues belong to.
        file: String,
        /// Issues in server order.
        issues: Vec<Issue>,
    },
    /// Analysis activity changed.
    StatusChanged {
        /// `Some(true)` while analysing, `Some(false)` when idle, `None`
        /// when the status carried no analysis section.
        is_busy: Option<bool>,
    },
    /// The service reported an internal fault.
    ServerError {
        /// Whether the service considers the fault fatal to itself.
        is_fatal: bool,
        /// Fault description.
        message: String,
        /// Stack trace, printed verbatim when present.
        stack_trace: Option<String>,
    },
    /// Any event this client does not know about.
    Unknown {
        /// The unrecognised event name.
        event: String,
    },
}

/// Severity attached to an [`Issue`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueSeverity {
    /// Informational (hints, lints).
    Info,
    /// Warning.
    Warning,
    /// Error.
    Error,
    /// A severity added by a newer protocol version.
    #[serde(other)]
    Other,
}

/// Position of an issue within its file. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// File containing the issue.
    pub file: String,
    /// Byte offset of the issue start.
    #[serde(default)]
    pub offset: u64,
    /// Length of the highlighted region.
    #[serde(default)]
    pub length: u64,
    /// 1-based line of the issue start.
    pub start_line: u32,
    /// 1-based column of the issue start.
    pub start_column: u32,
}

/// A single issue reported by `analysis.errors`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Issue {
    /// Severity classification.
    pub severity: IssueSeverity,
    /// Issue category, e.g. `COMPILE_TIME_ERROR` or `TODO`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Where the issue is.
    pub location: Location,
    /// Human-readable message.
    pub message: String,
    /// Suggested correction, when provided.
    pub correction: Option<String>,
    /// Diagnostic code name, when provided.
    pub code: Option<String>,
}

impl Issue {
    /// Whether this issue contributes to the error tally.
    #[must_use]
    pub fn is_counted(&self) -> bool {
        self.kind != EXCLUDED_ISSUE_TYPE
    }
}

// ── Event parameter shapes ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ConnectedParams {
    version: String,
    pid: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ErrorsParams {
    file: String,
    errors: Vec<Issue>,
}

#[derive(Debug, Deserialize)]
struct StatusParams {
    analysis: Option<AnalysisStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisStatus {
    is_analyzing: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerErrorParams {
    #[serde(default)]
    is_fatal: bool,
    message: String,
    stack_trace: Option<String>,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse a single NDJSON line into an [`Inbound`] message.
///
/// # Return value
///
/// - `Ok(Some(message))` — a response or notification (including
///   [`Notification::Unknown`] for unrecognised events).
/// - `Ok(None)` — the line is empty or whitespace.
/// - `Err(AppError::Protocol(...))` — not JSON, neither a response nor a
///   notification, or a known event with missing required fields.
///
/// # Errors
///
/// See above; every error is scoped to this one line.
pub fn parse_inbound_line(line: &str) -> Result<Option<Inbound>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let envelope: Envelope = serde_json::from_str(trimmed)
        .map_err(|e| AppError::Protocol(format!("malformed json: {e}")))?;

    if let Some(event) = envelope.event {
        return parse_notification(&event, envelope.params)
            .map(|n| Some(Inbound::Notification(n)));
    }

    let Some(id) = envelope.id else {
        return Err(AppError::Protocol(
            "message has neither `event` nor `id`".into(),
        ));
    };

    Ok(Some(Inbound::Response {
        id: id_to_string(&id)?,
        result: envelope.result,
        error: envelope.error,
    }))
}

fn parse_notification(event: &str, params: Value) -> Result<Notification> {
    match event {
        "server.connected" => {
            let p: ConnectedParams = params_for(event, params)?;
            Ok(Notification::Connected {
                version: p.version,
                pid: p.pid,
            })
        }
        "analysis.errors" => {
            let p: ErrorsParams = params_for(event, params)?;
            Ok(Notification::ErrorsFound {
                file: p.file,
                issues: p.errors,
            })
        }
        "server.status" => {
            let p: StatusParams = params_for(event, params)?;
            Ok(Notification::StatusChanged {
                is_busy: p.analysis.map(|a| a.is_analyzing),
            })
        }
        "server.error" => {
            let p: ServerErrorParams = params_for(event, params)?;
            Ok(Notification::ServerError {
                is_fatal: p.is_fatal,
                message: p.message,
                stack_trace: p.stack_trace,
            })
        }
        other => Ok(Notification::Unknown {
            event: other.to_owned(),
        }),
    }
}

fn params_for<T: serde::de::DeserializeOwned>(event: &str, params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| AppError::Protocol(format!("missing required field: {event} params: {e}")))
}

/// Ids are strings on the wire; numeric ids are accepted and stringified.
fn id_to_string(id: &Value) -> Result<String> {
    match id {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(AppError::Protocol(format!("unsupported id type: {other}"))),
    }
}
