//! Notification dispatcher.
//!
//! Runs as its own task for the rest of the session once the handshake has
//! finished, draining the [`MessageStream`] one message at a time. Each
//! message is routed to exactly one handler:
//!
//! | Message                         | Handler                              |
//! |---------------------------------|--------------------------------------|
//! | [`Notification::ErrorsFound`]   | per-file listing, tally increment    |
//! | [`Notification::StatusChanged`] | cycle summary and tally reset on idle |
//! | [`Notification::ServerError`]   | printed, never fatal                 |
//! | [`Notification::Connected`]     | logged                               |
//! | [`Notification::Unknown`]       | ignored                              |
//! | [`Inbound::Response`]           | logged when it carries an error      |
//!
//! The error tally lives here and nowhere else. Messages are handled
//! strictly in arrival order, so the per-file output is never interleaved.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::console::Console;
use crate::protocol::inbound::{Inbound, Issue, Notification, ResponseError};
use crate::transport::MessageStream;
use crate::Result;

/// Line printed after every cycle summary.
pub const SUMMARY_SEPARATOR: &str = "--------- ctrl-c to exit ---------";

/// Why [`Dispatcher::run`] returned.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DispatchEnd {
    /// The session cancelled the dispatcher.
    Cancelled,
    /// The service closed its output.
    StreamClosed,
}

/// Routes inbound messages to their handlers and owns the error tally.
#[derive(Debug)]
pub struct Dispatcher {
    console: Console,
    tally: usize,
    busy: bool,
}

impl Dispatcher {
    /// Create a dispatcher with an empty tally.
    #[must_use]
    pub fn new(console: Console) -> Self {
        Self {
            console,
            tally: 0,
            busy: false,
        }
    }

    /// Issues counted since the last idle status.
    #[must_use]
    pub fn tally(&self) -> usize {
        self.tally
    }

    /// Consume `messages` until `cancel` fires or the stream closes.
    ///
    /// Malformed lines and console write failures are logged and skipped;
    /// neither ends the loop.
    pub async fn run(mut self, mut messages: MessageStream, cancel: CancellationToken) -> DispatchEnd {
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!("dispatcher: cancellation received, stopping");
                    return DispatchEnd::Cancelled;
                }

                item = messages.next() => {
                    match item {
                        None => {
                            debug!("dispatcher: message stream closed");
                            return DispatchEnd::StreamClosed;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "dispatcher: dropping malformed message");
                        }
                        Some(Ok(message)) => {
                            if let Err(e) = self.dispatch(message) {
                                warn!(error = %e, "dispatcher: handler failed");
                            }
                        }
                    }
                }
            }
        }
    }

    /// Route one message to its handler.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if writing to the console fails.
    pub fn dispatch(&mut self, message: Inbound) -> Result<()> {
        match message {
            Inbound::Notification(Notification::ErrorsFound { file, issues }) => {
                self.on_errors_found(&file, &issues)
            }
            Inbound::Notification(Notification::StatusChanged { is_busy }) => {
                self.on_status_changed(is_busy)
            }
            Inbound::Notification(Notification::ServerError {
                is_fatal,
                message,
                stack_trace,
            }) => self.on_server_error(is_fatal, &message, stack_trace.as_deref()),
            Inbound::Notification(Notification::Connected { version, .. }) => {
                debug!(%version, "dispatcher: late connected notification ignored");
                Ok(())
            }
            Inbound::Notification(Notification::Unknown { event }) => {
                debug!(%event, "dispatcher: ignoring unknown event");
                Ok(())
            }
            Inbound::Response { id, error, .. } => {
                log_response(&id, error.as_ref());
                Ok(())
            }
        }
    }

    fn on_errors_found(&mut self, file: &str, issues: &[Issue]) -> Result<()> {
        let mut header_printed = false;

        for issue in issues.iter().filter(|issue| issue.is_counted()) {
            if !header_printed {
                self.console.line(format_args!("{file}:"))?;
                header_printed = true;
            }
            let loc = &issue.location;
            self.console.line(format_args!(
                "  {} • {}:{}",
                issue.message, loc.start_line, loc.start_column
            ))?;
            self.tally += 1;
        }

        debug!(file, reported = issues.len(), tally = self.tally, "errors found");
        Ok(())
    }

    fn on_status_changed(&mut self, is_busy: Option<bool>) -> Result<()> {
        let Some(is_busy) = is_busy else {
            return Ok(());
        };

        if is_busy {
            if !self.busy {
                debug!("analysis started");
            }
            self.busy = true;
            return Ok(());
        }

        if self.busy {
            info!(issues = self.tally, "analysis complete");
        }
        self.busy = false;

        let summary = if self.tally == 0 {
            "No issues found.".to_owned()
        } else {
            format!("Found {} errors/warnings/hints", self.tally)
        };
        self.tally = 0;

        self.console.line(summary)?;
        self.console.line(SUMMARY_SEPARATOR)
    }

    fn on_server_error(&self, is_fatal: bool, message: &str, stack_trace: Option<&str>) -> Result<()> {
        warn!(is_fatal, message, "service reported an error");
        self.console.line(format_args!("Server Error: {message}"))?;
        if let Some(trace) = stack_trace {
            self.console.line(trace)?;
        }
        Ok(())
    }
}

fn log_response(id: &str, error: Option<&ResponseError>) {
    match error {
        Some(err) => warn!(
            request_id = id,
            code = %err.code,
            message = %err.message,
            "request failed"
        ),
        None => debug!(request_id = id, "request acknowledged"),
    }
}
