//! Process-backed NDJSON transport.
//!
//! A [`Transport`] owns the service process and a pair of background tasks
//! bridging its stdio to channels:
//!
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based line framing.
//! - `reader`: stdout → [`MessageStream`] of `Result<Inbound>`.
//! - `writer`: outbound `serde_json::Value`s → stdin.
//! - `spawner`: process launch and stderr forwarding.
//!
//! The inbound side is handed out once as a [`MessageStream`]; the handshake
//! borrows it first and the dispatcher owns it afterwards, so there is only
//! ever one reader.

pub mod codec;
pub mod reader;
pub mod spawner;
pub mod writer;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::protocol::inbound::Inbound;
use crate::protocol::outbound::Request;
use crate::{AppError, Result};

/// Capacity of the inbound and outbound channels.
const CHANNEL_CAPACITY: usize = 256;

// ── Message stream ───────────────────────────────────────────────────────────

/// Lazy sequence of inbound messages.
///
/// Yields `Some(Ok(_))` per decoded message, `Some(Err(AppError::Protocol))`
/// per malformed line, and `None` once the service closed its stdout or the
/// transport was stopped.
#[derive(Debug)]
pub struct MessageStream {
    rx: mpsc::Receiver<Result<Inbound>>,
}

impl MessageStream {
    /// Create a stream fed by the returned sender.
    ///
    /// The transport uses this for its reader task; tests use it to feed a
    /// dispatcher directly.
    #[must_use]
    pub fn channel(capacity: usize) -> (mpsc::Sender<Result<Inbound>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }

    /// Wait for the next item.
    pub async fn next(&mut self) -> Option<Result<Inbound>> {
        self.rx.recv().await
    }
}

// ── Stop outcome ─────────────────────────────────────────────────────────────

/// How [`Transport::stop`] ended.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StopOutcome {
    /// The process exited within the grace period (exit code if any).
    Exited(Option<i32>),
    /// The process outlived the grace period and was killed.
    Killed,
    /// No process backs this transport; only the streams were closed.
    Detached,
    /// `stop` had already run; nothing was done.
    AlreadyStopped,
}

// ── Transport ────────────────────────────────────────────────────────────────

/// Duplex message channel to the service process.
#[derive(Debug)]
pub struct Transport {
    child: Option<Child>,
    outbound: Option<mpsc::Sender<Value>>,
    messages: Option<MessageStream>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<Result<()>>>,
    writer: Option<JoinHandle<Result<()>>>,
    stderr: Option<JoinHandle<()>>,
    grace: Duration,
    next_id: AtomicU64,
    stopped: bool,
}

impl Transport {
    /// Launch the service process and wire up its stdio.
    ///
    /// `grace` bounds how long [`stop`](Self::stop) waits for the process to
    /// exit before killing it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch` if the executable cannot be spawned.
    pub fn start(config: &ServerConfig, grace: Duration) -> Result<Self> {
        let process = spawner::spawn_service(config)?;
        let mut transport = Self::from_streams(process.stdout, process.stdin, grace);
        transport.stderr = Some(spawner::forward_stderr(process.stderr));
        transport.child = Some(process.child);
        Ok(transport)
    }

    /// Build a transport over arbitrary byte streams with no process behind
    /// them.
    ///
    /// `source` is what the service writes (its stdout); `sink` is what it
    /// reads (its stdin).
    #[must_use]
    pub fn from_streams<R, W>(source: R, sink: W, grace: Duration) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (msg_tx, messages) = MessageStream::channel(CHANNEL_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let reader = tokio::spawn(reader::run_reader(source, msg_tx, cancel.clone()));
        let writer = tokio::spawn(writer::run_writer(sink, out_rx, cancel.clone()));

        Self {
            child: None,
            outbound: Some(out_tx),
            messages: Some(messages),
            cancel,
            reader: Some(reader),
            writer: Some(writer),
            stderr: None,
            grace,
            next_id: AtomicU64::new(0),
            stopped: false,
        }
    }

    /// Take the inbound message stream. Returns `None` after the first call.
    pub fn take_messages(&mut self) -> Option<MessageStream> {
        self.messages.take()
    }

    /// Whether [`stop`](Self::stop) has run.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Process id of the service, if a process backs this transport and it
    /// has not been reaped.
    #[must_use]
    pub fn process_id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Serialise and enqueue one message for the writer task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Write` if the transport has been stopped or the
    /// writer task has exited (service stdin closed).
    pub async fn send(&self, request: &Request) -> Result<()> {
        let Some(tx) = self.outbound.as_ref() else {
            return Err(AppError::Write("transport stopped".into()));
        };

        let value = serde_json::to_value(request)
            .map_err(|e| AppError::Write(format!("failed to serialise {}: {e}", request.method)))?;

        tx.send(value)
            .await
            .map_err(|_| AppError::Write("service input channel closed".into()))?;

        debug!(id = %request.id, method = %request.method, "request sent");
        Ok(())
    }

    /// Send a request under the next free id and return that id.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn send_request(&self, method: &str, params: Option<Value>) -> Result<String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let request = Request::new(id.clone(), method, params);
        self.send(&request).await?;
        Ok(id)
    }

    /// Shut the transport down.
    ///
    /// Closes the service's stdin, asks the process to terminate, waits up
    /// to the grace period and then kills it. Idempotent: later calls return
    /// [`StopOutcome::AlreadyStopped`] without touching anything.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if waiting on or killing the process fails.
    pub async fn stop(&mut self) -> Result<StopOutcome> {
        if self.stopped {
            return Ok(StopOutcome::AlreadyStopped);
        }
        self.stopped = true;

        // No sends from here on.
        self.outbound = None;
        self.cancel.cancel();

        // The writer drops stdin on exit. A service that stopped reading can
        // leave it parked in `write_all`, so bound the wait.
        if let Some(mut writer) = self.writer.take() {
            match tokio::time::timeout(self.grace, &mut writer).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(err))) => debug!(%err, "writer ended with error before stop"),
                Ok(Err(err)) => warn!(%err, "writer task panicked"),
                Err(_elapsed) => writer.abort(),
            }
        }

        let outcome = match self.child.take() {
            Some(mut child) => terminate(&mut child, self.grace).await?,
            None => StopOutcome::Detached,
        };

        // The reader may be parked on a full channel nobody drains any more.
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(stderr) = self.stderr.take() {
            stderr.abort();
        }

        info!(?outcome, "transport stopped");
        Ok(outcome)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Private helpers ──────────────────────────────────────────────────────────

/// Ask `child` to exit, then force it after `grace`.
async fn terminate(child: &mut Child, grace: Duration) -> Result<StopOutcome> {
    request_terminate(child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => Ok(StopOutcome::Exited(status.code())),
        Ok(Err(err)) => Err(AppError::Io(format!("failed to wait for service: {err}"))),
        Err(_elapsed) => {
            debug!(?grace, "service did not exit in time, killing");
            child
                .kill()
                .await
                .map_err(|err| AppError::Io(format!("failed to kill service: {err}")))?;
            Ok(StopOutcome::Killed)
        }
    }
}

#[cfg(unix)]
fn request_terminate(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    if let Err(errno) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(pid, %errno, "SIGTERM not delivered");
    }
}

// Closing stdin is the only graceful request available here.
#[cfg(not(unix))]
fn request_terminate(_child: &Child) {}
