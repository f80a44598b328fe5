//! Session controller.
//!
//! Drives one service process from launch to exit:
//!
//! ```text
//! Idle → Starting → Connected → Subscribed → Running → Stopping → Stopped
//! ```
//!
//! Failure paths: a launch or handshake failure goes from `Starting`
//! straight to `Stopped`; an interrupt, a failed write, a version-policy
//! abort, or the service closing its output goes through `Stopping`.
//! `Stopped` is terminal; a new session needs a new [`Session`].

use std::fmt::Display;
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::console::Console;
use crate::dispatcher::{DispatchEnd, Dispatcher};
use crate::handshake;
use crate::protocol::outbound::{
    set_subscriptions_params, AnalysisRoots, SET_ANALYSIS_ROOTS, SET_SUBSCRIPTIONS,
};
use crate::transport::Transport;
use crate::{AppError, Result};

/// Lifecycle states of a [`Session`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SessionState {
    /// Created, not yet run.
    Idle,
    /// Service launched, handshake in progress.
    Starting,
    /// Handshake succeeded.
    Connected,
    /// Subscription and root registration sent.
    Subscribed,
    /// Dispatcher consuming notifications.
    Running,
    /// Shutting down.
    Stopping,
    /// Terminal.
    Stopped,
}

impl SessionState {
    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{Connected, Idle, Running, Starting, Stopped, Stopping, Subscribed};

        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Connected)
                | (Connected, Subscribed)
                | (Subscribed, Running)
                | (Starting | Connected | Subscribed | Running, Stopping)
                | (Starting | Stopping, Stopped)
        )
    }
}

/// One client session against one service process.
#[derive(Debug)]
pub struct Session {
    config: ClientConfig,
    console: Console,
    state: SessionState,
}

impl Session {
    /// Create an idle session.
    #[must_use]
    pub fn new(config: ClientConfig, console: Console) -> Self {
        Self {
            config,
            console,
            state: SessionState::Idle,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session against `target` until `interrupt` fires.
    ///
    /// Returns `Ok(())` after an interrupt-triggered shutdown, including one
    /// that arrives during launch or the handshake.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` if the session was already run, and
    /// otherwise the error that ended it: `Launch`, `ConnectFailed`, `Write`
    /// during startup, `Disconnected` when the service closes its output, or
    /// `UnsupportedProtocolVersion` when the abort-on-mismatch policy is on.
    pub async fn run(&mut self, target: &Path, interrupt: CancellationToken) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(AppError::Session(format!(
                "cannot run a session in state {:?}",
                self.state
            )));
        }

        self.transition(SessionState::Starting);
        self.say(format_args!("Analyzing {}", target.display()));

        let grace = self.config.shutdown_grace();
        let mut transport = match Transport::start(&self.config.server, grace) {
            Ok(transport) => transport,
            Err(err) => {
                self.say(format_args!("Failed to start server: {err}"));
                self.transition(SessionState::Stopped);
                return Err(err);
            }
        };

        let Some(mut messages) = transport.take_messages() else {
            self.stop_transport(&mut transport).await;
            self.transition(SessionState::Stopped);
            return Err(AppError::Session("message stream already taken".into()));
        };

        // ── Handshake ───────────────────────────────────
        let handshake = tokio::select! {
            biased;

            () = interrupt.cancelled() => None,

            result = handshake::connect(
                &transport,
                &mut messages,
                self.config.connect_timeout(),
                &self.config.protocol.expected_version,
            ) => Some(result),
        };

        let connected = match handshake {
            None => {
                info!("interrupted during handshake");
                self.shutdown(&mut transport).await;
                return Ok(());
            }
            Some(Err(err)) => {
                warn!(%err, "handshake failed");
                self.say("Failed to connect to server");
                self.stop_transport(&mut transport).await;
                self.transition(SessionState::Stopped);
                return Err(err);
            }
            Some(Ok(connected)) => connected,
        };
        self.transition(SessionState::Connected);

        if let Err(mismatch) = connected.ensure_supported() {
            self.say(format_args!("Warning: {mismatch}"));
            if self.config.protocol.abort_on_version_mismatch {
                self.shutdown(&mut transport).await;
                return Err(mismatch);
            }
        }

        // ── Subscriptions and roots ─────────────────────
        if let Err(err) = self.subscribe(&transport, target).await {
            self.say(format_args!("Failed to send request: {err}"));
            self.shutdown(&mut transport).await;
            return Err(err);
        }
        self.transition(SessionState::Subscribed);

        // ── Dispatch until interrupted ──────────────────
        let dispatcher_cancel = interrupt.child_token();
        let mut dispatcher = tokio::spawn(
            Dispatcher::new(self.console.clone()).run(messages, dispatcher_cancel.clone()),
        );
        self.transition(SessionState::Running);

        let ended = tokio::select! {
            () = interrupt.cancelled() => None,
            joined = &mut dispatcher => Some(joined),
        };

        let outcome = match ended {
            None => {
                dispatcher_cancel.cancel();
                if let Err(err) = dispatcher.await {
                    warn!(%err, "dispatcher task failed during shutdown");
                }
                Ok(())
            }
            Some(Ok(DispatchEnd::StreamClosed)) => {
                self.say("Server exited");
                Err(AppError::Disconnected(
                    "service closed its output while running".into(),
                ))
            }
            Some(Ok(DispatchEnd::Cancelled)) => Ok(()),
            Some(Err(err)) => Err(AppError::Session(format!("dispatcher task failed: {err}"))),
        };

        self.shutdown(&mut transport).await;
        outcome
    }

    async fn subscribe(&self, transport: &Transport, target: &Path) -> Result<()> {
        let subscriptions = &self.config.protocol.subscriptions;
        transport
            .send_request(SET_SUBSCRIPTIONS, Some(set_subscriptions_params(subscriptions)))
            .await?;

        let roots = AnalysisRoots::single(target, &self.config.roots.excluded);
        transport
            .send_request(SET_ANALYSIS_ROOTS, Some(roots.to_params()))
            .await?;

        debug!(?subscriptions, included = ?roots.included(), "subscribed");
        Ok(())
    }

    /// `Stopping` → stop transport → `Stopped` → "Exiting...".
    async fn shutdown(&mut self, transport: &mut Transport) {
        self.transition(SessionState::Stopping);
        self.stop_transport(transport).await;
        self.transition(SessionState::Stopped);
        self.say("Exiting...");
    }

    /// Console output never interrupts the lifecycle; a failed write is logged.
    fn say(&self, text: impl Display) {
        if let Err(err) = self.console.line(text) {
            warn!(%err, "session: console write failed");
        }
    }

    async fn stop_transport(&self, transport: &mut Transport) {
        match transport.stop().await {
            Ok(outcome) => debug!(?outcome, "service stopped"),
            Err(err) => warn!(%err, "service did not stop cleanly"),
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal session transition {:?} -> {next:?}",
            self.state
        );
        info!(from = ?self.state, to = ?next, "session state changed");
        self.state = next;
    }
}
