//! Service process spawner.
//!
//! Launches the configured executable with all three stdio streams piped and
//! `kill_on_drop(true)`, so a session that is dropped without an orderly
//! stop still reaps its child.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::{AppError, Result};

/// A freshly spawned service process with its stdio handles detached.
#[derive(Debug)]
pub struct ServiceProcess {
    /// Child handle; owns the process lifetime.
    pub child: Child,
    /// Write side of the duplex channel.
    pub stdin: ChildStdin,
    /// Read side of the duplex channel.
    pub stdout: ChildStdout,
    /// Diagnostic output of the service.
    pub stderr: ChildStderr,
}

/// Spawn the service process described by `config`.
///
/// # Errors
///
/// - `AppError::Launch("failed to spawn …")` — executable missing or not
///   runnable.
/// - `AppError::Launch("failed to capture …")` — a stdio pipe was not
///   created.
pub fn spawn_service(config: &ServerConfig) -> Result<ServiceProcess> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Launch(format!("failed to spawn {}: {err}", config.command)))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Launch("failed to capture service stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Launch("failed to capture service stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Launch("failed to capture service stderr".into()))?;

    info!(
        command = %config.command,
        args = ?config.args,
        pid = child.id(),
        "service process spawned"
    );

    Ok(ServiceProcess {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Drain the service's stderr into the log so the pipe never fills up.
///
/// Ends on EOF or the first read error.
#[must_use]
pub fn forward_stderr(stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => debug!(target: "service_stderr", "{line}"),
                Ok(None) => break,
                Err(err) => {
                    debug!(%err, "service stderr read failed");
                    break;
                }
            }
        }
    })
}
