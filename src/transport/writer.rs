//! Writer task.
//!
//! Receives outbound JSON values from a tokio [`mpsc`] channel, encodes each
//! as one NDJSON line with [`ServiceCodec`], and writes it to the service's
//! stdin. Dropping the task drops the stdin handle, which is how the service
//! is told that no more input will come.

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::transport::codec::ServiceCodec;
use crate::{AppError, Result};

/// Serialise outbound messages and write them to `sink`.
///
/// The task exits cleanly when `cancel` fires or when every sender of
/// `msg_rx` has been dropped. Messages still queued at cancellation are
/// discarded.
///
/// # Errors
///
/// - [`AppError::Write`]`("failed to serialise outbound message: …")`.
/// - [`AppError::Write`]`("write failed: …")` if the sink is closed (the
///   service exited). The receiver is dropped on return, so later sends on
///   the channel fail as well.
pub async fn run_writer<W>(
    sink: W,
    mut msg_rx: mpsc::Receiver<serde_json::Value>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut sink = sink;
    let mut codec = ServiceCodec::new();
    let mut buf = BytesMut::new();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("writer: cancellation received, stopping");
                break;
            }

            msg = msg_rx.recv() => {
                let Some(value) = msg else {
                    debug!("writer: message channel closed, stopping");
                    break;
                };

                let line = serde_json::to_string(&value).map_err(|e| {
                    AppError::Write(format!("failed to serialise outbound message: {e}"))
                })?;

                buf.clear();
                codec.encode(line, &mut buf)?;

                write_frame(&mut sink, &buf).await.map_err(|e| {
                    warn!(error = %e, "writer: write to service stdin failed");
                    AppError::Write(format!("write failed: {e}"))
                })?;
            }
        }
    }

    sink.shutdown().await.ok();
    Ok(())
}

async fn write_frame<W>(sink: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    sink.write_all(frame).await?;
    sink.flush().await
}
