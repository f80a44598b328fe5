//! Reader task.
//!
//! Reads NDJSON lines from the service's stdout, parses each into an
//! [`Inbound`] message and forwards it through a tokio [`mpsc`] channel.
//!
//! Every per-line problem (oversized line, bad UTF-8, malformed JSON, a known
//! event with missing fields) is forwarded as `Err(AppError::Protocol)` for
//! that line alone; the loop keeps reading. Only EOF, an I/O error on the
//! stream, or cancellation end the task, and dropping the sender is what
//! closes the consumer's [`MessageStream`](crate::transport::MessageStream).

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::protocol::inbound::{parse_inbound_line, Inbound};
use crate::transport::codec::{Frame, ServiceCodec, MAX_LINE_BYTES};
use crate::{AppError, Result};

/// Read `source` until EOF or cancellation, forwarding decoded messages.
///
/// # Errors
///
/// Always returns `Ok(())`; stream failures are logged and end the task.
pub async fn run_reader<R>(
    source: R,
    msg_tx: mpsc::Sender<Result<Inbound>>,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(source, ServiceCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                let forwarded = match item {
                    None => {
                        debug!("reader: EOF on service stdout");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "reader: stream error, stopping");
                        break;
                    }
                    Some(Ok(frame)) => match frame_to_message(frame) {
                        Some(message) => message,
                        None => continue,
                    },
                };

                if msg_tx.send(forwarded).await.is_err() {
                    debug!("reader: message stream dropped, stopping");
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Turn one frame into the item handed to the consumer.
///
/// `None` means the frame carries nothing (a blank line).
fn frame_to_message(frame: Frame) -> Option<Result<Inbound>> {
    match frame {
        Frame::Line(line) => match parse_inbound_line(&line) {
            Ok(Some(message)) => {
                trace!(?message, "reader: message decoded");
                Some(Ok(message))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        },
        Frame::Oversized => Some(Err(AppError::Protocol(format!(
            "line too long: exceeded {MAX_LINE_BYTES} bytes"
        )))),
        Frame::InvalidUtf8 => Some(Err(AppError::Protocol(
            "line is not valid utf-8".into(),
        ))),
    }
}
