//! NDJSON codec for service process streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so an
//! unterminated or oversized message cannot exhaust memory.
//!
//! Oversized and non-UTF-8 lines are surfaced as [`Frame`] values rather than
//! decoder errors. `FramedRead` yields one `None` after any decoder error,
//! which a reader loop would mistake for end of stream; keeping per-line
//! problems inside `Ok` leaves the stream running.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum line length accepted on the inbound stream: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// One decoded inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line without its trailing `\n` (or `\r\n`).
    Line(String),
    /// A line longer than [`MAX_LINE_BYTES`]; its bytes were discarded.
    Oversized,
    /// A line that was not valid UTF-8; its bytes were discarded.
    InvalidUtf8,
}

/// NDJSON codec for the service's stdio streams.
///
/// # Decoder
///
/// Yields one [`Frame`] per `\n`-terminated line. Only I/O failures of the
/// underlying stream are returned as errors.
///
/// # Encoder
///
/// Outbound strings are encoded as `item\n`. The max-length limit is a
/// decoder-side concern and is not enforced during encoding.
#[derive(Debug)]
pub struct ServiceCodec(LinesCodec);

impl ServiceCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom inbound line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max_length))
    }
}

impl Default for ServiceCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ServiceCodec {
    type Item = Frame;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        map_decoded(self.0.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        map_decoded(self.0.decode_eof(src))
    }
}

impl Encoder<String> for ServiceCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.0
            .encode(item, dst)
            .map_err(|e| AppError::Write(format!("failed to encode frame: {e}")))
    }
}

// ── Private helper ────────────────────────────────────────────────────────────

fn map_decoded(
    decoded: std::result::Result<Option<String>, LinesCodecError>,
) -> Result<Option<Frame>> {
    match decoded {
        Ok(line) => Ok(line.map(Frame::Line)),
        // LinesCodec keeps discarding until the next newline on its own.
        Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Frame::Oversized)),
        // The offending line was already consumed from the buffer.
        Err(LinesCodecError::Io(err)) if err.kind() == std::io::ErrorKind::InvalidData => {
            Ok(Some(Frame::InvalidUtf8))
        }
        Err(LinesCodecError::Io(err)) => Err(AppError::Io(err.to_string())),
    }
}
