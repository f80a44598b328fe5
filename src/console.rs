//! Human-readable console output.
//!
//! Everything the user is meant to read (issue listings, summaries, status
//! lines) goes through a [`Console`]. Logs go through `tracing` on stderr
//! instead, so the two never interleave on the same stream.

use std::fmt::Display;
use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::{AppError, Result};

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Cloneable handle to a line-oriented output sink.
#[derive(Clone)]
pub struct Console {
    sink: Sink,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

impl Console {
    /// Console writing to the process's stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::from_writer(std::io::stdout())
    }

    /// Console writing to an arbitrary writer.
    #[must_use]
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Console backed by an in-memory buffer, plus a handle to read it back.
    #[must_use]
    pub fn memory() -> (Self, ConsoleBuffer) {
        let buffer = ConsoleBuffer::default();
        (Self::from_writer(buffer.clone()), buffer)
    }

    /// Write one line and flush.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the sink is poisoned or the write fails.
    pub fn line(&self, text: impl Display) -> Result<()> {
        let mut sink = self
            .sink
            .lock()
            .map_err(|_| AppError::Io("console lock poisoned".into()))?;
        writeln!(sink, "{text}")?;
        sink.flush()?;
        Ok(())
    }
}

/// Shared in-memory buffer behind [`Console::memory`].
#[derive(Debug, Clone, Default)]
pub struct ConsoleBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl ConsoleBuffer {
    /// Everything written so far, lossily decoded as UTF-8.
    #[must_use]
    pub fn contents(&self) -> String {
        self.bytes
            .lock()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }

    /// Written output split into lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }
}

impl Write for ConsoleBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut bytes = self
            .bytes
            .lock()
            .map_err(|_| std::io::Error::other("console buffer lock poisoned"))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
