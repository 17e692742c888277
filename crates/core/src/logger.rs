//! Counted deploy log.
//!
//! Every message is written to the sink as soon as it is added, suffixed
//! with its 1-based sequence number. Entries are also kept in memory and
//! mirrored to `tracing` at debug level.

use std::io::{self, Write};

/// A single log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub message: String,
    pub seq: u64,
}

/// Append-only message log with a per-instance counter.
pub struct Logger {
    sink: Box<dyn Write + Send>,
    entries: Vec<LogEntry>,
}

impl Logger {
    /// Logger writing to stdout.
    pub fn new() -> Self {
        Self::with_sink(io::stdout())
    }

    pub fn with_sink(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            entries: Vec::new(),
        }
    }

    /// Append `message` and write `message<seq>` as one line.
    pub fn add(&mut self, message: impl Into<String>) {
        let message = message.into();
        let seq = self.entries.len() as u64 + 1;

        tracing::debug!(seq, "{message}");

        // Sink failures are ignored, the entry is still recorded.
        let _ = writeln!(self.sink, "{message}{seq}");
        let _ = self.sink.flush();

        self.entries.push(LogEntry { message, seq });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    /// Messages only, in order.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.message.as_str())
    }

    pub fn count(&self) -> u64 {
        self.entries.len() as u64
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}
