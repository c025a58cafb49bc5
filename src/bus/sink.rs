//! Output targets for telemetry envelopes.

use std::io::{self, Result as IoResult, Stdout, Write};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::envelope::Envelope;
use crate::telemetry::{PlainFormatter, TelemetryFormatter};

/// Abstraction over an output target that consumes full Envelope objects.
pub trait EnvelopeSink: Send + Sync {
    /// Handle one envelope. The sink decides how to serialize/format it.
    fn handle(&mut self, envelope: &Envelope) -> IoResult<()>;
}

/// Stdout sink with optional formatting.
pub struct StdOutSink<F: TelemetryFormatter = PlainFormatter> {
    handle: Stdout,
    formatter: F,
}

impl Default for StdOutSink {
    fn default() -> Self {
        Self {
            handle: io::stdout(),
            formatter: PlainFormatter::new(),
        }
    }
}

impl<F: TelemetryFormatter> StdOutSink<F> {
    pub fn with_formatter(formatter: F) -> Self {
        Self {
            handle: io::stdout(),
            formatter,
        }
    }
}

impl<F: TelemetryFormatter> EnvelopeSink for StdOutSink<F> {
    fn handle(&mut self, envelope: &Envelope) -> IoResult<()> {
        let rendered = self.formatter.render_envelope(envelope);
        self.handle.write_all(rendered.as_bytes())?;
        self.handle.flush()
    }
}

/// In-memory sink for testing and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<Envelope>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all captured envelopes.
    pub fn snapshot(&self) -> Vec<Envelope> {
        self.entries.lock().unwrap().clone()
    }

    /// Clear all captured envelopes.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl EnvelopeSink for MemorySink {
    fn handle(&mut self, envelope: &Envelope) -> IoResult<()> {
        self.entries.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

/// Channel-based sink for streaming to async consumers.
///
/// Envelopes are forwarded to a tokio mpsc channel without blocking.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { tx }
    }
}

impl EnvelopeSink for ChannelSink {
    fn handle(&mut self, envelope: &Envelope) -> IoResult<()> {
        self.tx
            .send(envelope.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel receiver dropped"))
    }
}
