//! Broadcasting bus for telemetry envelopes.

use std::sync::{Arc, Mutex};
use tokio::{sync::oneshot, task};

use super::envelope::Envelope;
use super::sink::{EnvelopeSink, StdOutSink};

/// Receives envelopes and broadcasts them to multiple sinks.
pub struct EnvelopeBus {
    sinks: Arc<Mutex<Vec<Box<dyn EnvelopeSink>>>>,
    channel: (flume::Sender<Envelope>, flume::Receiver<Envelope>),
    listener: Arc<Mutex<Option<ListenerState>>>,
}

impl Default for EnvelopeBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink::default())
    }
}

impl EnvelopeBus {
    /// Create a bus with a single sink.
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EnvelopeSink + 'static,
    {
        Self {
            sinks: Arc::new(Mutex::new(vec![Box::new(sink)])),
            channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a bus with multiple sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn EnvelopeSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Dynamically add a sink.
    pub fn add_sink<T: EnvelopeSink + 'static>(&self, sink: T) {
        self.sinks.lock().unwrap().push(Box::new(sink));
    }

    /// Clone of the sender side so producers can post envelopes.
    pub fn sender(&self) -> flume::Sender<Envelope> {
        self.channel.0.clone()
    }

    /// Spawn a background task that forwards envelopes to every sink.
    /// Idempotent: calling multiple times has no effect.
    pub fn listen(&self) {
        let mut guard = self.listener.lock().expect("listener poisoned");
        if guard.is_some() {
            return;
        }

        let receiver = self.channel.1.clone();
        let sinks = self.sinks.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break,
                        Ok(envelope) => {
                            let mut sinks = sinks.lock().unwrap();
                            for sink in sinks.iter_mut() {
                                if let Err(error) = sink.handle(&envelope) {
                                    tracing::warn!(
                                        target: "weftrun::bus",
                                        %error,
                                        "envelope sink failed"
                                    );
                                }
                            }
                        }
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background listener task, draining nothing further.
    pub async fn stop(&self) {
        let state = {
            let mut guard = self.listener.lock().expect("listener poisoned");
            guard.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for EnvelopeBus {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock() {
            if let Some(state) = guard.take() {
                let _ = state.shutdown_tx.send(());
                state.handle.abort();
            }
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}
