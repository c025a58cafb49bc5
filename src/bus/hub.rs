//! Request/reply message hub between worker processes.
//!
//! Messages carrying a reply expectation are routed through a subscriber
//! table (kind -> list of async handlers); all handler results are
//! collected, flattened one level, and posted back to the requester.
//! Messages without a reply expectation fan out to every matching
//! subscriber with no response.
//!
//! Requests are correlated by a generated identifier and bounded by a fixed
//! timeout ([`REQUEST_TIMEOUT`]); an unanswered request is rejected and its
//! pending entry removed.
//!
//! The hub is transport-agnostic: it emits [`WireMessage`]s on an outbound
//! channel and expects the transport driver to feed inbound messages to
//! [`MessageHub::dispatch`]. [`MessageHub::link`] wires two hubs directly
//! together, which is how tests (and single-process setups) use it.

use futures_util::future::BoxFuture;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::utils::id_generator::IdGenerator;

/// How long a request may stay unanswered before it is rejected.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type Subscriber = Arc<dyn Fn(Value) -> BoxFuture<'static, Option<Value>> + Send + Sync>;

/// Message envelope exchanged between hubs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Expects a correlated [`WireMessage::Response`].
    Request { id: String, kind: String, data: Value },
    /// Fire-and-forget fan-out.
    Notify { kind: String, data: Value },
    Response { id: String, data: Value },
}

/// Errors surfaced to hub callers.
#[derive(Debug, Error, Diagnostic)]
pub enum HubError {
    /// The peer did not answer within the request timeout; the pending
    /// entry was dropped.
    #[error("request `{kind}` timed out")]
    #[diagnostic(code(weftrun::hub::timeout))]
    Timeout { kind: String },

    #[error("hub transport disconnected")]
    #[diagnostic(code(weftrun::hub::disconnected))]
    Disconnected,
}

/// One end of a request/reply channel with a local subscriber table.
pub struct MessageHub {
    subscribers: Mutex<FxHashMap<String, Vec<Subscriber>>>,
    pending: Mutex<FxHashMap<String, oneshot::Sender<Value>>>,
    outbound: flume::Sender<WireMessage>,
    timeout: Duration,
    ids: IdGenerator,
}

impl MessageHub {
    /// Create a hub and the outbound side of its transport.
    #[must_use]
    pub fn new() -> (Arc<Self>, flume::Receiver<WireMessage>) {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    /// Create a hub with a custom request timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> (Arc<Self>, flume::Receiver<WireMessage>) {
        let (tx, rx) = flume::unbounded();
        let hub = Arc::new(Self {
            subscribers: Mutex::new(FxHashMap::default()),
            pending: Mutex::new(FxHashMap::default()),
            outbound: tx,
            timeout,
            ids: IdGenerator::new(),
        });
        (hub, rx)
    }

    /// Register an async handler for a message kind.
    pub fn subscribe<F, Fut>(&self, kind: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Value>> + Send + 'static,
    {
        let subscriber: Subscriber =
            Arc::new(move |value| -> BoxFuture<'static, Option<Value>> {
                Box::pin(handler(value))
            });
        self.subscribers
            .lock()
            .unwrap()
            .entry(kind.into())
            .or_default()
            .push(subscriber);
    }

    /// Send a message expecting no response.
    pub fn notify(&self, kind: impl Into<String>, data: Value) -> Result<(), HubError> {
        self.outbound
            .send(WireMessage::Notify {
                kind: kind.into(),
                data,
            })
            .map_err(|_| HubError::Disconnected)
    }

    /// Send a request and await its correlated response.
    ///
    /// Rejects with [`HubError::Timeout`] after the configured timeout, at
    /// which point the pending entry is removed.
    pub async fn request(&self, kind: impl Into<String>, data: Value) -> Result<Value, HubError> {
        let kind = kind.into();
        let id = self.ids.generate_request_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id.clone(), tx);

        let sent = self.outbound.send(WireMessage::Request {
            id: id.clone(),
            kind: kind.clone(),
            data,
        });
        if sent.is_err() {
            self.pending.lock().unwrap().remove(&id);
            return Err(HubError::Disconnected);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => {
                self.pending.lock().unwrap().remove(&id);
                Err(HubError::Disconnected)
            }
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(HubError::Timeout { kind })
            }
        }
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Process one inbound message; a request yields the response to send
    /// back over the transport.
    pub async fn dispatch(&self, message: WireMessage) -> Option<WireMessage> {
        match message {
            WireMessage::Request { id, kind, data } => {
                let handlers = self.handlers_for(&kind);
                if handlers.is_empty() {
                    tracing::warn!(target: "weftrun::hub", %kind, "no subscriber for request");
                    return Some(WireMessage::Response {
                        id,
                        data: Value::Null,
                    });
                }
                let mut collected = Vec::new();
                for handler in handlers {
                    if let Some(result) = handler(data.clone()).await {
                        // Array results are flattened one level into the
                        // combined reply.
                        match result {
                            Value::Array(items) => collected.extend(items),
                            other => collected.push(other),
                        }
                    }
                }
                Some(WireMessage::Response {
                    id,
                    data: Value::Array(collected),
                })
            }
            WireMessage::Notify { kind, data } => {
                for handler in self.handlers_for(&kind) {
                    handler(data.clone()).await;
                }
                None
            }
            WireMessage::Response { id, data } => {
                if let Some(waiter) = self.pending.lock().unwrap().remove(&id) {
                    let _ = waiter.send(data);
                }
                None
            }
        }
    }

    fn handlers_for(&self, kind: &str) -> Vec<Subscriber> {
        self.subscribers
            .lock()
            .unwrap()
            .get(kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Wire two hubs directly together, spawning a forwarding task per
    /// direction. Dropping either receiver ends its task.
    pub fn link(
        left: Arc<Self>,
        left_rx: flume::Receiver<WireMessage>,
        right: Arc<Self>,
        right_rx: flume::Receiver<WireMessage>,
    ) -> (JoinHandle<()>, JoinHandle<()>) {
        let forward_left = {
            let left = left.clone();
            let right = right.clone();
            tokio::spawn(async move {
                while let Ok(message) = left_rx.recv_async().await {
                    if let Some(response) = right.dispatch(message).await {
                        left.dispatch(response).await;
                    }
                }
            })
        };
        let forward_right = tokio::spawn(async move {
            while let Ok(message) = right_rx.recv_async().await {
                if let Some(response) = left.dispatch(message).await {
                    right.dispatch(response).await;
                }
            }
        });
        (forward_left, forward_right)
    }
}
