//! Telemetry envelopes and cross-process messaging.
//!
//! Two independent surfaces live here:
//!
//! - **Outbound telemetry**: [`Envelope`]s tagged with a [`TelemetryTarget`]
//!   are posted to an [`EnvelopeBus`], which broadcasts them to pluggable
//!   [`EnvelopeSink`]s (stdout, in-memory, channel) from a background task.
//!   The engine only ever produces tagged payloads; what observers do with
//!   them is their business.
//! - **Inbound messaging**: a [`MessageHub`] with a subscriber table,
//!   request/reply correlation, and a fixed request timeout.

#[allow(clippy::module_inception)]
mod bus;
mod envelope;
mod hub;
mod sink;

pub use bus::EnvelopeBus;
pub use envelope::{Envelope, TelemetryTarget};
pub use hub::{HubError, MessageHub, REQUEST_TIMEOUT, WireMessage};
pub use sink::{ChannelSink, EnvelopeSink, MemorySink, StdOutSink};
