//! Tagged telemetry payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Target tag an external observer consumes opaquely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryTarget {
    /// Dirty-diff tracer snapshots.
    Trace,
    /// Latest resolved-instance samples for watched nodes.
    NodeSample,
    /// Accumulated output statistics for watched nodes.
    NodeStats,
    /// Debug step records.
    Debug,
    /// Aggregated log batches.
    Logs,
    /// Memory usage samples.
    Memory,
}

impl fmt::Display for TelemetryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Trace => "trace",
            Self::NodeSample => "node_sample",
            Self::NodeStats => "node_stats",
            Self::Debug => "debug",
            Self::Logs => "logs",
            Self::Memory => "memory",
        };
        write!(f, "{label}")
    }
}

/// One telemetry record: a target tag and an opaque payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub target: TelemetryTarget,
    pub data: Value,
}

impl Envelope {
    #[must_use]
    pub fn new(target: TelemetryTarget, data: Value) -> Self {
        Self { target, data }
    }
}
