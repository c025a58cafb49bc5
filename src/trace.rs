//! Pull-based execution tracing.
//!
//! The tracer accumulates per-node input/output counters as the engine runs
//! and exposes them as dirty-diff snapshots: [`Tracer::snapshot`] returns
//! only the nodes touched since the previous call, then clears dirtiness.
//! Nothing is pushed anywhere; consumers poll on their own cadence.
//!
//! Sampling is explicit opt-in per node id. While an id is registered, every
//! output event buffers the latest resolved-instance sample and accumulates
//! `{execute_time_ms, samples}` statistics. Draining returns and clears the
//! buffered samples; the statistics persist.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use serde_json::Value;

use crate::utils::time::round3;

/// Per-port event counters with a running total.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PortCounters {
    pub ports: FxHashMap<String, u64>,
    pub total: u64,
}

impl PortCounters {
    fn record(&mut self, port: Option<&str>) {
        if let Some(port) = port {
            *self.ports.entry(port.to_string()).or_insert(0) += 1;
        }
        self.total += 1;
    }
}

/// Input and output counters for one node.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NodeTrace {
    pub inputs: PortCounters,
    pub outputs: PortCounters,
}

/// Accumulated output statistics for a sampled node.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SampleStats {
    pub execute_time_ms: f64,
    pub samples: u64,
}

/// Snapshot of a node's resolved state at one output event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeSample {
    pub node_id: String,
    pub name: String,
    pub type_name: String,
    /// Properties as resolved for the sampled visit.
    pub properties: Value,
    /// Payload of the sampled emission.
    pub payload: Value,
}

/// Observes execution without altering it.
#[derive(Debug, Default)]
pub struct Tracer {
    data: FxHashMap<String, NodeTrace>,
    dirty: FxHashSet<String>,
    sampled: FxHashMap<String, Option<NodeSample>>,
    stats: FxHashMap<String, SampleStats>,
}

impl Tracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one input event for `id`, optionally counted per port.
    pub fn record_input(&mut self, id: &str, port: Option<&str>) {
        self.dirty.insert(id.to_string());
        self.data
            .entry(id.to_string())
            .or_default()
            .inputs
            .record(port);
    }

    /// Record one output event for `id` on `port`.
    ///
    /// While `id` is in the sampling registry this also folds `elapsed_ms`
    /// into the node's accumulated statistics.
    pub fn record_output(&mut self, id: &str, port: &str, elapsed_ms: f64) {
        self.dirty.insert(id.to_string());
        self.data
            .entry(id.to_string())
            .or_default()
            .outputs
            .record(Some(port));

        if self.sampled.contains_key(id) {
            let stats = self.stats.entry(id.to_string()).or_default();
            stats.execute_time_ms = round3(stats.execute_time_ms + elapsed_ms);
            stats.samples += 1;
        }
    }

    /// Opt `id` into sampling. Idempotent; an existing sample buffer and its
    /// statistics are left untouched.
    pub fn watch(&mut self, id: impl Into<String>) {
        self.sampled.entry(id.into()).or_insert(None);
    }

    /// Remove `id` from the sampling registry, dropping any buffered sample.
    /// Accumulated statistics persist until explicitly cleared.
    pub fn unwatch(&mut self, id: &str) {
        self.sampled.remove(id);
    }

    #[must_use]
    pub fn is_watched(&self, id: &str) -> bool {
        self.sampled.contains_key(id)
    }

    /// Buffer the latest sample for a watched id. Ignored otherwise.
    pub fn record_sample(&mut self, id: &str, sample: NodeSample) {
        if let Some(slot) = self.sampled.get_mut(id) {
            *slot = Some(sample);
        }
    }

    /// Dirty-diff snapshot: counters for every node touched since the last
    /// call, or `None` if nothing changed. Clears dirtiness.
    pub fn snapshot(&mut self) -> Option<FxHashMap<String, NodeTrace>> {
        if self.dirty.is_empty() {
            return None;
        }
        let out: FxHashMap<String, NodeTrace> = self
            .dirty
            .drain()
            .filter_map(|id| self.data.get(&id).map(|trace| (id, trace.clone())))
            .collect();
        if out.is_empty() { None } else { Some(out) }
    }

    /// Read and clear the buffered sample of every watched id.
    pub fn drain_samples(&mut self) -> Vec<NodeSample> {
        self.sampled
            .values_mut()
            .filter_map(|slot| slot.take())
            .collect()
    }

    #[must_use]
    pub fn stats(&self, id: &str) -> Option<&SampleStats> {
        self.stats.get(id)
    }

    /// Current statistics for every sampled id with recorded output.
    #[must_use]
    pub fn stats_snapshot(&self) -> FxHashMap<String, SampleStats> {
        self.stats
            .iter()
            .map(|(id, stats)| (id.clone(), stats.clone()))
            .collect()
    }

    #[must_use]
    pub fn counters(&self, id: &str) -> Option<&NodeTrace> {
        self.data.get(id)
    }
}
