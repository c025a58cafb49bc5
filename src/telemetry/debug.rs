//! Debug step records for interactive development.
//!
//! When enabled, the probe keeps the last payload seen per node within each
//! correlation flow and produces one record per execution step for the
//! `debug` telemetry target. Disabled probes cost a branch and nothing
//! else.

use rustc_hash::FxHashMap;
use serde_json::{Value, json};

/// Collects per-correlation execution step records.
#[derive(Debug, Default)]
pub struct DebugProbe {
    enabled: bool,
    data: FxHashMap<String, FxHashMap<String, Value>>,
}

impl DebugProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle the probe. Disabling clears all buffered step data.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.data.clear();
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record one execution step; returns the debug record to publish, or
    /// `None` while the probe is disabled.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &mut self,
        correlation_id: &str,
        origin: &str,
        destiny: &[String],
        elapsed_ms: f64,
        accumulative_ms: f64,
        payload: &Value,
        memory_mb: Option<f64>,
    ) -> Option<Value> {
        if !self.enabled {
            return None;
        }
        self.data
            .entry(correlation_id.to_string())
            .or_default()
            .insert(origin.to_string(), payload.clone());

        Some(json!({
            "correlation_id": correlation_id,
            "origin": origin,
            "destiny": destiny,
            "date": chrono::Local::now().format("%d/%m/%Y %H:%M:%S%.3f").to_string(),
            "time": {
                "elapsed_ms": elapsed_ms,
                "accumulative_ms": accumulative_ms,
            },
            "memory_mb": memory_mb,
        }))
    }

    /// Last payload recorded for `node` within `correlation_id`.
    #[must_use]
    pub fn last_payload(&self, correlation_id: &str, node: &str) -> Option<&Value> {
        self.data.get(correlation_id).and_then(|flow| flow.get(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_probe_records_nothing() {
        let mut probe = DebugProbe::new();
        let record = probe.record("c1", "A", &["B".into()], 1.0, 1.0, &json!({"x": 1}), None);
        assert!(record.is_none());
        assert!(probe.last_payload("c1", "A").is_none());
    }

    #[test]
    fn enabled_probe_tracks_last_payload_per_flow() {
        let mut probe = DebugProbe::new();
        probe.set_enabled(true);
        let record = probe
            .record("c1", "A", &["B".into()], 1.5, 3.0, &json!({"x": 1}), Some(10.0))
            .unwrap();
        assert_eq!(record["origin"], "A");
        assert_eq!(record["time"]["accumulative_ms"], 3.0);
        assert_eq!(probe.last_payload("c1", "A"), Some(&json!({"x": 1})));

        probe.record("c1", "A", &["B".into()], 1.0, 4.0, &json!({"x": 2}), None);
        assert_eq!(probe.last_payload("c1", "A"), Some(&json!({"x": 2})));
    }

    #[test]
    fn disabling_clears_buffered_steps() {
        let mut probe = DebugProbe::new();
        probe.set_enabled(true);
        probe.record("c1", "A", &[], 0.0, 0.0, &json!(1), None);
        probe.set_enabled(false);
        assert!(probe.last_payload("c1", "A").is_none());
    }
}
