//! In-memory scratch stores shared with node handlers.
//!
//! Two independent namespaces exist per worker: a run-wide store reachable
//! from every handler through its capability surface, and a local store for
//! worker-internal bookkeeping. Both are plain string-keyed maps with no
//! expiry and no persistence; they live exactly as long as the process.

use rustc_hash::FxHashMap;
use serde_json::Value;

/// Flat string-keyed mapping to arbitrary JSON values.
#[derive(Clone, Debug, Default)]
pub struct KeyValueStore {
    entries: FxHashMap<String, Value>,
}

impl KeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn delete(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Set under a composite `scope_key` key, the convention handlers use to
    /// partition the run-wide namespace.
    pub fn scoped_set(&mut self, scope: &str, key: &str, value: Value) {
        self.set(format!("{scope}_{key}"), value);
    }

    #[must_use]
    pub fn scoped_get(&self, scope: &str, key: &str) -> Option<&Value> {
        self.entries.get(&format!("{scope}_{key}"))
    }

    pub fn scoped_delete(&mut self, scope: &str, key: &str) -> Option<Value> {
        self.entries.remove(&format!("{scope}_{key}"))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
