//! Workflow variables and resolved credential fields.
//!
//! The surrounding system materializes workflow variables and credential
//! fields as process environment variables before the worker starts:
//! variables under `WFV_<NAME>`, credential fields under
//! `WFC_<CREDENTIAL>_<FIELD>`. This module snapshots them into flat maps and
//! exposes the variable map to the property resolver as the `env` binding.

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

/// Prefix of workflow variables in the process environment.
pub const VARIABLE_PREFIX: &str = "WFV_";
/// Prefix of resolved credential fields in the process environment.
pub const CREDENTIAL_PREFIX: &str = "WFC_";

/// Flat variable and secret maps scoped to one worker.
#[derive(Clone, Debug, Default)]
pub struct VariableStore {
    variables: FxHashMap<String, String>,
    secrets: FxHashMap<String, String>,
}

impl VariableStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot prefixed entries from the process environment, loading a
    /// `.env` file first when one exists.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut store = Self::new();
        for (key, value) in std::env::vars() {
            if let Some(name) = key.strip_prefix(VARIABLE_PREFIX) {
                store.variables.insert(name.to_lowercase(), value);
            } else if let Some(name) = key.strip_prefix(CREDENTIAL_PREFIX) {
                store.secrets.insert(name.to_lowercase(), value);
            }
        }
        store
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn set_secret(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.secrets.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn secret(&self, name: &str) -> Option<&str> {
        self.secrets.get(name).map(String::as_str)
    }

    /// The `env` object template expressions evaluate against. Secrets are
    /// deliberately excluded from the expression scope.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        let mut out = Map::new();
        for (name, value) in &self.variables {
            out.insert(name.clone(), Value::String(value.clone()));
        }
        Value::Object(out)
    }

    /// Log which expected variables are present (✓) or missing (⚠).
    pub fn report(&self, expected: &[&str]) {
        for name in expected {
            if self.variables.contains_key(*name) {
                tracing::info!(target: "weftrun::variables", variable = %name, "✓ set");
            } else {
                tracing::warn!(target: "weftrun::variables", variable = %name, "⚠ not set");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_excludes_secrets() {
        let mut store = VariableStore::new();
        store.set_variable("region", "eu");
        store.set_secret("api_token", "s3cret");
        assert_eq!(store.snapshot(), json!({"region": "eu"}));
        assert_eq!(store.secret("api_token"), Some("s3cret"));
    }

    #[test]
    fn variables_are_readable_by_name() {
        let mut store = VariableStore::new();
        store.set_variable("retries", "3");
        assert_eq!(store.variable("retries"), Some("3"));
        assert_eq!(store.variable("missing"), None);
    }
}
