//! Template resolution for node properties.
//!
//! Before every handler invocation the engine rewrites the node's property
//! values: every string containing one or more `{{ expression }}` spans is
//! expanded against a per-visit scope, and marker-free strings in the
//! canonical `value` field get a literal-JSON coercion attempt.
//!
//! # Scope
//!
//! Expressions see exactly three kinds of bindings:
//!
//! - `env` — the workflow variable snapshot,
//! - `input` — the payload (and origin/port) that triggered this visit,
//! - one entry per node that has already produced output in this branch,
//!   keyed by the node's NAME and holding `{data, meta?}`,
//!
//! plus the fixed helper library (see [`functions`]). Evaluation is a
//! restricted-grammar interpreter — tokenizer, recursive-descent parser,
//! tree-walking evaluator — with no access to the host process; see
//! [`eval`] for the exact surface.
//!
//! # Substitution rules
//!
//! - A value that IS exactly one span takes the expression's native result:
//!   objects, arrays, numbers, booleans, and strings are preserved as-is,
//!   `null` clears the value to null, and an undefined result clears it to
//!   the empty string.
//! - A span inside a larger string is spliced in place: string results
//!   verbatim, everything else stringified.
//! - A failing expression logs an evaluation fault, clears that scalar to
//!   null, and execution continues — faults are isolated per property.
//! - Expansion is capped at [`MAX_RESOLVE_PASSES`] passes per scalar; the
//!   cap logs a fault and leaves the value partially resolved.
//!
//! # Examples
//!
//! ```
//! use serde_json::{Map, json};
//! use weftrun::resolver::PropertyResolver;
//!
//! let mut scope = Map::new();
//! scope.insert("env".into(), json!({"stage": "prod"}));
//! let resolver = PropertyResolver::from_scope(scope);
//!
//! let out = resolver.resolve_string("demo", "deploy-{{ env.stage }}");
//! assert_eq!(out, "deploy-prod");
//! ```

mod eval;
mod functions;
mod lexer;
mod parser;

pub use eval::{EvalError, Evaluated};

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use crate::engine::BranchState;
use crate::graph::WorkflowGraph;
use crate::node::InputData;
use crate::properties::{Properties, Property, PropertyKind};
use crate::variables::VariableStore;

/// Upper bound on expansion passes for a single scalar. Bounds pathological
/// expressions whose result re-introduces template markers.
pub const MAX_RESOLVE_PASSES: usize = 100;

static SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{(.+?)\}\}").expect("span pattern is valid"));

fn contains_markers(text: &str) -> bool {
    text.contains("{{") && text.contains("}}")
}

struct Span {
    start: usize,
    end: usize,
    inner: String,
}

fn find_spans(text: &str) -> Vec<Span> {
    SPAN_RE
        .captures_iter(text)
        .map(|caps| {
            let whole = caps.get(0).expect("group 0 always present");
            let inner = caps.get(1).expect("pattern has one group");
            Span {
                start: whole.start(),
                end: whole.end(),
                inner: inner.as_str().to_string(),
            }
        })
        .collect()
}

/// Expands `{{ expression }}` spans in property trees for one node visit.
///
/// The resolver owns its scope by value; construction snapshots everything
/// it needs, so the borrow of graph and branch state ends at the
/// constructor.
pub struct PropertyResolver {
    scope: Map<String, Value>,
}

impl PropertyResolver {
    /// Resolver over an explicit scope map.
    #[must_use]
    pub fn from_scope(scope: Map<String, Value>) -> Self {
        Self { scope }
    }

    /// Build the evaluation scope for one node visit.
    #[must_use]
    pub fn for_visit(
        graph: &WorkflowGraph,
        branch: &BranchState,
        variables: &VariableStore,
        input: &InputData,
    ) -> Self {
        let mut scope = Map::new();
        scope.insert("env".to_string(), variables.snapshot());
        scope.insert("input".to_string(), input.scope_value());

        for (node_id, output) in branch.outputs() {
            let Some(node) = graph.node(node_id) else {
                continue;
            };
            let mut entry = Map::new();
            entry.insert("data".to_string(), output.payload.clone());
            if let Some(meta) = &output.meta {
                entry.insert("meta".to_string(), meta.clone());
            }
            scope.insert(node.name.clone(), Value::Object(entry));
        }

        Self { scope }
    }

    /// Replace the `input` binding with a bare payload.
    ///
    /// Used for exec-log templating, where the message refers to the payload
    /// the node just emitted rather than the one it received.
    #[must_use]
    pub fn with_input_payload(mut self, payload: &Value) -> Self {
        self.scope
            .insert("input".to_string(), serde_json::json!({"data": payload}));
        self
    }

    /// Resolve a full named-property schema. The input is deep-cloned; the
    /// original stays untouched.
    #[must_use]
    pub fn resolve_properties(&self, node_label: &str, properties: &Properties) -> Properties {
        let mut resolved = properties.clone();
        for property in resolved.values_mut() {
            self.resolve_property(node_label, property);
        }
        resolved
    }

    /// Resolve a single free-form string (message templating).
    #[must_use]
    pub fn resolve_string(&self, node_label: &str, text: &str) -> String {
        match self.resolve_scalar(node_label, text, false) {
            Value::String(s) => s,
            other => eval::stringify(&other),
        }
    }

    fn resolve_property(&self, label: &str, property: &mut Property) {
        // Options entries carry UI choices, never templates.
        if property.kind == PropertyKind::Options {
            return;
        }
        if let Some(mode) = property.evaluation {
            if !mode.active {
                return;
            }
            if mode.all {
                if let Value::String(raw) = &property.value {
                    property.value = Value::String(format!("{{{{{raw}}}}}"));
                }
            }
        }

        let serialized = serde_json::to_string(property).unwrap_or_default();
        if contains_markers(&serialized) {
            // The list item-template is a shape definition for future items,
            // not live data; it lives outside `value` and is never walked.
            self.resolve_value(label, &mut property.value, true);
        } else if let Value::String(raw) = &property.value {
            if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
                property.value = parsed;
            }
        }
    }

    fn resolve_value(&self, label: &str, value: &mut Value, is_value_field: bool) {
        match value {
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    self.resolve_value(label, child, key == "value");
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.resolve_value(label, item, false);
                }
            }
            Value::String(text) => {
                let text = text.clone();
                *value = self.resolve_scalar(label, &text, is_value_field);
            }
            _ => {}
        }
    }

    fn resolve_scalar(&self, label: &str, text: &str, is_value_field: bool) -> Value {
        if !contains_markers(text) {
            if is_value_field {
                if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                    return parsed;
                }
            }
            return Value::String(text.to_string());
        }

        let mut current = Value::String(text.to_string());
        let mut passes = 0;
        loop {
            let Value::String(pending) = &current else {
                break;
            };
            let spans = find_spans(pending);
            if spans.is_empty() {
                break;
            }
            if passes == MAX_RESOLVE_PASSES {
                tracing::error!(
                    target: "weftrun::resolver",
                    node = %label,
                    passes = MAX_RESOLVE_PASSES,
                    "property expansion exceeded the pass cap; leaving it partially resolved"
                );
                break;
            }
            passes += 1;
            let pending = pending.clone();
            current = self.substitute(label, &pending, &spans);
        }

        if is_value_field {
            if let Value::String(text) = &current {
                if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                    current = parsed;
                }
            }
        }
        current
    }

    fn substitute(&self, label: &str, text: &str, spans: &[Span]) -> Value {
        // A value that is exactly one span takes the native result.
        if spans.len() == 1 && spans[0].start == 0 && spans[0].end == text.len() {
            return match self.evaluate_span(label, &spans[0].inner) {
                Ok(Evaluated::Value(value)) => value,
                Ok(Evaluated::Undefined) => Value::String(String::new()),
                Err(_) => Value::Null,
            };
        }

        let mut out = String::new();
        let mut cursor = 0;
        for span in spans {
            out.push_str(&text[cursor..span.start]);
            match self.evaluate_span(label, &span.inner) {
                Ok(Evaluated::Value(value)) => out.push_str(&eval::stringify(&value)),
                Ok(Evaluated::Undefined) => {}
                Err(_) => return Value::Null,
            }
            cursor = span.end;
        }
        out.push_str(&text[cursor..]);
        Value::String(out)
    }

    fn evaluate_span(&self, label: &str, inner: &str) -> Result<Evaluated, EvalError> {
        eval::evaluate(inner, &self.scope).inspect_err(|error| {
            tracing::error!(
                target: "weftrun::resolver",
                node = %label,
                expression = %inner.trim(),
                %error,
                "property expression failed"
            );
        })
    }
}
