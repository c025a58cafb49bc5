//! Property schemas attached to nodes and node-type descriptors.
//!
//! A node type declares a named property schema; each node overlays its own
//! values onto a clone of that schema. The [`resolver`](crate::resolver)
//! rewrites property values containing `{{ expression }}` spans before every
//! handler invocation, so the types here deliberately keep values as raw
//! [`serde_json::Value`] trees.
//!
//! # Examples
//!
//! ```
//! use weftrun::properties::{Property, PropertyKind};
//! use serde_json::json;
//!
//! let prop = Property::text("prefix-{{ _now('YYYY') }}-suffix");
//! assert_eq!(prop.kind, PropertyKind::String);
//!
//! let secret = Property::new(PropertyKind::Secret, json!("API_TOKEN"));
//! assert_eq!(secret.kind, PropertyKind::Secret);
//! ```

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Named property schema: property name to declared entry.
pub type Properties = FxHashMap<String, Property>;

/// One declared property: kind, current value, and type-specific metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Declared kind, driving resolution and dependency indexing.
    #[serde(rename = "type", default)]
    pub kind: PropertyKind,
    /// Current value; rewritten by the resolver before handler invocation.
    #[serde(default)]
    pub value: Value,
    /// Shape template for items of a list property. The template describes
    /// future items, not live data, so the resolver skips it at the first
    /// level of a list property.
    #[serde(rename = "object", default, skip_serializing_if = "Option::is_none")]
    pub item_template: Option<Value>,
    /// Per-property resolution switches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationMode>,
}

impl Property {
    #[must_use]
    pub fn new(kind: PropertyKind, value: Value) -> Self {
        Self {
            kind,
            value,
            item_template: None,
            evaluation: None,
        }
    }

    /// String-kinded property, the most common schema entry.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::new(PropertyKind::String, Value::String(value.into()))
    }

    /// List-kinded property with an item shape template.
    #[must_use]
    pub fn list(value: Value, item_template: Value) -> Self {
        Self {
            kind: PropertyKind::List,
            value,
            item_template: Some(item_template),
            evaluation: None,
        }
    }

    #[must_use]
    pub fn with_evaluation(mut self, evaluation: EvaluationMode) -> Self {
        self.evaluation = Some(evaluation);
        self
    }
}

/// Declared property kinds.
///
/// `Secret` and `Credential` values feed the graph's dependency index;
/// `Options` entries carry UI choices and are never template-resolved;
/// unrecognized kinds deserialize to `Unknown` and behave like `String`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    #[default]
    String,
    Number,
    Boolean,
    Code,
    List,
    Options,
    Secret,
    Credential,
    #[serde(other)]
    Unknown,
}

/// Resolution switches carried on a property entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationMode {
    /// `false` skips resolution for the entry entirely.
    #[serde(default = "default_active")]
    pub active: bool,
    /// `true` treats the whole raw value as a single expression span.
    #[serde(default)]
    pub all: bool,
}

impl Default for EvaluationMode {
    fn default() -> Self {
        Self {
            active: true,
            all: false,
        }
    }
}

fn default_active() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_definition_shape() {
        let prop: Property = serde_json::from_value(json!({
            "type": "list",
            "value": [],
            "object": {"name": {"type": "string", "value": ""}}
        }))
        .unwrap();
        assert_eq!(prop.kind, PropertyKind::List);
        assert!(prop.item_template.is_some());
    }

    #[test]
    fn unknown_kind_falls_back() {
        let prop: Property =
            serde_json::from_value(json!({"type": "textarea", "value": "x"})).unwrap();
        assert_eq!(prop.kind, PropertyKind::Unknown);
    }

    #[test]
    fn evaluation_defaults_to_active() {
        let mode: EvaluationMode = serde_json::from_value(json!({"all": true})).unwrap();
        assert!(mode.active);
        assert!(mode.all);
    }
}
