//! Workflow definition documents.
//!
//! The external JSON document describing a workflow: `nodes` keyed by id,
//! `connections` keyed by connection id, plus `info`, `properties`,
//! `secrets`, and `project` blocks that collaborators outside the engine
//! consume opaquely. [`build_graph`] turns a parsed document into a
//! [`WorkflowGraph`].
//!
//! Both maps use ordered keys so graph construction is deterministic: nodes
//! and connections are added in id order. Code that needs a specific
//! fan-out dispatch order encodes it in connection ids (or calls
//! [`WorkflowGraph::add_edge`] directly in the desired order).

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::graph::{NodeMeta, NodeSpec, WorkflowGraph};
use crate::registry::NodeTypeRegistry;

/// Top-level workflow document.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub info: Value,
    #[serde(default)]
    pub properties: Value,
    #[serde(default)]
    pub secrets: Value,
    #[serde(default)]
    pub project: Value,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeDefinition>,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionDefinition>,
}

/// One node entry of the document.
#[derive(Clone, Debug, Deserialize)]
pub struct NodeDefinition {
    pub name: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(rename = "type")]
    pub type_name: String,
    /// Property entries; only their `value` fields are overlaid onto the
    /// registered schema.
    #[serde(default)]
    pub properties: FxHashMap<String, PropertyOverride>,
    #[serde(default)]
    pub meta: NodeMeta,
}

/// The slice of a document property entry the graph consumes.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PropertyOverride {
    #[serde(default)]
    pub value: Value,
}

/// One connection entry of the document.
#[derive(Clone, Debug, Deserialize)]
pub struct ConnectionDefinition {
    #[serde(default)]
    pub id: String,
    pub id_node_origin: String,
    pub output: String,
    pub id_node_destiny: String,
    pub input: String,
}

/// Errors from reading a workflow document.
#[derive(Debug, Error, Diagnostic)]
pub enum DefinitionError {
    #[error("malformed workflow definition: {0}")]
    #[diagnostic(code(weftrun::definition::malformed))]
    Malformed(#[from] serde_json::Error),
}

/// Parse a workflow document from JSON text.
pub fn parse(text: &str) -> Result<WorkflowDefinition, DefinitionError> {
    Ok(serde_json::from_str(text)?)
}

/// Construct the graph a document describes.
///
/// Pure bookkeeping, like the operations it calls: unknown node types and
/// dangling connection endpoints are recorded as-is and surface at
/// execution time.
#[must_use]
pub fn build_graph(definition: &WorkflowDefinition, registry: Arc<NodeTypeRegistry>) -> WorkflowGraph {
    let mut graph = WorkflowGraph::new(registry);

    for (id, node) in &definition.nodes {
        let mut spec = NodeSpec::new(node.name.as_str(), node.type_name.as_str())
            .with_id(id.as_str())
            .with_position(node.x, node.y)
            .with_meta(node.meta.clone());
        for (key, property) in &node.properties {
            spec = spec.with_value(key.as_str(), property.value.clone());
        }
        graph.add_node(spec);
    }

    for (id, connection) in &definition.connections {
        let connection_id = if connection.id.is_empty() {
            id.clone()
        } else {
            connection.id.clone()
        };
        graph.add_edge(
            Some(connection_id),
            connection.id_node_origin.as_str(),
            connection.output.as_str(),
            connection.id_node_destiny.as_str(),
            connection.input.as_str(),
        );
    }

    graph
}
