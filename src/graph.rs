//! Workflow graph model: nodes, ordered port connections, and derived
//! adjacency.
//!
//! The graph is pure in-memory bookkeeping. [`WorkflowGraph::add_node`] and
//! [`WorkflowGraph::add_edge`] record structure without validating it —
//! neither checks that referenced ids exist, and an unregistered node type
//! is logged but still registered (with no handler descriptor). Both hazards
//! surface only when the [engine](crate::engine) traverses the graph, where
//! they are fatal; validate type references at admission time instead of
//! discovering them mid-run.
//!
//! # Examples
//!
//! ```
//! use weftrun::graph::{NodeSpec, WorkflowGraph};
//! use weftrun::registry::NodeTypeRegistry;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(NodeTypeRegistry::new());
//! let mut graph = WorkflowGraph::new(registry);
//!
//! let a = graph
//!     .add_node(NodeSpec::new("A", "relay").with_id("a"))
//!     .id
//!     .clone();
//! graph.add_node(NodeSpec::new("B", "relay").with_id("b"));
//! graph.add_edge(None, a.as_str(), "main", "b", "main");
//!
//! let targets = graph.connections_from(&a, "main").unwrap();
//! assert_eq!(targets[0].node_id, "b");
//! assert!(graph.outputs_of(&a).unwrap().contains("b"));
//! ```

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::properties::{Properties, PropertyKind};
use crate::registry::{ENTRY_NODE_TYPE, NodeTypeDescriptor, NodeTypeRegistry};
use crate::utils::id_generator::IdGenerator;

/// Layout position; irrelevant to execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Severity of a node-level log directive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    None,
    Info,
    Warn,
    Error,
    Debug,
}

/// A message template logged at a fixed point of a node's lifecycle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogDirective {
    #[serde(rename = "type", default)]
    pub level: LogLevel,
    /// Message template, resolved through the property resolver.
    #[serde(default)]
    pub value: String,
}

/// Log directives a node may carry in its metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogDirectives {
    /// Logged when a visit starts, before the handler runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<LogDirective>,
    /// Logged once per emission, with the emitted payload as `input`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<LogDirective>,
}

/// Free-form node metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<LogDirectives>,
    /// Credential field names resolved for this node by the secret store.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<String>,
    #[serde(flatten)]
    pub extra: FxHashMap<String, Value>,
}

/// A typed, positioned unit of the graph.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: String,
    /// Display key; template expressions address prior outputs by this name.
    pub name: String,
    pub type_name: String,
    pub position: Position,
    pub properties: Properties,
    pub meta: NodeMeta,
    descriptor: Option<Arc<NodeTypeDescriptor>>,
}

impl Node {
    /// Handler descriptor, absent when the type was not registered.
    #[must_use]
    pub fn descriptor(&self) -> Option<&Arc<NodeTypeDescriptor>> {
        self.descriptor.as_ref()
    }
}

/// Destination half of a connection, stored under `(origin, output_port)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// Connection id as declared in the workflow definition.
    pub id: Option<String>,
    pub node_id: String,
    pub input_port: String,
}

/// Parameters for [`WorkflowGraph::add_node`].
#[derive(Clone, Debug, Default)]
pub struct NodeSpec {
    pub id: Option<String>,
    pub name: String,
    pub type_name: String,
    pub position: Position,
    /// Initial property values overlaid per key onto the type's schema.
    pub values: FxHashMap<String, Value>,
    pub meta: NodeMeta,
}

impl NodeSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    #[must_use]
    pub fn with_value(mut self, property: impl Into<String>, value: Value) -> Self {
        self.values.insert(property.into(), value);
        self
    }

    #[must_use]
    pub fn with_meta(mut self, meta: NodeMeta) -> Self {
        self.meta = meta;
        self
    }
}

/// One required secret, indexed so the surrounding system can resolve it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretDependency {
    pub node_id: String,
    pub type_name: String,
    pub name: String,
}

/// One required credential and the fields it resolves to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialDependency {
    pub node_id: String,
    pub type_name: String,
    pub name: String,
    pub fields: Vec<String>,
}

/// Secrets and credentials the graph's nodes declare, deduplicated by
/// (node, type, name).
#[derive(Clone, Debug, Default)]
pub struct DependencyIndex {
    secrets: Vec<SecretDependency>,
    credentials: Vec<CredentialDependency>,
}

impl DependencyIndex {
    fn register_secret(&mut self, entry: SecretDependency) {
        let duplicate = self.secrets.iter().any(|s| {
            s.node_id == entry.node_id && s.type_name == entry.type_name && s.name == entry.name
        });
        if !duplicate {
            self.secrets.push(entry);
        }
    }

    fn register_credential(&mut self, entry: CredentialDependency) {
        let duplicate = self.credentials.iter().any(|c| {
            c.node_id == entry.node_id && c.type_name == entry.type_name && c.name == entry.name
        });
        if !duplicate {
            self.credentials.push(entry);
        }
    }

    #[must_use]
    pub fn secrets(&self) -> &[SecretDependency] {
        &self.secrets
    }

    #[must_use]
    pub fn credentials(&self) -> &[CredentialDependency] {
        &self.credentials
    }
}

/// Owns nodes, connections, and derived adjacency for one workflow.
#[derive(Debug)]
pub struct WorkflowGraph {
    registry: Arc<NodeTypeRegistry>,
    nodes: FxHashMap<String, Node>,
    nodes_by_type: FxHashMap<String, FxHashSet<String>>,
    /// Forward dispatch map: origin id -> output port -> ordered targets.
    connections: FxHashMap<String, FxHashMap<String, Vec<ConnectionTarget>>>,
    inputs_of: FxHashMap<String, FxHashSet<String>>,
    outputs_of: FxHashMap<String, FxHashSet<String>>,
    dependencies: DependencyIndex,
    entry: Option<String>,
    ids: IdGenerator,
}

impl WorkflowGraph {
    #[must_use]
    pub fn new(registry: Arc<NodeTypeRegistry>) -> Self {
        Self {
            registry,
            nodes: FxHashMap::default(),
            nodes_by_type: FxHashMap::default(),
            connections: FxHashMap::default(),
            inputs_of: FxHashMap::default(),
            outputs_of: FxHashMap::default(),
            dependencies: DependencyIndex::default(),
            entry: None,
            ids: IdGenerator::new(),
        }
    }

    /// Register a node.
    ///
    /// The type's declared schema is cloned and the spec's values are
    /// overlaid per key. Non-empty `secret`/`credential` values feed the
    /// dependency index. A node of the reserved entry type becomes the entry
    /// point, silently overwriting any previous marker.
    ///
    /// An unknown type logs a configuration fault but registers the node
    /// anyway, with no descriptor; reaching such a node at execution time is
    /// fatal to the invocation.
    pub fn add_node(&mut self, spec: NodeSpec) -> &Node {
        let NodeSpec {
            id,
            name,
            type_name,
            position,
            values,
            meta,
        } = spec;

        let descriptor = self.registry.get(&type_name).cloned();
        if descriptor.is_none() {
            tracing::error!(
                target: "weftrun::graph",
                node = %name,
                r#type = %type_name,
                "node type is not registered"
            );
        }
        let id = id.unwrap_or_else(|| self.ids.generate_node_id());

        let mut properties = descriptor
            .as_ref()
            .map(|d| d.properties.clone())
            .unwrap_or_default();
        for (key, value) in values {
            if value.is_null() {
                continue;
            }
            if let Some(property) = properties.get_mut(&key) {
                property.value = value;
            }
        }

        for property in properties.values() {
            let name_value = match &property.value {
                Value::String(s) => s.trim().to_string(),
                _ => continue,
            };
            if name_value.is_empty() {
                continue;
            }
            match property.kind {
                PropertyKind::Secret => self.dependencies.register_secret(SecretDependency {
                    node_id: id.clone(),
                    type_name: type_name.clone(),
                    name: name_value,
                }),
                PropertyKind::Credential => {
                    self.dependencies.register_credential(CredentialDependency {
                        node_id: id.clone(),
                        type_name: type_name.clone(),
                        name: name_value,
                        fields: meta.credentials.clone(),
                    });
                }
                _ => {}
            }
        }

        self.nodes_by_type
            .entry(type_name.clone())
            .or_default()
            .insert(id.clone());
        if type_name == ENTRY_NODE_TYPE {
            self.entry = Some(id.clone());
        }

        let node = Node {
            id: id.clone(),
            name,
            type_name,
            position,
            properties,
            meta,
            descriptor,
        };
        self.nodes.insert(id.clone(), node);
        self.nodes.get(&id).expect("node inserted above")
    }

    /// Append a connection from `(origin, output)` to `(destiny, input)` and
    /// update both reverse-adjacency sets.
    ///
    /// Multiple targets on one output port are kept in call order; that
    /// order is the dispatch order at fan-out. Destination ids are not
    /// validated here.
    pub fn add_edge(
        &mut self,
        id: Option<String>,
        origin: impl Into<String>,
        output: impl Into<String>,
        destiny: impl Into<String>,
        input: impl Into<String>,
    ) {
        let origin = origin.into();
        let destiny = destiny.into();
        self.connections
            .entry(origin.clone())
            .or_default()
            .entry(output.into())
            .or_default()
            .push(ConnectionTarget {
                id,
                node_id: destiny.clone(),
                input_port: input.into(),
            });

        self.inputs_of
            .entry(destiny.clone())
            .or_default()
            .insert(origin.clone());
        self.outputs_of.entry(origin).or_default().insert(destiny);
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// The entry node, if one was registered.
    #[must_use]
    pub fn entry_node(&self) -> Option<&Node> {
        self.entry.as_deref().and_then(|id| self.nodes.get(id))
    }

    /// Ordered targets connected to `(origin, output)`.
    #[must_use]
    pub fn connections_from(&self, origin: &str, output: &str) -> Option<&[ConnectionTarget]> {
        self.connections
            .get(origin)
            .and_then(|ports| ports.get(output))
            .map(Vec::as_slice)
    }

    /// Nodes with a connection into `id`.
    #[must_use]
    pub fn inputs_of(&self, id: &str) -> Option<&FxHashSet<String>> {
        self.inputs_of.get(id)
    }

    /// Nodes `id` connects out to.
    #[must_use]
    pub fn outputs_of(&self, id: &str) -> Option<&FxHashSet<String>> {
        self.outputs_of.get(id)
    }

    /// Ids of all nodes of a given type.
    #[must_use]
    pub fn nodes_of_type(&self, type_name: &str) -> Option<&FxHashSet<String>> {
        self.nodes_by_type.get(type_name)
    }

    #[must_use]
    pub fn dependencies(&self) -> &DependencyIndex {
        &self.dependencies
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<NodeTypeRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ExecutionContext, HandlerFault, NodeHandler};
    use crate::properties::Property;
    use crate::registry::TypeInfo;
    use async_trait::async_trait;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl NodeHandler for Noop {
        async fn on_execute(&mut self, _ctx: ExecutionContext<'_>) -> Result<(), HandlerFault> {
            Ok(())
        }
    }

    fn registry() -> Arc<NodeTypeRegistry> {
        let mut registry = NodeTypeRegistry::new();
        let mut props = Properties::default();
        props.insert("url".into(), Property::text(""));
        props.insert(
            "token".into(),
            Property::new(PropertyKind::Secret, Value::String(String::new())),
        );
        registry.register(NodeTypeDescriptor::new(
            "relay",
            TypeInfo::default().with_ports(&["main"], &["main"]),
            props,
            || Box::new(Noop),
        ));
        registry.register(NodeTypeDescriptor::new(
            ENTRY_NODE_TYPE,
            TypeInfo::default().trigger(),
            Properties::default(),
            || Box::new(Noop),
        ));
        Arc::new(registry)
    }

    #[test]
    fn schema_is_cloned_with_value_overlay() {
        let mut graph = WorkflowGraph::new(registry());
        let node = graph.add_node(
            NodeSpec::new("A", "relay")
                .with_id("a")
                .with_value("url", json!("http://localhost")),
        );
        assert_eq!(node.properties.get("url").unwrap().value, json!("http://localhost"));
        // The registry's schema is untouched.
        let schema = graph.registry().get("relay").unwrap().properties.clone();
        assert_eq!(schema.get("url").unwrap().value, json!(""));
    }

    #[test]
    fn unregistered_type_is_kept_without_descriptor() {
        let mut graph = WorkflowGraph::new(registry());
        let node = graph.add_node(NodeSpec::new("ghost", "no_such_type").with_id("g"));
        assert!(node.descriptor().is_none());
        assert!(graph.node("g").is_some());
    }

    #[test]
    fn generated_ids_are_assigned() {
        let mut graph = WorkflowGraph::new(registry());
        let id = graph.add_node(NodeSpec::new("A", "relay")).id.clone();
        assert!(!id.is_empty());
        assert!(graph.node(&id).is_some());
    }

    #[test]
    fn adjacency_stays_consistent() {
        let mut graph = WorkflowGraph::new(registry());
        graph.add_node(NodeSpec::new("A", "relay").with_id("a"));
        graph.add_node(NodeSpec::new("B", "relay").with_id("b"));
        graph.add_node(NodeSpec::new("C", "relay").with_id("c"));
        graph.add_edge(None, "a", "main", "b", "main");
        graph.add_edge(None, "a", "main", "c", "main");

        let targets = graph.connections_from("a", "main").unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].node_id, "b");
        assert_eq!(targets[1].node_id, "c");

        assert!(graph.outputs_of("a").unwrap().contains("b"));
        assert!(graph.outputs_of("a").unwrap().contains("c"));
        assert!(graph.inputs_of("b").unwrap().contains("a"));
        assert!(graph.inputs_of("c").unwrap().contains("a"));
        assert!(graph.inputs_of("a").is_none());
    }

    #[test]
    fn edges_to_unknown_nodes_are_accepted() {
        let mut graph = WorkflowGraph::new(registry());
        graph.add_node(NodeSpec::new("A", "relay").with_id("a"));
        graph.add_edge(None, "a", "main", "missing", "main");
        assert_eq!(graph.connections_from("a", "main").unwrap().len(), 1);
    }

    #[test]
    fn latest_entry_marker_wins() {
        let mut graph = WorkflowGraph::new(registry());
        graph.add_node(NodeSpec::new("first", ENTRY_NODE_TYPE).with_id("e1"));
        graph.add_node(NodeSpec::new("second", ENTRY_NODE_TYPE).with_id("e2"));
        assert_eq!(graph.entry_node().unwrap().id, "e2");
    }

    #[test]
    fn secret_dependencies_deduplicate() {
        let mut graph = WorkflowGraph::new(registry());
        graph.add_node(
            NodeSpec::new("A", "relay")
                .with_id("a")
                .with_value("token", json!("API_TOKEN")),
        );
        // Same node re-added under another id with the same secret name.
        graph.add_node(
            NodeSpec::new("B", "relay")
                .with_id("b")
                .with_value("token", json!("API_TOKEN")),
        );
        assert_eq!(graph.dependencies().secrets().len(), 2);
        assert_eq!(graph.dependencies().secrets()[0].name, "API_TOKEN");

        // Empty and whitespace-only secret values are ignored.
        graph.add_node(
            NodeSpec::new("C", "relay")
                .with_id("c")
                .with_value("token", json!("  ")),
        );
        assert_eq!(graph.dependencies().secrets().len(), 2);
    }
}
