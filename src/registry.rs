//! Node-type registry: resolves type names to handler descriptors.
//!
//! The registry is an external collaborator from the engine's point of view:
//! the surrounding system decides which types exist (and how their handler
//! code is located on disk); the engine only asks it to resolve a type name
//! into a [`NodeTypeDescriptor`] when a graph is built.
//!
//! Every graph's type references should be validated against the registry at
//! admission time — a node whose type is missing here is registered anyway
//! (see [`WorkflowGraph::add_node`](crate::graph::WorkflowGraph::add_node))
//! and becomes a fatal fault if execution ever reaches it.

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

use crate::node::NodeHandler;
use crate::properties::Properties;

/// Reserved type name marking a graph's entry node.
///
/// Registering a node of this type marks it as the graph's entry point,
/// silently overwriting any previous marker.
pub const ENTRY_NODE_TYPE: &str = "flow_init";

/// Static facts about a node type.
#[derive(Clone, Debug, Default)]
pub struct TypeInfo {
    /// Trigger types start a new correlation flow on every emission and
    /// report zero elapsed time for their own output.
    pub is_trigger: bool,
    /// Singleton types get one live instance per invocation, shared across
    /// all visits including sibling branches.
    pub is_singleton: bool,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl TypeInfo {
    #[must_use]
    pub fn trigger(mut self) -> Self {
        self.is_trigger = true;
        self
    }

    #[must_use]
    pub fn singleton(mut self) -> Self {
        self.is_singleton = true;
        self
    }

    #[must_use]
    pub fn with_ports(mut self, inputs: &[&str], outputs: &[&str]) -> Self {
        self.inputs = inputs.iter().map(|s| s.to_string()).collect();
        self.outputs = outputs.iter().map(|s| s.to_string()).collect();
        self
    }
}

type HandlerFactory = Arc<dyn Fn() -> Box<dyn NodeHandler> + Send + Sync>;

/// Everything known about a registered node type.
pub struct NodeTypeDescriptor {
    pub type_name: String,
    pub info: TypeInfo,
    /// Declared property schema; cloned into every node of this type.
    pub properties: Properties,
    factory: HandlerFactory,
}

impl NodeTypeDescriptor {
    pub fn new(
        type_name: impl Into<String>,
        info: TypeInfo,
        properties: Properties,
        factory: impl Fn() -> Box<dyn NodeHandler> + Send + Sync + 'static,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            info,
            properties,
            factory: Arc::new(factory),
        }
    }

    /// Create a fresh handler instance for this type.
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn NodeHandler> {
        (self.factory)()
    }
}

impl fmt::Debug for NodeTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTypeDescriptor")
            .field("type_name", &self.type_name)
            .field("info", &self.info)
            .field("properties", &self.properties.len())
            .finish_non_exhaustive()
    }
}

/// Type name to descriptor mapping.
#[derive(Debug, Default)]
pub struct NodeTypeRegistry {
    types: FxHashMap<String, Arc<NodeTypeDescriptor>>,
}

impl NodeTypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor under its type name; re-registering replaces.
    pub fn register(&mut self, descriptor: NodeTypeDescriptor) {
        self.types
            .insert(descriptor.type_name.clone(), Arc::new(descriptor));
    }

    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<&Arc<NodeTypeDescriptor>> {
        self.types.get(type_name)
    }

    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}
