//! Registry and graph fixtures shared by the integration suites.

use std::sync::Arc;

use serde_json::json;
use weftrun::graph::{NodeSpec, WorkflowGraph};
use weftrun::properties::{Properties, Property};
use weftrun::registry::{ENTRY_NODE_TYPE, NodeTypeDescriptor, NodeTypeRegistry, TypeInfo};

use super::nodes::*;

/// Registry with every handler type the suites use.
pub fn test_registry() -> Arc<NodeTypeRegistry> {
    let mut registry = NodeTypeRegistry::new();

    registry.register(NodeTypeDescriptor::new(
        ENTRY_NODE_TYPE,
        TypeInfo::default().trigger().with_ports(&[], &["main"]),
        Properties::default(),
        || Box::new(InitNode),
    ));
    registry.register(NodeTypeDescriptor::new(
        "relay",
        TypeInfo::default().with_ports(&["main"], &["main"]),
        Properties::default(),
        || Box::new(RelayNode),
    ));
    registry.register(NodeTypeDescriptor::new(
        "emit_value",
        TypeInfo::default().with_ports(&["main"], &["main"]),
        {
            let mut props = Properties::default();
            props.insert("value".into(), Property::text(""));
            props
        },
        || Box::new(EmitValueNode),
    ));
    registry.register(NodeTypeDescriptor::new(
        "recorder",
        TypeInfo::default().with_ports(&["main"], &[]),
        Properties::default(),
        || Box::new(RecorderNode),
    ));
    registry.register(NodeTypeDescriptor::new(
        "tally",
        TypeInfo::default()
            .singleton()
            .with_ports(&["main"], &["main"]),
        Properties::default(),
        || Box::new(TallyNode::default()),
    ));
    registry.register(NodeTypeDescriptor::new(
        "fresh_tally",
        TypeInfo::default().with_ports(&["main"], &["main"]),
        Properties::default(),
        || Box::new(TallyNode::default()),
    ));
    registry.register(NodeTypeDescriptor::new(
        "failing",
        TypeInfo::default().with_ports(&["main"], &[]),
        Properties::default(),
        || Box::new(FailingNode),
    ));

    Arc::new(registry)
}

/// `Init -> A -> {B, C}`: A's single output port wired to both recorders.
pub fn fan_out_graph() -> WorkflowGraph {
    let mut graph = WorkflowGraph::new(test_registry());
    graph.add_node(NodeSpec::new("Init", ENTRY_NODE_TYPE).with_id("init"));
    graph.add_node(NodeSpec::new("A", "relay").with_id("a"));
    graph.add_node(NodeSpec::new("B", "recorder").with_id("b"));
    graph.add_node(NodeSpec::new("C", "recorder").with_id("c"));
    graph.add_edge(None, "init", "main", "a", "main");
    graph.add_edge(None, "a", "main", "b", "main");
    graph.add_edge(None, "a", "main", "c", "main");
    graph
}

/// `Init -> {B, C} -> D`: two branches converging on one tally node.
pub fn converging_graph(tally_type: &str) -> WorkflowGraph {
    let mut graph = WorkflowGraph::new(test_registry());
    graph.add_node(NodeSpec::new("Init", ENTRY_NODE_TYPE).with_id("init"));
    graph.add_node(NodeSpec::new("B", "relay").with_id("b"));
    graph.add_node(NodeSpec::new("C", "relay").with_id("c"));
    graph.add_node(NodeSpec::new("D", tally_type).with_id("d"));
    graph.add_edge(None, "init", "main", "b", "main");
    graph.add_edge(None, "init", "main", "c", "main");
    graph.add_edge(None, "b", "main", "d", "main");
    graph.add_edge(None, "c", "main", "d", "main");
    graph
}

/// Entry node emitting into one templated `emit_value` node and a recorder.
pub fn template_graph(template: &str) -> WorkflowGraph {
    let mut graph = WorkflowGraph::new(test_registry());
    graph.add_node(NodeSpec::new("Init", ENTRY_NODE_TYPE).with_id("init"));
    graph.add_node(
        NodeSpec::new("Emitter", "emit_value")
            .with_id("emitter")
            .with_value("value", json!(template)),
    );
    graph.add_node(NodeSpec::new("Sink", "recorder").with_id("sink"));
    graph.add_edge(None, "init", "main", "emitter", "main");
    graph.add_edge(None, "emitter", "main", "sink", "main");
    graph
}
