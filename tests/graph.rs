mod common;

use common::*;
use serde_json::json;
use weftrun::graph::{NodeSpec, WorkflowGraph};
use weftrun::registry::ENTRY_NODE_TYPE;

#[test]
fn forward_and_reverse_maps_agree() {
    let graph = fan_out_graph();

    let targets = graph.connections_from("a", "main").unwrap();
    assert_eq!(targets.len(), 2);
    assert_eq!(targets[0].node_id, "b");
    assert_eq!(targets[1].node_id, "c");

    for target in targets {
        assert!(graph.inputs_of(&target.node_id).unwrap().contains("a"));
        assert!(graph.outputs_of("a").unwrap().contains(&target.node_id));
    }
    assert!(graph.connections_from("b", "main").is_none());
}

#[test]
fn nodes_are_indexed_by_type() {
    let graph = fan_out_graph();
    let recorders = graph.nodes_of_type("recorder").unwrap();
    assert_eq!(recorders.len(), 2);
    assert!(recorders.contains("b"));
    assert!(recorders.contains("c"));
    assert!(graph.nodes_of_type("tally").is_none());
}

#[test]
fn descriptor_resolution_happens_at_add_time() {
    let mut graph = WorkflowGraph::new(test_registry());
    let known = graph.add_node(NodeSpec::new("A", "relay").with_id("a"));
    assert!(known.descriptor().is_some());

    let unknown = graph.add_node(NodeSpec::new("X", "vanished").with_id("x"));
    assert!(unknown.descriptor().is_none());
}

#[test]
fn entry_overwrite_keeps_the_latest() {
    let mut graph = WorkflowGraph::new(test_registry());
    graph.add_node(NodeSpec::new("first", ENTRY_NODE_TYPE).with_id("e1"));
    graph.add_node(NodeSpec::new("relay", "relay").with_id("r"));
    graph.add_node(NodeSpec::new("second", ENTRY_NODE_TYPE).with_id("e2"));
    assert_eq!(graph.entry_node().unwrap().name, "second");
}

#[test]
fn value_overlay_does_not_invent_properties() {
    let mut graph = WorkflowGraph::new(test_registry());
    let node = graph.add_node(
        NodeSpec::new("E", "emit_value")
            .with_id("e")
            .with_value("value", json!("hello"))
            .with_value("undeclared", json!("dropped")),
    );
    assert_eq!(node.properties.get("value").unwrap().value, json!("hello"));
    assert!(!node.properties.contains_key("undeclared"));
}
