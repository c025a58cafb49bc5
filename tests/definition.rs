mod common;

use common::*;
use serde_json::json;
use weftrun::definition::{build_graph, parse};
use weftrun::engine::{Engine, ExecutionRequest, WorkerContext};
use weftrun::graph::LogLevel;

const DOCUMENT: &str = r#"{
    "info": {"name": "orders"},
    "properties": {"basic": {"router": "/orders"}},
    "secrets": {},
    "project": {},
    "nodes": {
        "init": {"name": "Init", "x": 10, "y": 20, "type": "flow_init"},
        "mapper": {
            "name": "Mapper",
            "x": 120,
            "y": 20,
            "type": "emit_value",
            "properties": {"value": {"type": "string", "value": "{{ input.data.total }}"}},
            "meta": {"logs": {"exec": {"type": "info", "value": "mapped {{ input.data }}"}}}
        },
        "sink": {"name": "Sink", "x": 240, "y": 20, "type": "recorder"}
    },
    "connections": {
        "c1": {"id": "c1", "id_node_origin": "init", "output": "main", "id_node_destiny": "mapper", "input": "main"},
        "c2": {"id": "c2", "id_node_origin": "mapper", "output": "main", "id_node_destiny": "sink", "input": "main"}
    }
}"#;

#[test]
fn parses_the_document_shape() {
    let definition = parse(DOCUMENT).unwrap();
    assert_eq!(definition.nodes.len(), 3);
    assert_eq!(definition.connections.len(), 2);
    assert_eq!(definition.info["name"], json!("orders"));

    let mapper = definition.nodes.get("mapper").unwrap();
    assert_eq!(mapper.type_name, "emit_value");
    assert_eq!(
        mapper.properties.get("value").unwrap().value,
        json!("{{ input.data.total }}")
    );
    let exec = mapper.meta.logs.as_ref().unwrap().exec.as_ref().unwrap();
    assert_eq!(exec.level, LogLevel::Info);
}

#[test]
fn builds_the_described_graph() {
    let definition = parse(DOCUMENT).unwrap();
    let graph = build_graph(&definition, test_registry());

    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.entry_node().unwrap().id, "init");
    assert_eq!(graph.node("mapper").unwrap().position.x, 120.0);

    let targets = graph.connections_from("init", "main").unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].node_id, "mapper");
    assert_eq!(targets[0].id.as_deref(), Some("c1"));
    assert!(graph.inputs_of("sink").unwrap().contains("mapper"));
}

#[test]
fn rejects_malformed_documents() {
    assert!(parse("{\"nodes\": 5}").is_err());
    assert!(parse("not json at all").is_err());
}

#[tokio::test]
async fn a_loaded_workflow_executes_end_to_end() {
    let definition = parse(DOCUMENT).unwrap();
    let graph = build_graph(&definition, test_registry());

    let mut engine = Engine::new(graph, WorkerContext::default());
    engine
        .start_execution(ExecutionRequest::entry(json!({"total": 99})))
        .await
        .unwrap();

    let sink = recorded(engine.global_store(), "Sink").unwrap();
    assert_eq!(sink["input"], json!(99));
}
