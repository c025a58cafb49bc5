mod common;

use common::*;
use proptest::prelude::*;
use serde_json::{Map, json};
use weftrun::engine::{Engine, ExecutionRequest, WorkerContext};
use weftrun::graph::{NodeSpec, WorkflowGraph};
use weftrun::properties::{Properties, Property};
use weftrun::registry::ENTRY_NODE_TYPE;
use weftrun::resolver::PropertyResolver;

fn scope_resolver() -> PropertyResolver {
    let mut scope = Map::new();
    scope.insert("env".into(), json!({"region": "eu"}));
    scope.insert("input".into(), json!({"data": {"x": 1}}));
    PropertyResolver::from_scope(scope)
}

#[test]
fn resolving_twice_is_idempotent_for_marker_free_schemas() {
    let resolver = scope_resolver();
    let mut properties = Properties::default();
    properties.insert("value".into(), Property::text("42"));
    properties.insert("label".into(), Property::text("plain text"));

    let once = resolver.resolve_properties("node", &properties);
    let twice = resolver.resolve_properties("node", &once);
    assert_eq!(once, twice);
    // Literal-JSON coercion applied on the first pass only.
    assert_eq!(once.get("value").unwrap().value, json!(42));
    assert_eq!(once.get("label").unwrap().value, json!("plain text"));
}

proptest! {
    #[test]
    fn marker_free_strings_resolve_idempotently(text in "[a-zA-Z0-9 .,:_'\\-]{0,40}") {
        let resolver = scope_resolver();
        let first = resolver.resolve_string("node", &text);
        let second = resolver.resolve_string("node", &first);
        prop_assert_eq!(&first, &text);
        prop_assert_eq!(first, second);
    }
}

#[tokio::test]
async fn scope_binds_prior_branch_outputs_by_node_name() {
    // Init -> A -> Emitter("{{ A.data.x }}") -> Sink
    let mut graph = WorkflowGraph::new(test_registry());
    graph.add_node(NodeSpec::new("Init", ENTRY_NODE_TYPE).with_id("init"));
    graph.add_node(NodeSpec::new("A", "relay").with_id("a"));
    graph.add_node(
        NodeSpec::new("Emitter", "emit_value")
            .with_id("emitter")
            .with_value("value", json!("{{ A.data.x }}")),
    );
    graph.add_node(NodeSpec::new("Sink", "recorder").with_id("sink"));
    graph.add_edge(None, "init", "main", "a", "main");
    graph.add_edge(None, "a", "main", "emitter", "main");
    graph.add_edge(None, "emitter", "main", "sink", "main");

    let mut engine = Engine::new(graph, WorkerContext::default());
    engine
        .start_execution(ExecutionRequest::entry(json!({"x": 7})))
        .await
        .unwrap();

    let sink = recorded(engine.global_store(), "Sink").unwrap();
    assert_eq!(sink["input"], json!(7));
}

#[tokio::test]
async fn workflow_variables_reach_expressions_through_env() {
    let mut variables = weftrun::variables::VariableStore::new();
    variables.set_variable("stage", "prod");

    let mut engine = Engine::new(
        template_graph("deploy-{{ env.stage }}"),
        WorkerContext::default(),
    )
    .with_variables(variables);
    engine
        .start_execution(ExecutionRequest::entry(json!(null)))
        .await
        .unwrap();

    let sink = recorded(engine.global_store(), "Sink").unwrap();
    assert_eq!(sink["input"], json!("deploy-prod"));
}

#[tokio::test]
async fn failing_expression_degrades_only_that_property() {
    let mut engine = Engine::new(template_graph("{{ 1 / 0 }}"), WorkerContext::default());
    engine
        .start_execution(ExecutionRequest::entry(json!(null)))
        .await
        .unwrap();

    // The property was cleared to null and execution continued to the sink.
    let sink = recorded(engine.global_store(), "Sink").unwrap();
    assert_eq!(sink["input"], json!(null));
}
