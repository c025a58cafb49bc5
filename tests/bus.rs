mod common;

use common::*;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use weftrun::bus::{Envelope, EnvelopeBus, HubError, MemorySink, MessageHub, TelemetryTarget};
use weftrun::engine::{Engine, ExecutionRequest, WorkerContext};

#[tokio::test]
async fn request_collects_and_flattens_subscriber_results() {
    let (server, server_rx) = MessageHub::new();
    let (client, client_rx) = MessageHub::new();

    server.subscribe("nodes:list", |_data| async {
        Some(json!(["relay", "recorder"]))
    });
    server.subscribe("nodes:list", |_data| async { Some(json!("tally")) });

    MessageHub::link(client.clone(), client_rx, server.clone(), server_rx);

    let result = client.request("nodes:list", json!({})).await.unwrap();
    assert_eq!(result, json!(["relay", "recorder", "tally"]));
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn request_without_subscribers_returns_null() {
    let (server, server_rx) = MessageHub::new();
    let (client, client_rx) = MessageHub::new();
    MessageHub::link(client.clone(), client_rx, server.clone(), server_rx);

    let result = client.request("missing:kind", json!(1)).await.unwrap();
    assert_eq!(result, Value::Null);
}

#[tokio::test]
async fn unanswered_request_times_out_and_drops_pending() {
    let (client, _rx) = MessageHub::with_timeout(Duration::from_millis(50));

    let error = client.request("never:answered", json!({})).await.unwrap_err();
    assert!(matches!(error, HubError::Timeout { .. }));
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn notify_fans_out_without_reply() {
    let (server, server_rx) = MessageHub::new();
    let (client, client_rx) = MessageHub::new();

    let seen = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..2 {
        let seen = seen.clone();
        server.subscribe("status", move |data| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(data);
                None
            }
        });
    }
    MessageHub::link(client.clone(), client_rx, server.clone(), server_rx);

    client.notify("status", json!("running")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn envelope_bus_broadcasts_to_sinks() {
    let sink = MemorySink::new();
    let bus = EnvelopeBus::with_sink(sink.clone());
    bus.listen();

    bus.sender()
        .send(Envelope::new(TelemetryTarget::Memory, json!(3.5)))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let captured = sink.snapshot();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].target, TelemetryTarget::Memory);
    bus.stop().await;
}

#[tokio::test]
async fn engine_flush_posts_tagged_telemetry() {
    let sink = MemorySink::new();
    let bus = EnvelopeBus::with_sink(sink.clone());
    bus.listen();

    let mut engine =
        Engine::new(fan_out_graph(), WorkerContext::default()).with_telemetry(bus.sender());
    engine.watch_node("a");
    engine.set_debug(true);
    engine
        .start_execution(ExecutionRequest::entry(json!({"x": 1})))
        .await
        .unwrap();
    engine.flush_telemetry();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let targets: Vec<TelemetryTarget> = sink.snapshot().iter().map(|e| e.target).collect();
    assert!(targets.contains(&TelemetryTarget::Trace));
    assert!(targets.contains(&TelemetryTarget::NodeSample));
    assert!(targets.contains(&TelemetryTarget::NodeStats));
    // Debug step records were posted while the invocation ran.
    assert!(targets.contains(&TelemetryTarget::Debug));

    // A second flush with no intervening activity posts no new trace diff.
    sink.clear();
    engine.flush_telemetry();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let targets: Vec<TelemetryTarget> = sink.snapshot().iter().map(|e| e.target).collect();
    assert!(!targets.contains(&TelemetryTarget::Trace));
    bus.stop().await;
}
