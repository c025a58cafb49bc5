//! Handler implementations shared by the integration suites.

use async_trait::async_trait;
use serde_json::{Value, json};
use weftrun::node::{ExecutionContext, HandlerFault, NodeHandler};

/// Trigger handler: relays the inbound payload on `main`.
pub struct InitNode;

#[async_trait]
impl NodeHandler for InitNode {
    async fn on_execute(&mut self, mut ctx: ExecutionContext<'_>) -> Result<(), HandlerFault> {
        let payload = ctx.input.payload.clone();
        ctx.emit("main", payload);
        Ok(())
    }
}

/// Relays the inbound payload on `main`.
pub struct RelayNode;

#[async_trait]
impl NodeHandler for RelayNode {
    async fn on_execute(&mut self, mut ctx: ExecutionContext<'_>) -> Result<(), HandlerFault> {
        let payload = ctx.input.payload.clone();
        ctx.emit("main", payload);
        Ok(())
    }
}

/// Emits its resolved `value` property on `main`.
pub struct EmitValueNode;

#[async_trait]
impl NodeHandler for EmitValueNode {
    async fn on_execute(&mut self, mut ctx: ExecutionContext<'_>) -> Result<(), HandlerFault> {
        let value = ctx
            .property_value("value")
            .cloned()
            .ok_or(HandlerFault::MissingInput { what: "value" })?;
        ctx.emit("main", value);
        Ok(())
    }
}

/// Terminal handler: records what it observed into the run-wide store under
/// `record_<node name>`, emits nothing.
pub struct RecorderNode;

#[async_trait]
impl NodeHandler for RecorderNode {
    async fn on_execute(&mut self, mut ctx: ExecutionContext<'_>) -> Result<(), HandlerFault> {
        let observed = json!({
            "input": ctx.input.payload.clone(),
            "origin": ctx.input.origin_node_id.clone(),
            "port": ctx.input.input_port.clone(),
            "saw_relay": ctx.api.latest_by_type("relay").map(|found| found.payload.clone()),
            "active": ctx.api.branch_active(),
        });
        let name = ctx.current.name.clone();
        ctx.api.set_global("record", &name, observed);
        Ok(())
    }
}

/// Stateful counter: increments per visit, records the count under
/// `count_<node name>`, and relays the payload.
#[derive(Default)]
pub struct TallyNode {
    visits: u64,
}

#[async_trait]
impl NodeHandler for TallyNode {
    async fn on_execute(&mut self, mut ctx: ExecutionContext<'_>) -> Result<(), HandlerFault> {
        self.visits += 1;
        let name = ctx.current.name.clone();
        ctx.api.set_global("count", &name, json!(self.visits));
        let payload = ctx.input.payload.clone();
        ctx.emit("main", payload);
        Ok(())
    }
}

/// Always fails; exercises handler fault propagation.
pub struct FailingNode;

#[async_trait]
impl NodeHandler for FailingNode {
    async fn on_execute(&mut self, _ctx: ExecutionContext<'_>) -> Result<(), HandlerFault> {
        Err(HandlerFault::Other("boom".into()))
    }
}

/// Emits the inbound payload once per configured port.
pub struct MultiPortNode {
    pub ports: Vec<&'static str>,
}

#[async_trait]
impl NodeHandler for MultiPortNode {
    async fn on_execute(&mut self, mut ctx: ExecutionContext<'_>) -> Result<(), HandlerFault> {
        let payload = ctx.input.payload.clone();
        for port in &self.ports {
            ctx.emit(*port, payload.clone());
        }
        Ok(())
    }
}

/// Helper for reading a recorder's observation back out of the store.
pub fn recorded(store: &weftrun::store::KeyValueStore, name: &str) -> Option<Value> {
    store.scoped_get("record", name).cloned()
}
