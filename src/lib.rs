//! # Weftrun: Branch-Propagating Workflow Worker
//!
//! Weftrun loads a declarative graph of typed, stateful nodes and drives
//! execution by propagating data along declared connections: an external
//! trigger enters at the graph's entry node and fans out along branches
//! until each branch terminates.
//!
//! ## Core Concepts
//!
//! - **Nodes**: typed units with a property schema, wired by named ports
//! - **Handlers**: runtime instances implementing a node type's behavior,
//!   with an explicit singleton lifecycle per invocation
//! - **Property resolution**: `{{ expression }}` spans rewritten before
//!   every invocation by a restricted-grammar interpreter
//! - **Branches**: private execution-data forks at every fan-out point
//! - **Tracer**: pull-based dirty-diff counters and opt-in sampling
//!
//! ## Quick Start
//!
//! ```
//! use async_trait::async_trait;
//! use serde_json::json;
//! use weftrun::engine::{Engine, ExecutionRequest, WorkerContext};
//! use weftrun::graph::{NodeSpec, WorkflowGraph};
//! use weftrun::node::{ExecutionContext, HandlerFault, NodeHandler};
//! use weftrun::properties::Properties;
//! use weftrun::registry::{ENTRY_NODE_TYPE, NodeTypeDescriptor, NodeTypeRegistry, TypeInfo};
//! use std::sync::Arc;
//!
//! struct Relay;
//!
//! #[async_trait]
//! impl NodeHandler for Relay {
//!     async fn on_execute(&mut self, mut ctx: ExecutionContext<'_>) -> Result<(), HandlerFault> {
//!         let payload = ctx.input.payload.clone();
//!         ctx.emit("main", payload);
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), weftrun::engine::EngineError> {
//! let mut registry = NodeTypeRegistry::new();
//! registry.register(NodeTypeDescriptor::new(
//!     ENTRY_NODE_TYPE,
//!     TypeInfo::default().trigger(),
//!     Properties::default(),
//!     || Box::new(Relay),
//! ));
//! registry.register(NodeTypeDescriptor::new(
//!     "relay",
//!     TypeInfo::default(),
//!     Properties::default(),
//!     || Box::new(Relay),
//! ));
//!
//! let mut graph = WorkflowGraph::new(Arc::new(registry));
//! graph.add_node(NodeSpec::new("Init", ENTRY_NODE_TYPE).with_id("init"));
//! graph.add_node(NodeSpec::new("A", "relay").with_id("a"));
//! graph.add_edge(None, "init", "main", "a", "main");
//!
//! let mut engine = Engine::new(graph, WorkerContext::default());
//! engine.start_execution(ExecutionRequest::entry(json!({"x": 1}))).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`graph`] - Nodes, connections, adjacency, dependency index
//! - [`node`] - Handler trait, execution context, output emitter
//! - [`registry`] - Node-type descriptors and handler factories
//! - [`resolver`] - Template expansion and the expression interpreter
//! - [`engine`] - The branch-propagation scheduler
//! - [`trace`] - Pull-based execution tracing
//! - [`store`] - Run-wide and local key-value scratch space
//! - [`bus`] - Telemetry envelopes and the request/reply message hub
//! - [`definition`] - Workflow document parsing and graph construction
//! - [`telemetry`] - Formatters, debug probe, tracing setup
//! - [`variables`] - Workflow variables and credential fields

pub mod bus;
pub mod definition;
pub mod engine;
pub mod graph;
pub mod node;
pub mod properties;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod telemetry;
pub mod trace;
pub mod utils;
pub mod variables;
