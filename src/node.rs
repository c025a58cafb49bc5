//! Node handler framework.
//!
//! This module provides the abstractions node types implement and the
//! capability surface the engine hands them at invocation time: the
//! [`NodeHandler`] trait, the [`ExecutionContext`] with its lookup/store
//! capabilities, the [`OutputEmitter`] handlers use to declare outputs, and
//! the fatal [`HandlerFault`] error type.
//!
//! # Design
//!
//! Handlers are duck-typed in systems of this shape; here the surface is a
//! closed trait with one required method and two optional hooks:
//!
//! - `on_execute` — required; receives the resolved properties, the input
//!   payload, and the capability surface, and declares zero or more outputs
//!   through the emitter.
//! - `on_create` — optional; invoked by development tooling when a node is
//!   materialized, never by the engine's hot path.
//! - `on_action` — optional named-action dispatch for interactive frontends.
//!
//! A handler fault is NOT caught by the engine: it aborts the invocation and
//! propagates to the caller. Recoverable conditions belong inside the
//! handler (emit an error-shaped payload on a dedicated port instead).

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashSet;
use serde_json::{Value, json};
use std::time::Instant;
use thiserror::Error;

use crate::engine::BranchState;
use crate::graph::{Node, NodeMeta, WorkflowGraph};
use crate::properties::Properties;
use crate::store::KeyValueStore;
use crate::utils::time::elapsed_ms;

// ============================================================================
// Core Trait
// ============================================================================

/// Runtime behavior of a node type.
///
/// Instances are created from the type's registered factory. A descriptor
/// marked singleton gets one instance per top-level invocation, shared by
/// reference across every visit in that invocation's call tree (including
/// sibling branches); other descriptors get a fresh instance per visit.
///
/// # Examples
///
/// ```
/// use weftrun::node::{ExecutionContext, HandlerFault, NodeHandler};
/// use async_trait::async_trait;
/// use serde_json::json;
///
/// struct Stamp;
///
/// #[async_trait]
/// impl NodeHandler for Stamp {
///     async fn on_execute(&mut self, mut ctx: ExecutionContext<'_>) -> Result<(), HandlerFault> {
///         let payload = ctx.input.payload.clone();
///         ctx.emit("main", json!({"seen": payload}));
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait NodeHandler: Send {
    /// Creation hook for interactive tooling; not called by the engine.
    fn on_create(&mut self, _ctx: CreateContext<'_>) {}

    /// Execute one visit of this node.
    async fn on_execute(&mut self, ctx: ExecutionContext<'_>) -> Result<(), HandlerFault>;

    /// Named-action dispatch for interactive frontends.
    fn on_action(&self, _action: &str) -> Option<Value> {
        None
    }
}

/// Context handed to [`NodeHandler::on_create`].
pub struct CreateContext<'a> {
    pub node: &'a Node,
}

// ============================================================================
// Input & Output
// ============================================================================

/// Data arriving at a node: where it came from and the payload itself.
#[derive(Clone, Debug, Default)]
pub struct InputData {
    /// Node that produced the payload; `None` at the top of an invocation.
    pub origin_node_id: Option<String>,
    /// Input port the payload arrived on.
    pub input_port: Option<String>,
    pub payload: Value,
}

impl InputData {
    /// Input for a top-level trigger call.
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self {
            origin_node_id: None,
            input_port: None,
            payload,
        }
    }

    pub(crate) fn connected(origin: String, port: String, payload: Value) -> Self {
        Self {
            origin_node_id: Some(origin),
            input_port: Some(port),
            payload,
        }
    }

    /// Shape exposed to template expressions as `input`.
    #[must_use]
    pub fn scope_value(&self) -> Value {
        json!({
            "origin": self.origin_node_id,
            "port": self.input_port,
            "data": self.payload,
        })
    }
}

/// One output declared by a handler.
#[derive(Clone, Debug)]
pub struct Emission {
    pub port: String,
    pub payload: Value,
    pub meta: Option<Value>,
    /// Monotonic delta from invocation start, rounded to 3 decimals;
    /// zero when no start timestamp was taken (trigger nodes).
    pub elapsed_ms: f64,
}

/// Collects handler outputs together with their emission timings.
///
/// The elapsed time of each emission is computed when the handler declares
/// it, not when the engine later processes it, so asynchronous handlers
/// report the time their own work actually took.
#[derive(Debug)]
pub struct OutputEmitter {
    started: Option<Instant>,
    emissions: Vec<Emission>,
}

impl OutputEmitter {
    pub(crate) fn new(started: Option<Instant>) -> Self {
        Self {
            started,
            emissions: Vec::new(),
        }
    }

    pub fn emit(&mut self, port: impl Into<String>, payload: Value) {
        self.push(port.into(), payload, None);
    }

    pub fn emit_with_meta(&mut self, port: impl Into<String>, payload: Value, meta: Value) {
        self.push(port.into(), payload, Some(meta));
    }

    fn push(&mut self, port: String, payload: Value, meta: Option<Value>) {
        let elapsed = self.started.map(elapsed_ms).unwrap_or(0.0);
        self.emissions.push(Emission {
            port,
            payload,
            meta,
            elapsed_ms: elapsed,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.emissions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emissions.is_empty()
    }

    pub(crate) fn take(&mut self) -> Vec<Emission> {
        std::mem::take(&mut self.emissions)
    }
}

// ============================================================================
// Execution Context
// ============================================================================

/// Identity of the node currently being executed.
#[derive(Clone, Debug)]
pub struct CurrentNode {
    pub id: String,
    pub name: String,
    pub type_name: String,
}

/// Most recent output of a node of a given type within the current branch.
#[derive(Clone, Debug)]
pub struct TypedOutput<'a> {
    pub node: &'a Node,
    pub payload: &'a Value,
    pub meta: Option<&'a Value>,
}

/// Everything a handler receives for one visit.
pub struct ExecutionContext<'a> {
    /// Input that triggered this visit.
    pub input: &'a InputData,
    /// Properties with all template spans resolved for this visit.
    pub properties: Properties,
    /// The node's free-form metadata.
    pub meta: &'a NodeMeta,
    pub current: CurrentNode,
    /// Lookup and store capabilities bound to this node.
    pub api: ExecutionApi<'a>,
    pub logger: NodeLogger,
    pub(crate) emitter: &'a mut OutputEmitter,
}

impl ExecutionContext<'_> {
    /// Declare an output on `port`. May be called zero or more times.
    pub fn emit(&mut self, port: impl Into<String>, payload: Value) {
        self.emitter.emit(port, payload);
    }

    pub fn emit_with_meta(&mut self, port: impl Into<String>, payload: Value, meta: Value) {
        self.emitter.emit_with_meta(port, payload, meta);
    }

    /// Resolved value of a named property, if declared.
    #[must_use]
    pub fn property_value(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).map(|p| &p.value)
    }
}

/// Capability surface bound to the executing node.
///
/// Grants read access to the graph and branch state plus mutable access to
/// the run-wide key-value store. Handlers cannot mutate the graph or the
/// branch's execution data; forking and stamping are engine concerns.
pub struct ExecutionApi<'a> {
    pub(crate) graph: &'a WorkflowGraph,
    pub(crate) branch: &'a BranchState,
    pub(crate) store: &'a mut KeyValueStore,
    pub(crate) node_id: &'a str,
}

impl ExecutionApi<'_> {
    /// Look up any node by id.
    #[must_use]
    pub fn node_by_id(&self, id: &str) -> Option<&Node> {
        self.graph.node(id)
    }

    /// Most recent output of the most recently visited node of `type_name`
    /// within this branch, tie-broken by latest timestamp.
    #[must_use]
    pub fn latest_by_type(&self, type_name: &str) -> Option<TypedOutput<'_>> {
        let ids = self.graph.nodes_of_type(type_name)?;
        let mut best: Option<(f64, TypedOutput<'_>)> = None;
        for id in ids {
            let Some(output) = self.branch.output_of(id) else {
                continue;
            };
            let newer = best
                .as_ref()
                .is_none_or(|(time, _)| output.timestamp_ms > *time);
            if newer {
                let Some(node) = self.graph.node(id) else {
                    continue;
                };
                best = Some((
                    output.timestamp_ms,
                    TypedOutput {
                        node,
                        payload: &output.payload,
                        meta: output.meta.as_ref(),
                    },
                ));
            }
        }
        best.map(|(_, found)| found)
    }

    /// Nodes with a connection into `id`.
    #[must_use]
    pub fn input_nodes(&self, id: &str) -> Option<&FxHashSet<String>> {
        self.graph.inputs_of(id)
    }

    /// Nodes `id` connects out to.
    #[must_use]
    pub fn output_nodes(&self, id: &str) -> Option<&FxHashSet<String>> {
        self.graph.outputs_of(id)
    }

    pub fn set_global(&mut self, scope: &str, key: &str, value: Value) {
        self.store.scoped_set(scope, key, value);
    }

    #[must_use]
    pub fn get_global(&self, scope: &str, key: &str) -> Option<&Value> {
        self.store.scoped_get(scope, key)
    }

    pub fn delete_global(&mut self, scope: &str, key: &str) -> Option<Value> {
        self.store.scoped_delete(scope, key)
    }

    /// Whether this node has already produced output within this branch.
    #[must_use]
    pub fn branch_active(&self) -> bool {
        self.branch.output_of(self.node_id).is_some()
    }
}

/// Node-scoped logger handed to handlers.
#[derive(Clone, Debug)]
pub struct NodeLogger {
    node: String,
}

impl NodeLogger {
    pub(crate) fn new(node: impl Into<String>) -> Self {
        Self { node: node.into() }
    }

    pub fn info(&self, message: &str) {
        tracing::info!(target: "weftrun::node", node = %self.node, "{message}");
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(target: "weftrun::node", node = %self.node, "{message}");
    }

    pub fn error(&self, message: &str) {
        tracing::error!(target: "weftrun::node", node = %self.node, "{message}");
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!(target: "weftrun::node", node = %self.node, "{message}");
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Fatal errors raised by handler logic.
///
/// These are not caught by the engine; they abort the current invocation and
/// surface to whoever triggered it.
#[derive(Debug, Error, Diagnostic)]
pub enum HandlerFault {
    /// Expected input data was not present.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(weftrun::handler::missing_input),
        help("Check that the upstream node produced the required data.")
    )]
    MissingInput { what: &'static str },

    /// A resolved property did not have the shape the handler requires.
    #[error("invalid property `{property}`: {message}")]
    #[diagnostic(code(weftrun::handler::invalid_property))]
    InvalidProperty { property: String, message: String },

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    #[diagnostic(code(weftrun::handler::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Any other failure inside handler logic.
    #[error("{0}")]
    #[diagnostic(code(weftrun::handler::other))]
    Other(String),
}
