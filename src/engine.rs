//! The execution engine: recursive branch propagation over the graph.
//!
//! An external trigger calls [`Engine::start_execution`]; the engine
//! resolves the entry node, invokes its handler, and propagates every
//! declared output along the node's connections, forking branch-local state
//! at each fan-out point until every branch terminates.
//!
//! # Branch lifecycle
//!
//! Each branch segment moves through `Pending -> Resolving -> Invoked` and
//! ends `Forked(n)` (one new segment per connected target), `Finalized` (no
//! connections on the emitting port; execution data cleared, terminal
//! record tagged `Finished`), or `Faulted` (fatal configuration fault or a
//! handler fault, which the engine deliberately does not catch).
//!
//! Fan-out is driven by an explicit worklist consumed by a loop rather than
//! direct call recursion: children are pushed in reverse declaration order
//! onto a stack, so pop order yields a depth-first, declaration-ordered
//! traversal while keeping call-stack depth flat on wide or deep graphs.
//!
//! # Shared state
//!
//! Branch-local state (the execution-data map and the accumulative time) is
//! forked by value before every enqueue; mutations in one branch are never
//! visible in another. The handler cache, tracer, and stores are owned by
//! the engine and mutated only between dispatches — single cooperative
//! scheduling domain, no locks. Singleton handler instances are shared by
//! design across all visits of one invocation, including sibling branches.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use std::time::Instant;
use thiserror::Error;

use crate::bus::{Envelope, TelemetryTarget};
use crate::graph::{LogLevel, WorkflowGraph};
use crate::node::{
    CurrentNode, ExecutionApi, ExecutionContext, HandlerFault, InputData, NodeHandler, NodeLogger,
    OutputEmitter,
};
use crate::resolver::PropertyResolver;
use crate::store::KeyValueStore;
use crate::telemetry::DebugProbe;
use crate::trace::{NodeSample, Tracer};
use crate::utils::id_generator::IdGenerator;
use crate::utils::memory::memory_usage_mb;
use crate::utils::time::{elapsed_ms, round3};
use crate::variables::VariableStore;

/// Terminal destiny label for branches with no downstream connections.
pub const FINISHED_LABEL: &str = "Finished";

/// Most recent output produced by a node within one branch.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeOutput {
    pub payload: Value,
    pub meta: Option<Value>,
    /// Monotonic worker-clock milliseconds; orders by-type lookups.
    pub timestamp_ms: f64,
}

/// Branch-local execution state: per-node last outputs plus the running
/// accumulative time. Forked by value at every fan-out point.
#[derive(Clone, Debug, Default)]
pub struct BranchState {
    data: FxHashMap<String, NodeOutput>,
    accumulative_ms: f64,
}

impl BranchState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn output_of(&self, node_id: &str) -> Option<&NodeOutput> {
        self.data.get(node_id)
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&String, &NodeOutput)> {
        self.data.iter()
    }

    #[must_use]
    pub fn accumulative_ms(&self) -> f64 {
        self.accumulative_ms
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn stamp(&mut self, node_id: String, output: NodeOutput) {
        self.data.insert(node_id, output);
    }

    fn finalize(&mut self) {
        self.data.clear();
    }
}

/// Worker-level context shared with handlers through the current-node
/// descriptor and with external collaborators opaquely.
#[derive(Clone, Debug, Default)]
pub struct WorkerContext {
    pub flow_id: String,
    pub properties: Value,
    pub project: Value,
}

/// Parameters of one top-level trigger call.
#[derive(Clone, Debug)]
pub struct ExecutionRequest {
    /// Node to start at; defaults to the graph's entry node.
    pub node_id: Option<String>,
    pub input: InputData,
    /// Correlation id to thread through; freshly minted when absent.
    pub correlation_id: Option<String>,
}

impl ExecutionRequest {
    /// Start at the entry node with the given payload.
    #[must_use]
    pub fn entry(payload: Value) -> Self {
        Self {
            node_id: None,
            input: InputData::new(payload),
            correlation_id: None,
        }
    }

    /// Start at a specific node.
    #[must_use]
    pub fn at_node(node_id: impl Into<String>, input: InputData) -> Self {
        Self {
            node_id: Some(node_id.into()),
            input,
            correlation_id: None,
        }
    }

    #[must_use]
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Fatal execution faults.
///
/// Configuration faults at execution time are unrecoverable within the
/// engine: they must be prevented by validating all referenced node types
/// resolve before a graph is admitted. Handler faults pass through
/// unwrapped by design.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("node `{node_id}` references unregistered type `{type_name}`")]
    #[diagnostic(
        code(weftrun::engine::unresolved_type),
        help("Validate every node type against the registry before admitting the graph.")
    )]
    UnresolvedType { node_id: String, type_name: String },

    #[error("connection targets unknown node `{node_id}`")]
    #[diagnostic(code(weftrun::engine::unknown_node))]
    UnknownNode { node_id: String },

    #[error(transparent)]
    #[diagnostic(code(weftrun::engine::handler))]
    Handler(#[from] HandlerFault),
}

struct BranchTask {
    node_id: String,
    input: InputData,
    branch: BranchState,
    correlation_id: String,
}

/// Drives one workflow graph inside a worker process.
pub struct Engine {
    graph: WorkflowGraph,
    context: WorkerContext,
    variables: VariableStore,
    tracer: Tracer,
    global_store: KeyValueStore,
    local_store: KeyValueStore,
    debug: DebugProbe,
    telemetry: Option<flume::Sender<Envelope>>,
    trace_lines: bool,
    clock: Instant,
    ids: IdGenerator,
}

impl Engine {
    #[must_use]
    pub fn new(graph: WorkflowGraph, context: WorkerContext) -> Self {
        Self {
            graph,
            context,
            variables: VariableStore::new(),
            tracer: Tracer::new(),
            global_store: KeyValueStore::new(),
            local_store: KeyValueStore::new(),
            debug: DebugProbe::new(),
            telemetry: None,
            trace_lines: std::env::var("WORKER_TRACE").is_ok(),
            clock: Instant::now(),
            ids: IdGenerator::new(),
        }
    }

    #[must_use]
    pub fn with_variables(mut self, variables: VariableStore) -> Self {
        self.variables = variables;
        self
    }

    /// Attach the telemetry bus this engine posts envelopes to.
    #[must_use]
    pub fn with_telemetry(mut self, sender: flume::Sender<Envelope>) -> Self {
        self.telemetry = Some(sender);
        self
    }

    /// Force per-emission execution trace lines on or off (defaults to the
    /// `WORKER_TRACE` environment toggle).
    #[must_use]
    pub fn with_trace_lines(mut self, enabled: bool) -> Self {
        self.trace_lines = enabled;
        self
    }

    #[must_use]
    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    #[must_use]
    pub fn context(&self) -> &WorkerContext {
        &self.context
    }

    #[must_use]
    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    #[must_use]
    pub fn global_store(&self) -> &KeyValueStore {
        &self.global_store
    }

    pub fn global_store_mut(&mut self) -> &mut KeyValueStore {
        &mut self.global_store
    }

    #[must_use]
    pub fn local_store(&self) -> &KeyValueStore {
        &self.local_store
    }

    pub fn local_store_mut(&mut self) -> &mut KeyValueStore {
        &mut self.local_store
    }

    #[must_use]
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub fn tracer_mut(&mut self) -> &mut Tracer {
        &mut self.tracer
    }

    /// Opt a node into tracer sampling.
    pub fn watch_node(&mut self, node_id: impl Into<String>) {
        self.tracer.watch(node_id);
    }

    pub fn unwatch_node(&mut self, node_id: &str) {
        self.tracer.unwatch(node_id);
    }

    /// Toggle debug step records.
    pub fn set_debug(&mut self, enabled: bool) {
        self.debug.set_enabled(enabled);
    }

    /// Start one invocation.
    ///
    /// With no node given, starts at the graph's entry node; a graph
    /// without one makes this a silent no-op. The handler cache lives for
    /// exactly this invocation and is shared, by reference, with every
    /// branch segment it spawns.
    pub async fn start_execution(&mut self, request: ExecutionRequest) -> Result<(), EngineError> {
        let start_node = match request.node_id {
            Some(id) => id,
            None => match self.graph.entry_node() {
                Some(node) => node.id.clone(),
                None => return Ok(()),
            },
        };
        let correlation_id = request
            .correlation_id
            .unwrap_or_else(|| self.ids.generate_correlation_id());

        let mut handler_cache: FxHashMap<String, Box<dyn NodeHandler>> = FxHashMap::default();
        let mut worklist = vec![BranchTask {
            node_id: start_node,
            input: request.input,
            branch: BranchState::new(),
            correlation_id,
        }];

        while let Some(task) = worklist.pop() {
            let spawned = self.run_visit(task, &mut handler_cache).await?;
            // Reverse push: pop order follows declaration order, and each
            // subtree is fully drained before its next sibling starts.
            worklist.extend(spawned.into_iter().rev());
        }
        Ok(())
    }

    /// Execute one branch segment: resolve the handler, resolve properties,
    /// invoke, and turn each emission into either forked child tasks or a
    /// finalized branch.
    async fn run_visit(
        &mut self,
        mut task: BranchTask,
        cache: &mut FxHashMap<String, Box<dyn NodeHandler>>,
    ) -> Result<Vec<BranchTask>, EngineError> {
        let (node_name, type_name, meta, node_properties, descriptor) = {
            let node = self
                .graph
                .node(&task.node_id)
                .ok_or_else(|| EngineError::UnknownNode {
                    node_id: task.node_id.clone(),
                })?;
            (
                node.name.clone(),
                node.type_name.clone(),
                node.meta.clone(),
                node.properties.clone(),
                node.descriptor().cloned(),
            )
        };
        let descriptor = descriptor.ok_or_else(|| EngineError::UnresolvedType {
            node_id: task.node_id.clone(),
            type_name: type_name.clone(),
        })?;

        self.tracer
            .record_input(&task.node_id, task.input.input_port.as_deref());

        // Handler lifecycle: cached for singletons, fresh otherwise.
        if descriptor.info.is_singleton && !cache.contains_key(&task.node_id) {
            cache.insert(task.node_id.clone(), descriptor.instantiate());
        }
        let mut fresh = if descriptor.info.is_singleton {
            None
        } else {
            Some(descriptor.instantiate())
        };

        // Node value overrides overlaid onto the declared schema, then the
        // resolver pass over every property.
        let mut schema = descriptor.properties.clone();
        for (key, property) in &node_properties {
            if let Some(slot) = schema.get_mut(key) {
                slot.value = property.value.clone();
            }
        }
        let resolver =
            PropertyResolver::for_visit(&self.graph, &task.branch, &self.variables, &task.input);
        let resolved = resolver.resolve_properties(&node_name, &schema);

        if let Some(start) = meta.logs.as_ref().and_then(|logs| logs.start.as_ref()) {
            if start.level != LogLevel::None {
                let message = resolver.resolve_string(&node_name, &start.value);
                self.node_log(start.level, &node_name, &message);
            }
        }

        let is_trigger = descriptor.info.is_trigger;
        let started = if is_trigger { None } else { Some(Instant::now()) };
        let mut emitter = OutputEmitter::new(started);

        {
            let handler: &mut dyn NodeHandler = match fresh.as_mut() {
                Some(handler) => handler.as_mut(),
                None => cache
                    .get_mut(&task.node_id)
                    .expect("singleton cached above")
                    .as_mut(),
            };
            let ctx = ExecutionContext {
                input: &task.input,
                properties: resolved.clone(),
                meta: &meta,
                current: CurrentNode {
                    id: task.node_id.clone(),
                    name: node_name.clone(),
                    type_name: type_name.clone(),
                },
                api: ExecutionApi {
                    graph: &self.graph,
                    branch: &task.branch,
                    store: &mut self.global_store,
                    node_id: &task.node_id,
                },
                logger: NodeLogger::new(node_name.as_str()),
                emitter: &mut emitter,
            };
            handler.on_execute(ctx).await?;
        }

        let mut spawned = Vec::new();
        for emission in emitter.take() {
            // A trigger node starts a new correlation flow with every
            // emission; everything downstream carries the new id.
            if is_trigger {
                task.correlation_id = self.ids.generate_correlation_id();
            }

            task.branch.accumulative_ms =
                round3(task.branch.accumulative_ms + emission.elapsed_ms);
            self.tracer
                .record_output(&task.node_id, &emission.port, emission.elapsed_ms);
            if self.tracer.is_watched(&task.node_id) {
                self.tracer.record_sample(
                    &task.node_id,
                    NodeSample {
                        node_id: task.node_id.clone(),
                        name: node_name.clone(),
                        type_name: type_name.clone(),
                        properties: serde_json::to_value(&resolved).unwrap_or(Value::Null),
                        payload: emission.payload.clone(),
                    },
                );
            }

            if let Some(exec) = meta.logs.as_ref().and_then(|logs| logs.exec.as_ref()) {
                if exec.level != LogLevel::None {
                    let message = PropertyResolver::for_visit(
                        &self.graph,
                        &task.branch,
                        &self.variables,
                        &task.input,
                    )
                    .with_input_payload(&emission.payload)
                    .resolve_string(&node_name, &exec.value);
                    self.node_log(exec.level, &node_name, &message);
                }
            }

            task.branch.stamp(
                task.node_id.clone(),
                NodeOutput {
                    payload: emission.payload.clone(),
                    meta: emission.meta.clone(),
                    timestamp_ms: elapsed_ms(self.clock),
                },
            );

            let targets: Vec<_> = self
                .graph
                .connections_from(&task.node_id, &emission.port)
                .map(<[_]>::to_vec)
                .unwrap_or_default();

            if targets.is_empty() {
                // No downstream connections: the branch terminates here.
                task.branch.finalize();
                self.console_execute(
                    &task.correlation_id,
                    &node_name,
                    &[FINISHED_LABEL.to_string()],
                    emission.elapsed_ms,
                    task.branch.accumulative_ms,
                    &emission.payload,
                );
                continue;
            }

            let destiny: Vec<String> = targets
                .iter()
                .map(|target| {
                    self.graph
                        .node(&target.node_id)
                        .map(|node| node.name.clone())
                        .unwrap_or_else(|| target.node_id.clone())
                })
                .collect();
            self.console_execute(
                &task.correlation_id,
                &node_name,
                &destiny,
                emission.elapsed_ms,
                task.branch.accumulative_ms,
                &emission.payload,
            );

            for target in targets {
                spawned.push(BranchTask {
                    node_id: target.node_id.clone(),
                    input: InputData::connected(
                        task.node_id.clone(),
                        target.input_port.clone(),
                        emission.payload.clone(),
                    ),
                    branch: task.branch.clone(),
                    correlation_id: task.correlation_id.clone(),
                });
            }
        }

        Ok(spawned)
    }

    /// Post the tracer's dirty diff, drained samples, sampling stats, and a
    /// memory sample as tagged envelopes. Hosts call this on their own
    /// cadence; nothing is pushed otherwise.
    pub fn flush_telemetry(&mut self) {
        if let Some(snapshot) = self.tracer.snapshot() {
            if let Ok(data) = serde_json::to_value(&snapshot) {
                self.post(TelemetryTarget::Trace, data);
            }
        }
        for sample in self.tracer.drain_samples() {
            if let Ok(data) = serde_json::to_value(&sample) {
                self.post(TelemetryTarget::NodeSample, data);
            }
        }
        let stats = self.tracer.stats_snapshot();
        if !stats.is_empty() {
            if let Ok(data) = serde_json::to_value(&stats) {
                self.post(TelemetryTarget::NodeStats, data);
            }
        }
        if let Some(memory) = memory_usage_mb() {
            self.post(TelemetryTarget::Memory, json!(memory));
        }
    }

    fn console_execute(
        &mut self,
        correlation_id: &str,
        origin: &str,
        destiny: &[String],
        elapsed_ms: f64,
        accumulative_ms: f64,
        payload: &Value,
    ) {
        let memory_mb = memory_usage_mb();
        if self.trace_lines {
            for target in destiny {
                tracing::info!(
                    target: "weftrun::engine",
                    correlation = %correlation_id,
                    origin = %origin,
                    destiny = %target,
                    elapsed_ms,
                    accumulative_ms,
                    memory_mb,
                    "execute"
                );
            }
        }
        if let Some(record) = self.debug.record(
            correlation_id,
            origin,
            destiny,
            elapsed_ms,
            accumulative_ms,
            payload,
            memory_mb,
        ) {
            self.post(TelemetryTarget::Debug, record);
        }
    }

    fn node_log(&self, level: LogLevel, node: &str, message: &str) {
        match level {
            LogLevel::None => return,
            LogLevel::Info => {
                tracing::info!(target: "weftrun::node", node = %node, "{message}");
            }
            LogLevel::Warn => {
                tracing::warn!(target: "weftrun::node", node = %node, "{message}");
            }
            LogLevel::Error => {
                tracing::error!(target: "weftrun::node", node = %node, "{message}");
            }
            LogLevel::Debug => {
                tracing::debug!(target: "weftrun::node", node = %node, "{message}");
            }
        }
        self.post(
            TelemetryTarget::Logs,
            json!({
                "date": chrono::Local::now().format("%d/%m/%Y %H:%M:%S%.3f").to_string(),
                "level": level,
                "node": node,
                "message": message,
            }),
        );
    }

    fn post(&self, target: TelemetryTarget, data: Value) {
        if let Some(sender) = &self.telemetry {
            let _ = sender.send(Envelope::new(target, data));
        }
    }
}
