//! Workflow execution engine
//!
//! Nodes are scheduled from a ready queue driven by per-edge signals. When a
//! node completes, each outgoing edge delivers a signal that is *active* if
//! the edge is unconditional or carries the branch tag the node resolved to.
//! A node becomes ready once all of its forward inbound edges have signalled
//! and at least one signal is active, or as soon as an active signal arrives
//! on a back edge (an edge closing a loop). Nodes whose inbound signals are
//! all inactive are skipped, and the skip propagates downstream so joins
//! behind untaken branches do not wait forever.
//!
//! An inactive signal on an edge leaving a loop only means the loop has not
//! exited *yet*. Those signals are held back until nothing is ready or
//! running, and are dropped if the loop later exits through that edge.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::handlers::builtin_handlers;
use crate::domain::workflow::{
    validate_structure, Capabilities, ExecutionContext, ExecutionOutcome, ExecutionResult,
    Graph, Invocation, NestedRunner, Node, NodeContext, NodeHandler, NodeId, NodeKind,
    NodeOutput, NodeRun, ValidationMode, VisitBudget, WorkflowError, WorkflowStructure,
    DEFAULT_VISIT_BUDGET,
};

/// Default number of nodes dispatched concurrently within one run
pub const DEFAULT_MAX_PARALLEL_NODES: usize = 8;

/// Default sub-workflow nesting limit
pub const DEFAULT_MAX_DEPTH: u32 = 8;

/// Engine limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Node runs allowed per top-level execution, nested runs included
    pub visit_budget: u32,

    pub max_parallel_nodes: usize,

    pub max_depth: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            visit_budget: DEFAULT_VISIT_BUDGET,
            max_parallel_nodes: DEFAULT_MAX_PARALLEL_NODES,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Dispatches workflow nodes to the handler registered for their kind
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    handlers: HashMap<NodeKind, Arc<dyn NodeHandler>>,
    config: EngineConfig,
}

impl WorkflowEngine {
    /// Create an engine with the built-in handlers
    pub fn new(capabilities: Capabilities) -> Self {
        Self::with_config(capabilities, EngineConfig::default())
    }

    pub fn with_config(capabilities: Capabilities, config: EngineConfig) -> Self {
        Self {
            handlers: builtin_handlers(&capabilities),
            config: EngineConfig {
                max_parallel_nodes: config.max_parallel_nodes.max(1),
                ..config
            },
        }
    }

    /// Replace the handler used for a node kind
    pub fn register_handler(&mut self, kind: NodeKind, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a workflow from its entry nodes
    ///
    /// The structure is expected to have passed execution-mode validation.
    /// Failures of individual nodes are reported in the result rather than
    /// as an error so that partial progress is never lost.
    pub async fn execute(
        &self,
        structure: &WorkflowStructure,
        input: Value,
        invocation: Invocation,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        let budget = Arc::new(VisitBudget::new(self.config.visit_budget));
        let context = ExecutionContext::new(input, invocation, budget);
        self.run(structure, &context, cancel).await
    }

    async fn run(
        &self,
        structure: &WorkflowStructure,
        context: &ExecutionContext,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        let start = Instant::now();
        let graph = Graph::new(&structure.nodes, &structure.edges);
        let run_token = cancel.child_token();
        let mut state = RunState::new(&graph);
        let mut in_flight = FuturesUnordered::new();

        info!(
            workflow_id = %structure.id(),
            depth = context.invocation().depth,
            nodes = structure.nodes.len(),
            "Workflow execution started"
        );

        for id in graph.entry_points() {
            if let Some(node) = graph.node(id) {
                state.ready.push_back(Ready {
                    node,
                    inbound: Vec::new(),
                });
            }
        }

        loop {
            if state.halted.is_none() && run_token.is_cancelled() {
                state.halted = Some(ExecutionOutcome::Cancelled);
            }

            while state.halted.is_none() && in_flight.len() < self.config.max_parallel_nodes {
                let Some(ready) = state.next_ready() else {
                    break;
                };

                if !context.budget().try_consume() {
                    warn!(
                        workflow_id = %structure.id(),
                        budget = context.budget().limit(),
                        "Visitation budget exhausted"
                    );
                    state.halted = Some(ExecutionOutcome::BudgetExceeded {
                        budget: context.budget().limit(),
                    });
                    break;
                }

                state.visits += 1;
                state.running.insert(ready.node.id());

                let inbound = ready
                    .inbound
                    .iter()
                    .map(|&index| {
                        let source = graph.edge(index).source();
                        (source.clone(), context.output(source).unwrap_or(Value::Null))
                    })
                    .collect();

                in_flight.push(self.run_node(
                    ready.node,
                    context,
                    inbound,
                    run_token.child_token(),
                ));
            }

            if state.halted.is_some() {
                break;
            }
            if in_flight.is_empty() {
                if state.ready.is_empty() && state.release_deferred() {
                    continue;
                }
                break;
            }

            tokio::select! {
                biased;
                _ = run_token.cancelled() => {
                    state.halted = Some(ExecutionOutcome::Cancelled);
                }
                Some((node, result, duration_ms)) = in_flight.next() => {
                    state.running.remove(node.id());
                    state.complete(node, result, duration_ms, context);
                }
            }
        }

        // Dropping the pending handler futures stops them; the token reaches
        // any work they spawned.
        if state.halted.is_some() {
            run_token.cancel();
        }
        drop(in_flight);

        let outcome = state.outcome();
        state.retain_never_run_skips();
        let result = ExecutionResult {
            workflow_id: *structure.id(),
            outcome,
            outputs: state.outputs,
            node_runs: state.node_runs,
            skipped: state.skipped,
            visits: state.visits,
            execution_time_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            workflow_id = %structure.id(),
            outcome = ?result.outcome,
            visits = result.visits,
            duration_ms = result.execution_time_ms,
            "Workflow execution finished"
        );

        result
    }

    async fn run_node<'n>(
        &self,
        node: &'n Node,
        context: &ExecutionContext,
        inbound: Vec<(NodeId, Value)>,
        cancel: CancellationToken,
    ) -> (&'n Node, Result<NodeOutput, WorkflowError>, u64) {
        let start = Instant::now();
        debug!(node_id = %node.id(), kind = %node.kind(), "Dispatching node");

        let result = match self.handlers.get(&node.kind()) {
            Some(handler) => {
                let ctx = NodeContext {
                    execution: context,
                    inbound,
                    cancel,
                    nested: self,
                };
                handler.run(node, &ctx).await
            }
            None => Err(WorkflowError::capability_unavailable(format!(
                "no handler registered for node kind '{}'",
                node.kind()
            ))),
        };

        (node, result, start.elapsed().as_millis() as u64)
    }
}

#[async_trait]
impl NestedRunner for WorkflowEngine {
    async fn run_nested(
        &self,
        structure: WorkflowStructure,
        input: Value,
        parent: &ExecutionContext,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, WorkflowError> {
        let invocation = parent.invocation().nested();
        if invocation.depth > self.config.max_depth {
            return Err(WorkflowError::validation(format!(
                "Sub-workflow nesting exceeds the maximum depth of {}",
                self.config.max_depth
            )));
        }

        validate_structure(&structure, ValidationMode::Execution).into_result()?;

        let context = ExecutionContext::new(input, invocation, parent.budget().clone());
        Ok(self.run(&structure, &context, cancel).await)
    }
}

/// A node waiting for dispatch and the edges that activated it
struct Ready<'a> {
    node: &'a Node,
    inbound: Vec<usize>,
}

enum Readiness {
    Dispatch(Vec<usize>),
    Skip,
    Wait,
}

/// Mutable bookkeeping of one run; only touched between handler awaits
struct RunState<'g, 'a> {
    graph: &'g Graph<'a>,
    /// edge index -> undelivered signal (true when active)
    signals: HashMap<usize, bool>,
    /// Loop exits that signalled inactive while the loop was still running
    deferred: BTreeSet<usize>,
    ready: VecDeque<Ready<'a>>,
    running: HashSet<&'a NodeId>,
    outputs: BTreeMap<NodeId, Value>,
    node_runs: Vec<NodeRun>,
    skipped: Vec<NodeId>,
    first_failure: Option<(NodeId, String)>,
    halted: Option<ExecutionOutcome>,
    visits: u32,
}

impl<'g, 'a> RunState<'g, 'a> {
    fn new(graph: &'g Graph<'a>) -> Self {
        Self {
            graph,
            signals: HashMap::new(),
            deferred: BTreeSet::new(),
            ready: VecDeque::new(),
            running: HashSet::new(),
            outputs: BTreeMap::new(),
            node_runs: Vec::new(),
            skipped: Vec::new(),
            first_failure: None,
            halted: None,
            visits: 0,
        }
    }

    /// Next queued node that is not currently running
    fn next_ready(&mut self) -> Option<Ready<'a>> {
        let position = self
            .ready
            .iter()
            .position(|r| !self.running.contains(r.node.id()))?;
        self.ready.remove(position)
    }

    fn complete(
        &mut self,
        node: &'a Node,
        result: Result<NodeOutput, WorkflowError>,
        duration_ms: u64,
        context: &ExecutionContext,
    ) {
        match result {
            Ok(output) => {
                debug!(node_id = %node.id(), duration_ms, "Node succeeded");
                context.set_output(node.id().clone(), output.value.clone());
                self.node_runs
                    .push(NodeRun::succeeded(node, &output, duration_ms));
                if node.kind() == NodeKind::Output {
                    self.outputs.insert(node.id().clone(), output.value.clone());
                }
                self.signal_outgoing(node.id(), output.branch.as_deref());
            }
            Err(WorkflowError::BudgetExceeded { budget }) => {
                self.node_runs.push(NodeRun::failed(
                    node,
                    WorkflowError::BudgetExceeded { budget }.to_string(),
                    duration_ms,
                ));
                self.halted = Some(ExecutionOutcome::BudgetExceeded { budget });
            }
            Err(e) => {
                let message = e.to_string();
                warn!(node_id = %node.id(), error = %message, "Node failed");
                self.node_runs
                    .push(NodeRun::failed(node, message.clone(), duration_ms));
                // The failed node's branch stops here; siblings keep running.
                if self.first_failure.is_none() {
                    self.first_failure = Some((node.id().clone(), message));
                }
            }
        }
    }

    fn signal_outgoing(&mut self, source: &NodeId, branch: Option<&str>) {
        let graph = self.graph;
        let mut targets = Vec::new();

        for &index in graph.outgoing(source) {
            let edge = graph.edge(index);
            let active = edge.is_active_for(branch);
            if graph.is_back_edge(index) && !active {
                continue;
            }
            if self.deliver(index, active) && !targets.contains(&edge.target()) {
                targets.push(edge.target());
            }
        }

        self.settle(targets);
    }

    /// Record a signal on an edge; false when it was held back
    fn deliver(&mut self, index: usize, active: bool) -> bool {
        if active {
            self.deferred.remove(&index);
        } else if self.graph.is_loop_exit(index) {
            self.deferred.insert(index);
            return false;
        }
        self.signals.insert(index, active);
        true
    }

    /// Deliver held-back loop exit signals once the run has gone quiet
    ///
    /// Returns false when there was nothing to release.
    fn release_deferred(&mut self) -> bool {
        if self.deferred.is_empty() {
            return false;
        }

        let graph = self.graph;
        let mut targets = Vec::new();
        for index in std::mem::take(&mut self.deferred) {
            debug!(edge_id = %graph.edge(index).id(), "Releasing untaken loop exit");
            self.signals.insert(index, false);
            let target = graph.edge(index).target();
            if !targets.contains(&target) {
                targets.push(target);
            }
        }

        self.settle(targets);
        true
    }

    /// Drop skip records of nodes that ran in another iteration
    fn retain_never_run_skips(&mut self) {
        let ran: HashSet<&NodeId> = self.node_runs.iter().map(|r| &r.node_id).collect();
        self.skipped.retain(|id| !ran.contains(id));
    }

    /// Re-evaluate nodes that just received signals, propagating skips
    fn settle(&mut self, mut pending: Vec<&'a NodeId>) {
        let graph = self.graph;
        pending.reverse();

        while let Some(id) = pending.pop() {
            let Some(node) = graph.node(id) else {
                continue;
            };

            match self.readiness(id) {
                Readiness::Dispatch(inbound) => self.ready.push_back(Ready { node, inbound }),
                Readiness::Skip => {
                    debug!(node_id = %id, "Node skipped");
                    if !self.skipped.contains(id) {
                        self.skipped.push(id.clone());
                    }
                    let mut next = Vec::new();
                    for &index in graph.outgoing(id) {
                        if graph.is_back_edge(index) || !self.deliver(index, false) {
                            continue;
                        }
                        let target = graph.edge(index).target();
                        if !next.contains(&target) {
                            next.push(target);
                        }
                    }
                    next.reverse();
                    pending.extend(next);
                }
                Readiness::Wait => {}
            }
        }
    }

    fn readiness(&mut self, id: &NodeId) -> Readiness {
        let graph = self.graph;

        let back: Vec<usize> = graph
            .incoming(id)
            .iter()
            .copied()
            .filter(|&i| graph.is_back_edge(i) && self.signals.get(&i) == Some(&true))
            .collect();
        if !back.is_empty() {
            for index in &back {
                self.signals.remove(index);
            }
            return Readiness::Dispatch(back);
        }

        let forward: Vec<usize> = graph.forward_incoming(id).collect();
        if forward.is_empty() || !forward.iter().all(|i| self.signals.contains_key(i)) {
            return Readiness::Wait;
        }

        let active: Vec<usize> = forward
            .iter()
            .copied()
            .filter(|i| self.signals.get(i) == Some(&true))
            .collect();
        for index in &forward {
            self.signals.remove(index);
        }

        if active.is_empty() {
            Readiness::Skip
        } else {
            Readiness::Dispatch(active)
        }
    }

    fn outcome(&self) -> ExecutionOutcome {
        if let Some(ref halted) = self.halted {
            return halted.clone();
        }
        if let Some((ref node_id, ref message)) = self.first_failure {
            return ExecutionOutcome::NodeFailed {
                node_id: node_id.clone(),
                message: message.clone(),
            };
        }
        if self.outputs.is_empty() {
            ExecutionOutcome::NoTerminalOutput
        } else {
            ExecutionOutcome::Completed
        }
    }
}
