//! Node handler contract and execution result types

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::context::ExecutionContext;
use super::entity::{WorkflowId, WorkflowStructure};
use super::error::WorkflowError;
use super::node::{Node, NodeId};
use super::node_types::NodeKind;

/// What a handler produced for one node run
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput {
    pub value: Value,
    /// Branch discriminant; only branching kinds set it
    pub branch: Option<String>,
}

impl NodeOutput {
    pub fn value(value: Value) -> Self {
        Self {
            value,
            branch: None,
        }
    }

    pub fn branch(value: Value, tag: impl Into<String>) -> Self {
        Self {
            value,
            branch: Some(tag.into()),
        }
    }
}

/// Re-entry point for nested workflow runs
#[async_trait]
pub trait NestedRunner: Send + Sync {
    async fn run_nested(
        &self,
        structure: WorkflowStructure,
        input: Value,
        parent: &ExecutionContext,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, WorkflowError>;
}

/// Everything a handler may observe while running a node
pub struct NodeContext<'a> {
    pub execution: &'a ExecutionContext,
    /// Outputs of the sources of the edges that activated this run, in edge order
    pub inbound: Vec<(NodeId, Value)>,
    pub cancel: CancellationToken,
    pub nested: &'a dyn NestedRunner,
}

impl NodeContext<'_> {
    /// Inbound values merged into one: the single value, or an object keyed by source id
    ///
    /// Entry nodes have no inbound edges and see the trigger payload.
    pub fn merged_inbound(&self) -> Value {
        match self.inbound.as_slice() {
            [] => self.execution.input().clone(),
            [(_, value)] => value.clone(),
            many => Value::Object(
                many.iter()
                    .map(|(id, v)| (id.to_string(), v.clone()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

/// Runs nodes of one kind
#[async_trait]
pub trait NodeHandler: Send + Sync + std::fmt::Debug {
    async fn run(&self, node: &Node, ctx: &NodeContext<'_>) -> Result<NodeOutput, WorkflowError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    Succeeded,
    Failed,
}

/// Record of one node dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRun {
    pub node_id: NodeId,
    pub kind: NodeKind,
    pub status: NodeRunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl NodeRun {
    pub fn succeeded(node: &Node, output: &NodeOutput, duration_ms: u64) -> Self {
        Self {
            node_id: node.id().clone(),
            kind: node.kind(),
            status: NodeRunStatus::Succeeded,
            output: Some(output.value.clone()),
            branch: output.branch.clone(),
            error: None,
            duration_ms,
        }
    }

    pub fn failed(node: &Node, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            node_id: node.id().clone(),
            kind: node.kind(),
            status: NodeRunStatus::Failed,
            output: None,
            branch: None,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// How an execution ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Completed,
    NodeFailed { node_id: NodeId, message: String },
    BudgetExceeded { budget: u32 },
    Cancelled,
    NoTerminalOutput,
}

/// Result of one workflow run, including partial progress on failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub workflow_id: WorkflowId,
    pub outcome: ExecutionOutcome,
    /// Values produced by output nodes
    pub outputs: BTreeMap<NodeId, Value>,
    pub node_runs: Vec<NodeRun>,
    /// Nodes on branches that were not taken
    pub skipped: Vec<NodeId>,
    pub visits: u32,
    pub execution_time_ms: u64,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.outcome == ExecutionOutcome::Completed
    }

    /// The first failed node run, if any
    pub fn first_failure(&self) -> Option<&NodeRun> {
        self.node_runs
            .iter()
            .find(|r| r.status == NodeRunStatus::Failed)
    }

    /// The terminal value: the single output, or an object keyed by output node id
    pub fn output(&self) -> Value {
        match self.outputs.len() {
            0 => Value::Null,
            1 => self.outputs.values().next().cloned().unwrap_or(Value::Null),
            _ => Value::Object(
                self.outputs
                    .iter()
                    .map(|(id, v)| (id.to_string(), v.clone()))
                    .collect(),
            ),
        }
    }

    /// Convert a non-completed outcome into its typed error
    pub fn into_outputs(self) -> Result<BTreeMap<NodeId, Value>, WorkflowError> {
        match self.outcome {
            ExecutionOutcome::Completed => Ok(self.outputs),
            ExecutionOutcome::NodeFailed { node_id, message } => {
                Err(WorkflowError::node_failure(node_id, message))
            }
            ExecutionOutcome::BudgetExceeded { budget } => {
                Err(WorkflowError::BudgetExceeded { budget })
            }
            ExecutionOutcome::Cancelled => Err(WorkflowError::Cancelled),
            ExecutionOutcome::NoTerminalOutput => Err(WorkflowError::NoTerminalOutput),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::node_types::{NodeConfig, OutputNodeConfig};
    use serde_json::json;

    fn result(outcome: ExecutionOutcome) -> ExecutionResult {
        ExecutionResult {
            workflow_id: WorkflowId::generate(),
            outcome,
            outputs: BTreeMap::new(),
            node_runs: Vec::new(),
            skipped: Vec::new(),
            visits: 0,
            execution_time_ms: 0,
        }
    }

    #[test]
    fn test_output_single_and_many() {
        let mut r = result(ExecutionOutcome::Completed);
        assert_eq!(r.output(), Value::Null);

        r.outputs.insert(NodeId::new("a").unwrap(), json!(1));
        assert_eq!(r.output(), json!(1));

        r.outputs.insert(NodeId::new("b").unwrap(), json!(2));
        assert_eq!(r.output(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_into_outputs_maps_outcomes() {
        assert!(result(ExecutionOutcome::Completed).into_outputs().is_ok());
        assert_eq!(
            result(ExecutionOutcome::BudgetExceeded { budget: 5 }).into_outputs(),
            Err(WorkflowError::BudgetExceeded { budget: 5 })
        );
        assert_eq!(
            result(ExecutionOutcome::Cancelled).into_outputs(),
            Err(WorkflowError::Cancelled)
        );
        assert!(matches!(
            result(ExecutionOutcome::NodeFailed {
                node_id: NodeId::new("x").unwrap(),
                message: "boom".to_string()
            })
            .into_outputs(),
            Err(WorkflowError::NodeHandlerFailure { .. })
        ));
    }

    #[test]
    fn test_first_failure() {
        let node = Node::new(
            NodeId::new("out").unwrap(),
            "Out",
            NodeConfig::Output(OutputNodeConfig::default()),
        );
        let mut r = result(ExecutionOutcome::Completed);
        r.node_runs.push(NodeRun::succeeded(&node, &NodeOutput::value(json!(1)), 3));
        r.node_runs.push(NodeRun::failed(&node, "boom", 4));

        assert_eq!(r.first_failure().unwrap().error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(ExecutionOutcome::BudgetExceeded { budget: 10 }).unwrap();
        assert_eq!(json, json!({"status": "budget_exceeded", "budget": 10}));
    }
}
