//! Structural and configuration checks over a workflow graph
//!
//! Checks run in a fixed order. The structural checks (dangling edges,
//! duplicate ids, entry points, unconditional cycles) stop at the first one
//! that produces a blocking finding, since later checks assume a well-formed
//! graph. Configuration checks and advisory warnings accumulate.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::edge::{Edge, EdgeId};
use super::entity::WorkflowStructure;
use super::error::WorkflowError;
use super::graph::Graph;
use super::node::{Node, NodeId};
use super::node_types::{NodeConfig, NodeKind};

/// Whether a finding prevents the operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Blocking,
    Warning,
}

/// What the graph is being validated for
///
/// Incomplete node configuration blocks execution and publishing but not
/// saving a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    #[default]
    Storage,
    Execution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCode {
    DanglingEdge,
    DuplicateNodeId,
    DuplicateEdgeId,
    NoEntryNode,
    UnconditionalCycle,
    MissingConfig,
    BranchEdgeFromNonBranchNode,
    UnknownBranchTag,
    UnreachableNode,
    NoOutputNode,
}

/// The element a finding refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum FindingSubject {
    Workflow,
    Node(NodeId),
    Edge(EdgeId),
}

impl fmt::Display for FindingSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workflow => write!(f, "workflow"),
            Self::Node(id) => write!(f, "node '{}'", id),
            Self::Edge(id) => write!(f, "edge '{}'", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub severity: Severity,
    pub code: FindingCode,
    pub subject: FindingSubject,
    pub message: String,
}

impl ValidationFinding {
    fn blocking(code: FindingCode, subject: FindingSubject, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Blocking,
            code,
            subject,
            message: message.into(),
        }
    }

    fn warning(code: FindingCode, subject: FindingSubject, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            subject,
            message: message.into(),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

/// Ordered validation findings; empty means the graph is clean
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub findings: Vec<ValidationFinding>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn has_blocking(&self) -> bool {
        self.findings.iter().any(ValidationFinding::is_blocking)
    }

    pub fn blocking(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(|f| f.is_blocking())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings.iter().filter(|f| !f.is_blocking())
    }

    /// Fail with every blocking finding, or hand back the warnings
    pub fn into_result(self) -> Result<Vec<ValidationFinding>, WorkflowError> {
        if self.has_blocking() {
            let blocking = self.findings.into_iter().filter(|f| f.is_blocking()).collect();
            return Err(WorkflowError::ValidationBlocking(blocking));
        }

        Ok(self.findings)
    }
}

/// Validate a stored or candidate workflow structure
pub fn validate_structure(structure: &WorkflowStructure, mode: ValidationMode) -> ValidationReport {
    validate_graph(&structure.nodes, &structure.edges, mode)
}

/// Validate a node and edge set
pub fn validate_graph(nodes: &[Node], edges: &[Edge], mode: ValidationMode) -> ValidationReport {
    let mut report = ValidationReport::default();

    let structural: [fn(&[Node], &[Edge], ValidationMode) -> Vec<ValidationFinding>; 4] = [
        check_dangling_edges,
        check_duplicate_ids,
        check_entry_points,
        check_unconditional_cycles,
    ];

    for check in structural {
        let findings = check(nodes, edges, mode);
        let blocking = findings.iter().any(ValidationFinding::is_blocking);
        report.findings.extend(findings);
        if blocking {
            return report;
        }
    }

    report.findings.extend(check_node_config(nodes, mode));
    report.findings.extend(check_advisories(nodes, edges));
    report
}

fn check_dangling_edges(nodes: &[Node], edges: &[Edge], _: ValidationMode) -> Vec<ValidationFinding> {
    let ids: HashSet<&NodeId> = nodes.iter().map(|n| n.id()).collect();

    edges
        .iter()
        .filter_map(|edge| {
            let missing: Vec<&str> = [edge.source(), edge.target()]
                .into_iter()
                .filter(|id| !ids.contains(id))
                .map(|id| id.as_str())
                .collect();

            if missing.is_empty() {
                return None;
            }

            Some(ValidationFinding::blocking(
                FindingCode::DanglingEdge,
                FindingSubject::Edge(edge.id().clone()),
                format!("Edge references unknown node(s): {}", missing.join(", ")),
            ))
        })
        .collect()
}

fn check_duplicate_ids(nodes: &[Node], edges: &[Edge], _: ValidationMode) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();

    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for node in nodes {
        if !seen.insert(node.id()) && reported.insert(node.id()) {
            findings.push(ValidationFinding::blocking(
                FindingCode::DuplicateNodeId,
                FindingSubject::Node(node.id().clone()),
                "Node ID is used more than once",
            ));
        }
    }

    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for edge in edges {
        if !seen.insert(edge.id()) && reported.insert(edge.id()) {
            findings.push(ValidationFinding::blocking(
                FindingCode::DuplicateEdgeId,
                FindingSubject::Edge(edge.id().clone()),
                "Edge ID is used more than once",
            ));
        }
    }

    findings
}

fn check_entry_points(nodes: &[Node], edges: &[Edge], mode: ValidationMode) -> Vec<ValidationFinding> {
    if nodes.is_empty() {
        // An empty draft may be saved and filled in later.
        return match mode {
            ValidationMode::Storage => Vec::new(),
            ValidationMode::Execution => vec![ValidationFinding::blocking(
                FindingCode::NoEntryNode,
                FindingSubject::Workflow,
                "Workflow has no nodes",
            )],
        };
    }

    if Graph::new(nodes, edges).entry_points().is_empty() {
        return vec![ValidationFinding::blocking(
            FindingCode::NoEntryNode,
            FindingSubject::Workflow,
            "Every node has an incoming edge; at least one entry node is required",
        )];
    }

    Vec::new()
}

fn check_unconditional_cycles(
    nodes: &[Node],
    edges: &[Edge],
    _: ValidationMode,
) -> Vec<ValidationFinding> {
    let graph = Graph::new(nodes, edges);

    match graph.unconditional_cycle(nodes) {
        Some(cycle) => {
            let path: Vec<&str> = cycle.iter().map(NodeId::as_str).collect();
            vec![ValidationFinding::blocking(
                FindingCode::UnconditionalCycle,
                FindingSubject::Node(cycle[0].clone()),
                format!(
                    "Cycle without a conditional edge: {} -> {}",
                    path.join(" -> "),
                    path[0]
                ),
            )]
        }
        None => Vec::new(),
    }
}

fn check_node_config(nodes: &[Node], mode: ValidationMode) -> Vec<ValidationFinding> {
    nodes
        .iter()
        .filter_map(|node| {
            let missing = node.config().missing_fields();
            if missing.is_empty() {
                return None;
            }

            let message = format!(
                "{} node is missing required configuration: {}",
                node.kind(),
                missing.join(", ")
            );
            let subject = FindingSubject::Node(node.id().clone());

            Some(match mode {
                ValidationMode::Execution => {
                    ValidationFinding::blocking(FindingCode::MissingConfig, subject, message)
                }
                ValidationMode::Storage => {
                    ValidationFinding::warning(FindingCode::MissingConfig, subject, message)
                }
            })
        })
        .collect()
}

fn check_advisories(nodes: &[Node], edges: &[Edge]) -> Vec<ValidationFinding> {
    let graph = Graph::new(nodes, edges);
    let mut findings = Vec::new();

    for edge in edges {
        let (Some(tag), Some(source)) = (edge.condition(), graph.node(edge.source())) else {
            continue;
        };

        match source.config() {
            NodeConfig::Condition(config) => {
                if !config.tags().any(|t| t == tag) {
                    findings.push(ValidationFinding::warning(
                        FindingCode::UnknownBranchTag,
                        FindingSubject::Edge(edge.id().clone()),
                        format!(
                            "Branch '{}' is not produced by node '{}'; this edge is never taken",
                            tag,
                            source.id()
                        ),
                    ));
                }
            }
            _ => findings.push(ValidationFinding::warning(
                FindingCode::BranchEdgeFromNonBranchNode,
                FindingSubject::Edge(edge.id().clone()),
                format!(
                    "{} node '{}' produces no branch; this edge is never taken",
                    source.kind(),
                    source.id()
                ),
            )),
        }
    }

    for node in nodes {
        if !graph.is_reachable(node.id()) {
            findings.push(ValidationFinding::warning(
                FindingCode::UnreachableNode,
                FindingSubject::Node(node.id().clone()),
                "Node cannot be reached from any entry node",
            ));
        }
    }

    if !nodes.is_empty() && !nodes.iter().any(|n| n.kind() == NodeKind::Output) {
        findings.push(ValidationFinding::warning(
            FindingCode::NoOutputNode,
            FindingSubject::Workflow,
            "Workflow has no output node; runs cannot produce a result",
        ));
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::node_types::{
        Condition, ConditionBranch, ConditionNodeConfig, ConditionOperator, InputNodeConfig,
        LlmNodeConfig, OutputNodeConfig,
    };
    use serde_json::json;

    fn input(id: &str) -> Node {
        Node::new(NodeId::new(id).unwrap(), id, NodeConfig::Input(InputNodeConfig::default()))
    }

    fn output(id: &str) -> Node {
        Node::new(NodeId::new(id).unwrap(), id, NodeConfig::Output(OutputNodeConfig::default()))
    }

    fn llm(id: &str, config: LlmNodeConfig) -> Node {
        Node::new(NodeId::new(id).unwrap(), id, NodeConfig::Llm(config))
    }

    fn branch(id: &str) -> Node {
        let config = ConditionNodeConfig::default().with_branch(
            ConditionBranch::new("yes").with_condition(
                Condition::new("${input:ok}", ConditionOperator::Eq).with_value(json!(true)),
            ),
        );
        Node::new(NodeId::new(id).unwrap(), id, NodeConfig::Condition(config))
    }

    fn edge(id: &str, from: &str, to: &str) -> Edge {
        Edge::new(
            EdgeId::new(id).unwrap(),
            NodeId::new(from).unwrap(),
            NodeId::new(to).unwrap(),
        )
    }

    fn codes(report: &ValidationReport) -> Vec<FindingCode> {
        report.findings.iter().map(|f| f.code).collect()
    }

    #[test]
    fn test_clean_graph_is_ok() {
        let nodes = vec![input("in"), output("out")];
        let edges = vec![edge("e1", "in", "out")];

        let report = validate_graph(&nodes, &edges, ValidationMode::Execution);
        assert!(report.is_ok());
    }

    #[test]
    fn test_dangling_edge_blocks_and_stops() {
        let nodes = vec![input("in"), output("out"), output("out")];
        let edges = vec![edge("e1", "in", "ghost")];

        let report = validate_graph(&nodes, &edges, ValidationMode::Storage);
        assert_eq!(codes(&report), vec![FindingCode::DanglingEdge]);
        assert_eq!(
            report.findings[0].subject,
            FindingSubject::Edge(EdgeId::new("e1").unwrap())
        );
        assert!(report.findings[0].message.contains("ghost"));
    }

    #[test]
    fn test_duplicate_ids_reported_once_each() {
        let nodes = vec![input("in"), output("out"), output("out"), output("out")];
        let edges = vec![edge("e1", "in", "out"), edge("e1", "in", "out")];

        let report = validate_graph(&nodes, &edges, ValidationMode::Storage);
        assert_eq!(
            codes(&report),
            vec![FindingCode::DuplicateNodeId, FindingCode::DuplicateEdgeId]
        );
    }

    #[test]
    fn test_no_entry_node() {
        let nodes = vec![output("a"), output("b")];
        let edges = vec![
            edge("e1", "a", "b").with_condition("x"),
            edge("e2", "b", "a").with_condition("y"),
        ];

        let report = validate_graph(&nodes, &edges, ValidationMode::Storage);
        assert_eq!(codes(&report), vec![FindingCode::NoEntryNode]);
    }

    #[test]
    fn test_empty_graph_depends_on_mode() {
        let storage = validate_graph(&[], &[], ValidationMode::Storage);
        assert!(storage.is_ok());

        let execution = validate_graph(&[], &[], ValidationMode::Execution);
        assert_eq!(codes(&execution), vec![FindingCode::NoEntryNode]);
        assert!(execution.has_blocking());
    }

    #[test]
    fn test_unconditional_cycle_blocks() {
        let nodes = vec![input("in"), output("a"), output("b")];
        let edges = vec![
            edge("e1", "in", "a"),
            edge("e2", "a", "b"),
            edge("e3", "b", "a"),
        ];

        let report = validate_graph(&nodes, &edges, ValidationMode::Storage);
        assert_eq!(codes(&report), vec![FindingCode::UnconditionalCycle]);
        assert!(report.findings[0].message.contains("a -> b -> a"));
    }

    #[test]
    fn test_cycle_through_conditional_edge_is_structurally_valid() {
        let nodes = vec![input("in"), branch("check"), output("out")];
        let edges = vec![
            edge("e1", "in", "check"),
            edge("e2", "check", "check").with_condition("yes"),
            edge("e3", "check", "out").with_condition("else"),
        ];

        let report = validate_graph(&nodes, &edges, ValidationMode::Execution);
        assert!(!report.has_blocking(), "{:?}", report.findings);
    }

    #[test]
    fn test_missing_config_severity_follows_mode() {
        let nodes = vec![input("in"), llm("ask", LlmNodeConfig::default()), output("out")];
        let edges = vec![edge("e1", "in", "ask"), edge("e2", "ask", "out")];

        let storage = validate_graph(&nodes, &edges, ValidationMode::Storage);
        assert_eq!(codes(&storage), vec![FindingCode::MissingConfig]);
        assert!(!storage.has_blocking());

        let execution = validate_graph(&nodes, &edges, ValidationMode::Execution);
        assert!(execution.has_blocking());
        assert!(execution.findings[0].message.contains("model, prompt"));
    }

    #[test]
    fn test_missing_config_accumulates() {
        let nodes = vec![
            input("in"),
            llm("a", LlmNodeConfig::default()),
            llm("b", LlmNodeConfig::default()),
            output("out"),
        ];
        let edges = vec![
            edge("e1", "in", "a"),
            edge("e2", "in", "b"),
            edge("e3", "a", "out"),
            edge("e4", "b", "out"),
        ];

        let report = validate_graph(&nodes, &edges, ValidationMode::Execution);
        assert_eq!(report.blocking().count(), 2);
    }

    #[test]
    fn test_advisory_warnings() {
        let nodes = vec![input("in"), branch("check"), output("out"), output("orphan")];
        let edges = vec![
            edge("e1", "in", "check"),
            edge("e2", "check", "out").with_condition("maybe"),
            edge("e3", "in", "out").with_condition("yes"),
            edge("e4", "orphan", "orphan").with_condition("x"),
        ];

        let report = validate_graph(&nodes, &edges, ValidationMode::Storage);
        assert!(!report.has_blocking());
        assert_eq!(
            codes(&report),
            vec![
                FindingCode::UnknownBranchTag,
                FindingCode::BranchEdgeFromNonBranchNode,
                FindingCode::BranchEdgeFromNonBranchNode,
                FindingCode::UnreachableNode,
            ]
        );
    }

    #[test]
    fn test_no_output_node_warning() {
        let nodes = vec![input("in")];
        let report = validate_graph(&nodes, &[], ValidationMode::Execution);

        assert_eq!(codes(&report), vec![FindingCode::NoOutputNode]);
        assert!(!report.has_blocking());
    }

    #[test]
    fn test_into_result_keeps_only_blocking() {
        let nodes = vec![input("in"), llm("ask", LlmNodeConfig::default())];
        let edges = vec![edge("e1", "in", "ask")];

        let err = validate_graph(&nodes, &edges, ValidationMode::Execution)
            .into_result()
            .unwrap_err();

        match err {
            WorkflowError::ValidationBlocking(findings) => {
                assert_eq!(findings.len(), 1);
                assert_eq!(findings[0].code, FindingCode::MissingConfig);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
