//! Workflow graph model
//!
//! A workflow is a directed graph of typed nodes. Edges may carry a branch
//! tag, in which case they are only followed when their source node resolves
//! to that branch. This module holds the pure model and its contracts:
//!
//! - entities and identifiers ([`Workflow`], [`Node`], [`Edge`])
//! - the node kind catalogue ([`NodeConfig`])
//! - access rules ([`check_access`])
//! - structural validation ([`validate_structure`])
//! - execution contracts ([`NodeHandler`], [`ExecutionResult`])
//! - the portable template format ([`WorkflowTemplate`])
//! - the persistence contract ([`WorkflowStructureRepository`])
//!
//! ## Variable References
//!
//! Node configuration may reference the trigger payload and earlier outputs:
//! - `${input:field}` / `${input:field:default}`
//! - `${node:node-id:field}` / `${node:node-id:field:default}`

mod access;
mod capability;
mod context;
mod edge;
mod entity;
mod error;
mod executor;
mod graph;
mod node;
mod node_types;
pub mod repository;
mod template;
mod validator;

pub use access::{check_access, AccessMode};
pub use capability::{
    Capabilities, ModelClient, ModelRequest, ModelResponse, ModelUsage, ToolInvoker,
    WorkflowLoader,
};
pub use context::{
    get_nested_field, value_to_string, ExecutionContext, Invocation, VariableRef, VisitBudget,
    DEFAULT_VISIT_BUDGET,
};
pub use edge::{Edge, EdgeId};
pub use entity::{
    validate_tags, validate_workflow_name, Visibility, Workflow, WorkflowIcon, WorkflowId,
    WorkflowStructure, WorkflowSummary, MAX_NAME_LENGTH, MAX_TAGS,
};
pub use error::WorkflowError;
pub use executor::{
    ExecutionOutcome, ExecutionResult, NestedRunner, NodeContext, NodeHandler, NodeOutput,
    NodeRun, NodeRunStatus,
};
pub use graph::Graph;
pub use node::{validate_element_id, Node, NodeId, UiConfig, MAX_ELEMENT_ID_LENGTH};
pub use node_types::{
    Condition, ConditionBranch, ConditionConnector, ConditionNodeConfig, ConditionOperator,
    InputField, InputNodeConfig, LlmNodeConfig, NodeConfig, NodeKind, OutputNodeConfig,
    SubWorkflowNodeConfig, ToolNodeConfig, DEFAULT_BRANCH_TAG,
};
pub use repository::WorkflowStructureRepository;
pub use template::{export_file_name, TemplateMetadata, WorkflowTemplate, TEMPLATE_FORMAT_VERSION};
pub use validator::{
    validate_graph, validate_structure, FindingCode, FindingSubject, Severity, ValidationFinding,
    ValidationMode, ValidationReport,
};

#[cfg(test)]
pub use capability::mock::{MockModelClient, MockToolInvoker};
#[cfg(test)]
pub use repository::mock::MockWorkflowRepository;
