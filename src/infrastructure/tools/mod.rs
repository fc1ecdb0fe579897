//! Tools: the registry behind workflow tool nodes and the workflow tool set
//! exposed to the chat agent

mod definition;
mod registry;
mod workflow_tools;

pub use definition::ToolDefinition;
pub use registry::{ToolFn, ToolRegistry};
pub use workflow_tools::{
    ToolError, ToolResponse, WorkflowTools, CREATE_WORKFLOW, DELETE_WORKFLOW, EXECUTE_WORKFLOW,
    GET_WORKFLOW_STRUCTURE, LIST_WORKFLOWS, UPDATE_WORKFLOW_STRUCTURE,
};
