//! Workflow error types

use thiserror::Error;

use super::node::NodeId;
use super::validator::ValidationFinding;
use crate::domain::DomainError;

/// Errors that can occur during workflow operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkflowError {
    /// Missing workflows and workflows the caller may not see are reported identically
    #[error("Workflow not found: {0}")]
    NotFoundOrForbidden(String),

    #[error("Workflow has {} blocking validation finding(s)", .0.len())]
    ValidationBlocking(Vec<ValidationFinding>),

    #[error("Visitation budget of {budget} node runs exhausted")]
    BudgetExceeded { budget: u32 },

    #[error("Node '{node_id}' failed: {message}")]
    NodeHandlerFailure { node_id: NodeId, message: String },

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Unsupported template format version {found} (supported up to {supported})")]
    ImportFormatUnsupported { found: u32, supported: u32 },

    #[error("Malformed template: {0}")]
    ImportMalformed(String),

    #[error("Execution finished without producing a terminal output")]
    NoTerminalOutput,

    #[error("Variable resolution failed: {0}")]
    VariableResolution(String),

    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl WorkflowError {
    pub fn not_found_or_forbidden(id: impl Into<String>) -> Self {
        Self::NotFoundOrForbidden(id.into())
    }

    pub fn node_failure(node_id: NodeId, message: impl Into<String>) -> Self {
        Self::NodeHandlerFailure {
            node_id,
            message: message.into(),
        }
    }

    pub fn import_malformed(message: impl Into<String>) -> Self {
        Self::ImportMalformed(message.into())
    }

    pub fn variable_resolution(message: impl Into<String>) -> Self {
        Self::VariableResolution(message.into())
    }

    pub fn capability_unavailable(message: impl Into<String>) -> Self {
        Self::CapabilityUnavailable(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Stable machine-readable code, shared by the HTTP and tool surfaces
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFoundOrForbidden(_) => "not_found_or_forbidden",
            Self::ValidationBlocking(_) => "validation_blocking",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::NodeHandlerFailure { .. } => "node_handler_failure",
            Self::Cancelled => "cancelled",
            Self::ImportFormatUnsupported { .. } => "import_format_unsupported",
            Self::ImportMalformed(_) => "import_malformed",
            Self::NoTerminalOutput => "no_terminal_output",
            Self::VariableResolution(_) => "variable_resolution",
            Self::CapabilityUnavailable(_) => "capability_unavailable",
            Self::Validation(_) => "invalid_request",
            Self::Storage(_) => "storage_error",
        }
    }
}

impl From<DomainError> for WorkflowError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { message } => Self::NotFoundOrForbidden(message),
            DomainError::Validation { message } => Self::Validation(message),
            other => Self::Storage(other.to_string()),
        }
    }
}
