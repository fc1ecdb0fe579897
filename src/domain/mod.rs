//! Domain layer - Core business logic and entities

pub mod error;
pub mod user;
pub mod workflow;

pub use error::DomainError;
pub use user::UserId;
pub use workflow::{
    Edge, EdgeId, ExecutionResult, Node, NodeConfig, NodeId, NodeKind, Visibility, Workflow,
    WorkflowError, WorkflowId, WorkflowStructure, WorkflowSummary,
};
