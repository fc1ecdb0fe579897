//! Workflow structure repository trait

use async_trait::async_trait;

use super::access::{check_access, AccessMode};
use super::entity::{Workflow, WorkflowId, WorkflowStructure, WorkflowSummary};
use crate::domain::user::UserId;
use crate::domain::DomainError;

/// Persistence for workflows together with their node and edge sets
///
/// Implementations must replace a workflow's node and edge set atomically:
/// readers observe either the old structure or the new one, never a mix.
#[async_trait]
pub trait WorkflowStructureRepository: Send + Sync + std::fmt::Debug {
    /// Apply the ownership/visibility rule; missing workflows yield `false`
    async fn check_access(
        &self,
        id: &WorkflowId,
        user_id: &UserId,
        read_only: bool,
    ) -> Result<bool, DomainError>;

    /// Workflow metadata, nodes and edges
    async fn select_structure_by_id(
        &self,
        id: &WorkflowId,
    ) -> Result<Option<WorkflowStructure>, DomainError>;

    /// Workflows the user owns plus public workflows, most recently updated first
    async fn select_workflows_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<WorkflowSummary>, DomainError>;

    /// Store a new workflow with its nodes and edges
    async fn insert_structure(
        &self,
        structure: WorkflowStructure,
    ) -> Result<WorkflowStructure, DomainError>;

    /// Replace metadata, nodes and edges of an existing workflow in one step
    async fn replace_structure(
        &self,
        structure: WorkflowStructure,
    ) -> Result<WorkflowStructure, DomainError>;

    /// Update metadata only
    async fn update_workflow(&self, workflow: Workflow) -> Result<Workflow, DomainError>;

    /// Delete a workflow and, with it, all of its nodes and edges
    async fn delete_structure(&self, id: &WorkflowId) -> Result<bool, DomainError>;
}

/// Listing order shared by the implementations
pub(crate) fn sort_summaries(summaries: &mut [WorkflowSummary]) {
    summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.name.cmp(&b.name)));
}

/// Whether a workflow belongs in the user's listing
pub(crate) fn is_listed_for(workflow: &Workflow, user_id: &UserId) -> bool {
    check_access(Some(workflow), user_id, AccessMode::ReadOnly)
}
