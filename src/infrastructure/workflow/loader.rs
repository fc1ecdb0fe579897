//! Sub-workflow loading backed by the structure repository

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::workflow::{WorkflowLoader, WorkflowStructureRepository};
use crate::domain::{UserId, WorkflowError, WorkflowId, WorkflowStructure};

/// Loads nested workflows with the same read-access rule as direct execution
#[derive(Debug, Clone)]
pub struct RepositoryWorkflowLoader {
    repository: Arc<dyn WorkflowStructureRepository>,
}

impl RepositoryWorkflowLoader {
    pub fn new(repository: Arc<dyn WorkflowStructureRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl WorkflowLoader for RepositoryWorkflowLoader {
    async fn load_for_execution(
        &self,
        id: &WorkflowId,
        user_id: &UserId,
    ) -> Result<WorkflowStructure, WorkflowError> {
        if !self.repository.check_access(id, user_id, true).await? {
            return Err(WorkflowError::not_found_or_forbidden(id.to_string()));
        }

        self.repository
            .select_structure_by_id(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found_or_forbidden(id.to_string()))
    }
}
