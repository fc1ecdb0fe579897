//! Application state for shared services

use std::sync::Arc;

use crate::infrastructure::auth::JwtGenerator;
use crate::infrastructure::services::WorkflowService;
use crate::infrastructure::tools::WorkflowTools;

/// Services shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub workflow_service: Arc<WorkflowService>,
    pub workflow_tools: Arc<WorkflowTools>,
    pub jwt_service: Arc<dyn JwtGenerator>,
}

impl AppState {
    pub fn new(workflow_service: Arc<WorkflowService>, jwt_service: Arc<dyn JwtGenerator>) -> Self {
        let workflow_tools = Arc::new(WorkflowTools::new(workflow_service.clone()));

        Self {
            workflow_service,
            workflow_tools,
            jwt_service,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub mod test_support {
    //! In-memory state and token helpers for handler tests

    use super::*;
    use crate::domain::workflow::Capabilities;
    use crate::domain::UserId;
    use crate::infrastructure::auth::JwtService;
    use crate::infrastructure::workflow::{InMemoryWorkflowRepository, WorkflowEngine};

    pub fn state() -> AppState {
        let repository = Arc::new(InMemoryWorkflowRepository::new());
        let engine = Arc::new(WorkflowEngine::new(Capabilities::new()));
        let service = Arc::new(WorkflowService::new(repository, engine));

        AppState::new(service, Arc::new(JwtService::with_default_config()))
    }

    pub fn bearer(state: &AppState, user: &str) -> String {
        let user_id = UserId::new(user).unwrap();
        let token = state.jwt_service.generate(&user_id, user).unwrap();
        format!("Bearer {}", token)
    }
}
