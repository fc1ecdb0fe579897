//! In-memory workflow structure repository

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::workflow::repository::{is_listed_for, sort_summaries};
use crate::domain::workflow::{check_access, AccessMode, WorkflowStructureRepository};
use crate::domain::{DomainError, UserId, Workflow, WorkflowId, WorkflowStructure, WorkflowSummary};

/// In-memory implementation of WorkflowStructureRepository
///
/// A structure is stored as one value, so replacing it under the write lock
/// swaps metadata, nodes and edges together.
#[derive(Debug, Clone)]
pub struct InMemoryWorkflowRepository {
    structures: Arc<RwLock<HashMap<WorkflowId, WorkflowStructure>>>,
}

impl InMemoryWorkflowRepository {
    /// Create a new empty repository
    pub fn new() -> Self {
        Self {
            structures: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a repository pre-populated with structures
    pub fn with_structures(structures: Vec<WorkflowStructure>) -> Self {
        let map: HashMap<WorkflowId, WorkflowStructure> =
            structures.into_iter().map(|s| (*s.id(), s)).collect();

        Self {
            structures: Arc::new(RwLock::new(map)),
        }
    }
}

impl Default for InMemoryWorkflowRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStructureRepository for InMemoryWorkflowRepository {
    async fn check_access(
        &self,
        id: &WorkflowId,
        user_id: &UserId,
        read_only: bool,
    ) -> Result<bool, DomainError> {
        let structures = self.structures.read().await;
        Ok(check_access(
            structures.get(id).map(|s| &s.workflow),
            user_id,
            AccessMode::from_read_only(read_only),
        ))
    }

    async fn select_structure_by_id(
        &self,
        id: &WorkflowId,
    ) -> Result<Option<WorkflowStructure>, DomainError> {
        let structures = self.structures.read().await;
        Ok(structures.get(id).cloned())
    }

    async fn select_workflows_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<WorkflowSummary>, DomainError> {
        let structures = self.structures.read().await;
        let mut summaries: Vec<WorkflowSummary> = structures
            .values()
            .filter(|s| is_listed_for(&s.workflow, user_id))
            .map(WorkflowStructure::summary)
            .collect();
        sort_summaries(&mut summaries);
        Ok(summaries)
    }

    async fn insert_structure(
        &self,
        structure: WorkflowStructure,
    ) -> Result<WorkflowStructure, DomainError> {
        let mut structures = self.structures.write().await;

        if structures.contains_key(structure.id()) {
            return Err(DomainError::conflict(format!(
                "Workflow '{}' already exists",
                structure.id()
            )));
        }

        structures.insert(*structure.id(), structure.clone());
        Ok(structure)
    }

    async fn replace_structure(
        &self,
        structure: WorkflowStructure,
    ) -> Result<WorkflowStructure, DomainError> {
        let mut structures = self.structures.write().await;

        let Some(slot) = structures.get_mut(structure.id()) else {
            return Err(DomainError::not_found(format!(
                "Workflow '{}' not found",
                structure.id()
            )));
        };

        *slot = structure.clone();
        Ok(structure)
    }

    async fn update_workflow(&self, workflow: Workflow) -> Result<Workflow, DomainError> {
        let mut structures = self.structures.write().await;

        let structure = structures.get_mut(workflow.id()).ok_or_else(|| {
            DomainError::not_found(format!("Workflow '{}' not found", workflow.id()))
        })?;

        structure.workflow = workflow.clone();
        Ok(workflow)
    }

    async fn delete_structure(&self, id: &WorkflowId) -> Result<bool, DomainError> {
        let mut structures = self.structures.write().await;
        Ok(structures.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::{
        Edge, EdgeId, InputNodeConfig, Node, NodeConfig, NodeId, Visibility,
    };

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn create_test_structure(owner: &str, name: &str) -> WorkflowStructure {
        let start = Node::new(
            NodeId::new("start").unwrap(),
            "Start",
            NodeConfig::Input(InputNodeConfig::default()),
        );
        let next = Node::new(
            NodeId::new("next").unwrap(),
            "Next",
            NodeConfig::Input(InputNodeConfig::default()),
        );
        let edge = Edge::new(
            EdgeId::new("e1").unwrap(),
            NodeId::new("start").unwrap(),
            NodeId::new("next").unwrap(),
        );

        WorkflowStructure::new(
            Workflow::new(WorkflowId::generate(), user(owner), name),
            vec![start, next],
            vec![edge],
        )
    }

    #[tokio::test]
    async fn test_insert_and_select() {
        let repo = InMemoryWorkflowRepository::new();
        let structure = create_test_structure("alice", "Flow");
        let id = *structure.id();

        repo.insert_structure(structure.clone()).await.unwrap();

        let fetched = repo.select_structure_by_id(&id).await.unwrap().unwrap();
        assert_eq!(fetched, structure);
    }

    #[tokio::test]
    async fn test_insert_duplicate_conflicts() {
        let repo = InMemoryWorkflowRepository::new();
        let structure = create_test_structure("alice", "Flow");

        repo.insert_structure(structure.clone()).await.unwrap();
        let result = repo.insert_structure(structure).await;

        assert!(matches!(result, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_replace_swaps_whole_structure() {
        let repo = InMemoryWorkflowRepository::new();
        let mut structure = create_test_structure("alice", "Flow");
        repo.insert_structure(structure.clone()).await.unwrap();

        structure.nodes.truncate(1);
        structure.edges.clear();
        structure.workflow.increment_version();
        repo.replace_structure(structure.clone()).await.unwrap();

        let fetched = repo
            .select_structure_by_id(structure.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.nodes.len(), 1);
        assert!(fetched.edges.is_empty());
        assert_eq!(fetched.workflow.version(), 2);
    }

    #[tokio::test]
    async fn test_replace_missing_is_not_found() {
        let repo = InMemoryWorkflowRepository::new();
        let result = repo
            .replace_structure(create_test_structure("alice", "Flow"))
            .await;

        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_listing_includes_own_and_public() {
        let own = create_test_structure("alice", "Mine");
        let mut public = create_test_structure("bob", "Shared");
        public.workflow.set_visibility(Visibility::Public);
        let private = create_test_structure("bob", "Hidden");

        let repo = InMemoryWorkflowRepository::with_structures(vec![own, public, private]);
        let listed = repo.select_workflows_by_user_id(&user("alice")).await.unwrap();

        let names: Vec<&str> = listed.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(listed.len(), 2);
        assert!(names.contains(&"Mine"));
        assert!(names.contains(&"Shared"));
    }

    #[tokio::test]
    async fn test_check_access() {
        let structure = create_test_structure("alice", "Flow");
        let id = *structure.id();
        let repo = InMemoryWorkflowRepository::with_structures(vec![structure]);

        assert!(repo.check_access(&id, &user("alice"), false).await.unwrap());
        assert!(!repo.check_access(&id, &user("bob"), true).await.unwrap());
        assert!(!repo
            .check_access(&WorkflowId::generate(), &user("alice"), true)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_delete_removes_nodes_and_edges() {
        let structure = create_test_structure("alice", "Flow");
        let id = *structure.id();
        let repo = InMemoryWorkflowRepository::with_structures(vec![structure]);

        assert!(repo.delete_structure(&id).await.unwrap());
        assert!(repo.select_structure_by_id(&id).await.unwrap().is_none());
        assert!(!repo.delete_structure(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_workflow_keeps_nodes() {
        let structure = create_test_structure("alice", "Flow");
        let repo = InMemoryWorkflowRepository::with_structures(vec![structure.clone()]);

        let mut workflow = structure.workflow.clone();
        workflow.set_name("Renamed");
        repo.update_workflow(workflow).await.unwrap();

        let fetched = repo
            .select_structure_by_id(structure.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.workflow.name(), "Renamed");
        assert_eq!(fetched.nodes.len(), 2);
    }
}
