//! Workflow service - access-checked operations on workflow structures

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::workflow::{
    validate_graph, validate_structure, validate_tags, validate_workflow_name, AccessMode,
    Invocation, ValidationFinding, ValidationMode, ValidationReport, WorkflowIcon,
    WorkflowStructureRepository, WorkflowTemplate,
};
use crate::domain::{
    Edge, ExecutionResult, Node, UserId, Visibility, Workflow, WorkflowError, WorkflowId,
    WorkflowStructure, WorkflowSummary,
};
use crate::infrastructure::workflow::WorkflowEngine;

/// A workflow graph as submitted by a client
///
/// Metadata fields are optional on update: absent values keep what is stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<WorkflowIcon>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_nodes(mut self, nodes: Vec<Node>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_edges(mut self, edges: Vec<Edge>) -> Self {
        self.edges = edges;
        self
    }

    fn validate_metadata(&self) -> Result<(), WorkflowError> {
        if let Some(ref name) = self.name {
            validate_workflow_name(name)?;
        }

        if let Some(ref tags) = self.tags {
            validate_tags(tags)?;
        }

        Ok(())
    }
}

/// A stored structure together with the non-blocking findings it was saved with
#[derive(Debug, Clone, Serialize)]
pub struct SavedWorkflow {
    pub structure: WorkflowStructure,
    pub warnings: Vec<ValidationFinding>,
}

/// Per-workflow locks serializing structural edits
#[derive(Debug, Default)]
struct EditLocks {
    locks: Mutex<HashMap<WorkflowId, Arc<Mutex<()>>>>,
}

impl EditLocks {
    async fn acquire(&self, id: &WorkflowId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries only referenced by the registry are idle
            locks.retain(|key, lock| key == id || Arc::strong_count(lock) > 1);
            locks.entry(*id).or_default().clone()
        };

        lock.lock_owned().await
    }
}

/// Workflow service
///
/// Every operation passes the access gate before touching the structure.
/// Denied and missing workflows both surface as `NotFoundOrForbidden`.
pub struct WorkflowService {
    repository: Arc<dyn WorkflowStructureRepository>,
    engine: Arc<WorkflowEngine>,
    edit_locks: EditLocks,
}

impl std::fmt::Debug for WorkflowService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowService").finish()
    }
}

impl WorkflowService {
    pub fn new(repository: Arc<dyn WorkflowStructureRepository>, engine: Arc<WorkflowEngine>) -> Self {
        Self {
            repository,
            engine,
            edit_locks: EditLocks::default(),
        }
    }

    /// Own workflows plus public ones
    pub async fn list(&self, user_id: &UserId) -> Result<Vec<WorkflowSummary>, WorkflowError> {
        Ok(self.repository.select_workflows_by_user_id(user_id).await?)
    }

    pub async fn get_structure(
        &self,
        id: &WorkflowId,
        user_id: &UserId,
    ) -> Result<WorkflowStructure, WorkflowError> {
        self.load(id, user_id, AccessMode::ReadOnly).await
    }

    /// Create a new private, unpublished workflow owned by the caller
    pub async fn create(
        &self,
        user_id: &UserId,
        definition: WorkflowDefinition,
    ) -> Result<SavedWorkflow, WorkflowError> {
        let name = definition
            .name
            .clone()
            .ok_or_else(|| WorkflowError::validation("Workflow name is required"))?;
        definition.validate_metadata()?;

        let warnings = validate_graph(&definition.nodes, &definition.edges, ValidationMode::Storage)
            .into_result()?;

        let mut workflow = Workflow::new(WorkflowId::generate(), user_id.clone(), name)
            .with_tags(definition.tags.unwrap_or_default());
        if let Some(description) = definition.description {
            workflow = workflow.with_description(description);
        }
        if let Some(icon) = definition.icon {
            workflow = workflow.with_icon(icon);
        }

        let structure = self
            .repository
            .insert_structure(WorkflowStructure::new(workflow, definition.nodes, definition.edges))
            .await?;

        info!(
            workflow_id = %structure.id(),
            user_id = %user_id,
            nodes = structure.nodes.len(),
            "Workflow created"
        );

        Ok(SavedWorkflow {
            structure,
            warnings,
        })
    }

    /// Replace the node and edge set of a workflow
    pub async fn update_structure(
        &self,
        id: &WorkflowId,
        user_id: &UserId,
        definition: WorkflowDefinition,
    ) -> Result<SavedWorkflow, WorkflowError> {
        self.authorize(id, user_id, AccessMode::Edit).await?;
        definition.validate_metadata()?;

        let warnings = validate_graph(&definition.nodes, &definition.edges, ValidationMode::Storage)
            .into_result()?;

        let _guard = self.edit_locks.acquire(id).await;
        let mut structure = self.fetch(id).await?;

        let workflow = &mut structure.workflow;
        if let Some(name) = definition.name {
            workflow.set_name(name);
        }
        if definition.description.is_some() {
            workflow.set_description(definition.description);
        }
        if definition.icon.is_some() {
            workflow.set_icon(definition.icon);
        }
        if let Some(tags) = definition.tags {
            workflow.set_tags(tags);
        }
        workflow.increment_version();

        structure.nodes = definition.nodes;
        structure.edges = definition.edges;

        let structure = self.repository.replace_structure(structure).await?;

        info!(
            workflow_id = %id,
            user_id = %user_id,
            version = structure.workflow.version(),
            "Workflow structure replaced"
        );

        Ok(SavedWorkflow {
            structure,
            warnings,
        })
    }

    pub async fn set_visibility(
        &self,
        id: &WorkflowId,
        user_id: &UserId,
        visibility: Visibility,
    ) -> Result<Workflow, WorkflowError> {
        self.authorize(id, user_id, AccessMode::Edit).await?;

        let _guard = self.edit_locks.acquire(id).await;
        let mut workflow = self.fetch(id).await?.workflow;
        workflow.set_visibility(visibility);

        info!(workflow_id = %id, visibility = visibility.as_str(), "Workflow visibility changed");

        Ok(self.repository.update_workflow(workflow).await?)
    }

    /// Publishing requires a graph that passes execution-mode validation
    pub async fn publish(
        &self,
        id: &WorkflowId,
        user_id: &UserId,
        published: bool,
    ) -> Result<Workflow, WorkflowError> {
        self.authorize(id, user_id, AccessMode::Edit).await?;

        let _guard = self.edit_locks.acquire(id).await;
        let structure = self.fetch(id).await?;

        if published {
            validate_structure(&structure, ValidationMode::Execution).into_result()?;
        }

        let mut workflow = structure.workflow;
        workflow.set_published(published);

        info!(workflow_id = %id, published, "Workflow publication changed");

        Ok(self.repository.update_workflow(workflow).await?)
    }

    /// Delete a workflow with all of its nodes and edges
    pub async fn delete(&self, id: &WorkflowId, user_id: &UserId) -> Result<(), WorkflowError> {
        self.authorize(id, user_id, AccessMode::Edit).await?;

        let _guard = self.edit_locks.acquire(id).await;
        if !self.repository.delete_structure(id).await? {
            return Err(WorkflowError::not_found_or_forbidden(id.to_string()));
        }

        info!(workflow_id = %id, user_id = %user_id, "Workflow deleted");

        Ok(())
    }

    pub async fn validate(
        &self,
        id: &WorkflowId,
        user_id: &UserId,
        mode: ValidationMode,
    ) -> Result<ValidationReport, WorkflowError> {
        let structure = self.load(id, user_id, AccessMode::ReadOnly).await?;
        Ok(validate_structure(&structure, mode))
    }

    /// Run a workflow
    ///
    /// Read access suffices, so public workflows can be run by anyone. Node
    /// failures and budget exhaustion are reported in the result, not as errors.
    pub async fn execute(
        &self,
        id: &WorkflowId,
        user_id: &UserId,
        input: Value,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, WorkflowError> {
        let structure = self.load(id, user_id, AccessMode::ReadOnly).await?;

        let warnings = validate_structure(&structure, ValidationMode::Execution).into_result()?;
        if !warnings.is_empty() {
            debug!(workflow_id = %id, warnings = warnings.len(), "Executing with warnings");
        }

        let result = self
            .engine
            .execute(&structure, input, Invocation::new(user_id.clone()), cancel)
            .await;

        if !result.is_success() {
            warn!(workflow_id = %id, outcome = ?result.outcome, "Workflow run did not complete");
        }

        Ok(result)
    }

    pub async fn export(
        &self,
        id: &WorkflowId,
        user_id: &UserId,
    ) -> Result<WorkflowTemplate, WorkflowError> {
        let structure = self.load(id, user_id, AccessMode::ReadOnly).await?;
        Ok(WorkflowTemplate::export(&structure, Utc::now()))
    }

    /// Import a template document as a new private workflow of the caller
    pub async fn import(
        &self,
        user_id: &UserId,
        document: Value,
    ) -> Result<SavedWorkflow, WorkflowError> {
        let structure = WorkflowTemplate::from_json(document)?.instantiate(user_id.clone())?;

        let warnings = validate_structure(&structure, ValidationMode::Storage).into_result()?;
        let structure = self.repository.insert_structure(structure).await?;

        info!(workflow_id = %structure.id(), user_id = %user_id, "Workflow imported");

        Ok(SavedWorkflow {
            structure,
            warnings,
        })
    }

    async fn authorize(
        &self,
        id: &WorkflowId,
        user_id: &UserId,
        mode: AccessMode,
    ) -> Result<(), WorkflowError> {
        if self
            .repository
            .check_access(id, user_id, mode.is_read_only())
            .await?
        {
            return Ok(());
        }

        debug!(workflow_id = %id, user_id = %user_id, mode = ?mode, "Access denied");
        Err(WorkflowError::not_found_or_forbidden(id.to_string()))
    }

    async fn fetch(&self, id: &WorkflowId) -> Result<WorkflowStructure, WorkflowError> {
        self.repository
            .select_structure_by_id(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found_or_forbidden(id.to_string()))
    }

    async fn load(
        &self,
        id: &WorkflowId,
        user_id: &UserId,
        mode: AccessMode,
    ) -> Result<WorkflowStructure, WorkflowError> {
        self.authorize(id, user_id, mode).await?;
        self.fetch(id).await
    }
}
