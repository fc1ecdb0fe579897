//! PostgreSQL workflow structure repository
//!
//! Metadata lives in `workflows`; nodes and edges live in `workflow_nodes`
//! and `workflow_edges`, both removed with their workflow through
//! `ON DELETE CASCADE`. Replacing a structure rewrites all three tables in a
//! single transaction that first locks the workflow row.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::workflow::repository::sort_summaries;
use crate::domain::workflow::{
    check_access, AccessMode, Edge, EdgeId, Node, NodeConfig, NodeId, UiConfig, Visibility,
    WorkflowIcon, WorkflowStructureRepository,
};
use crate::domain::{DomainError, UserId, Workflow, WorkflowId, WorkflowStructure, WorkflowSummary};
use crate::infrastructure::storage::{connect_pool, PostgresConfig};

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS workflows (
        id UUID PRIMARY KEY,
        name VARCHAR(100) NOT NULL,
        description TEXT,
        icon JSONB,
        tags JSONB NOT NULL DEFAULT '[]'::jsonb,
        visibility VARCHAR(16) NOT NULL DEFAULT 'private',
        published BOOLEAN NOT NULL DEFAULT FALSE,
        version INTEGER NOT NULL DEFAULT 1,
        owner_id VARCHAR(128) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_workflows_owner ON workflows (owner_id)",
    r#"
    CREATE TABLE IF NOT EXISTS workflow_nodes (
        workflow_id UUID NOT NULL REFERENCES workflows (id) ON DELETE CASCADE,
        id VARCHAR(64) NOT NULL,
        position INTEGER NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        kind VARCHAR(32) NOT NULL,
        config JSONB NOT NULL,
        ui_config JSONB NOT NULL DEFAULT '{}'::jsonb,
        PRIMARY KEY (workflow_id, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS workflow_edges (
        workflow_id UUID NOT NULL REFERENCES workflows (id) ON DELETE CASCADE,
        id VARCHAR(64) NOT NULL,
        position INTEGER NOT NULL,
        source VARCHAR(64) NOT NULL,
        target VARCHAR(64) NOT NULL,
        condition TEXT,
        ui_config JSONB NOT NULL DEFAULT '{}'::jsonb,
        PRIMARY KEY (workflow_id, id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_workflows_visibility ON workflows (visibility)",
];

const WORKFLOW_COLUMNS: &str = "id, name, description, icon, tags, visibility, published, \
                                version, owner_id, created_at, updated_at";

/// PostgreSQL implementation of WorkflowStructureRepository
#[derive(Debug, Clone)]
pub struct PostgresWorkflowRepository {
    pool: PgPool,
}

impl PostgresWorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the tables exist
    pub async fn connect(config: &PostgresConfig) -> Result<Self, DomainError> {
        let repository = Self::new(connect_pool(config).await?);
        repository.ensure_schema().await?;
        Ok(repository)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the workflow tables if they do not exist
    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| DomainError::storage(format!("Failed to create schema: {}", e)))?;
        }

        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, DomainError> {
        self.pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))
    }

    async fn write_workflow(
        tx: &mut Transaction<'static, Postgres>,
        workflow: &Workflow,
        insert: bool,
    ) -> Result<u64, DomainError> {
        let query = if insert {
            format!(
                "INSERT INTO workflows ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                WORKFLOW_COLUMNS
            )
        } else {
            r#"
            UPDATE workflows
            SET name = $2, description = $3, icon = $4, tags = $5, visibility = $6,
                published = $7, version = $8, owner_id = $9, created_at = $10, updated_at = $11
            WHERE id = $1
            "#
            .to_string()
        };

        let icon = workflow
            .icon()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| DomainError::storage(format!("Failed to serialize icon: {}", e)))?;
        let tags = serde_json::to_value(workflow.tags())
            .map_err(|e| DomainError::storage(format!("Failed to serialize tags: {}", e)))?;

        let result = sqlx::query(&query)
            .bind(workflow.id().as_uuid())
            .bind(workflow.name())
            .bind(workflow.description())
            .bind(icon)
            .bind(tags)
            .bind(workflow.visibility().as_str())
            .bind(workflow.is_published())
            .bind(workflow.version() as i32)
            .bind(workflow.owner_id().as_str())
            .bind(workflow.created_at())
            .bind(workflow.updated_at())
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                if e.to_string().contains("duplicate key") {
                    DomainError::conflict(format!("Workflow '{}' already exists", workflow.id()))
                } else {
                    DomainError::storage(format!("Failed to write workflow: {}", e))
                }
            })?;

        Ok(result.rows_affected())
    }

    async fn write_graph(
        tx: &mut Transaction<'static, Postgres>,
        structure: &WorkflowStructure,
    ) -> Result<(), DomainError> {
        let workflow_id = structure.id().as_uuid();

        for (position, node) in structure.nodes.iter().enumerate() {
            let config = serde_json::to_value(node.config())
                .map_err(|e| DomainError::storage(format!("Failed to serialize node: {}", e)))?;

            sqlx::query(
                r#"
                INSERT INTO workflow_nodes
                    (workflow_id, id, position, name, description, kind, config, ui_config)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(workflow_id)
            .bind(node.id().as_str())
            .bind(position as i32)
            .bind(node.name())
            .bind(node.description())
            .bind(node.kind().as_str())
            .bind(config)
            .bind(node.ui().clone().into_value())
            .execute(&mut **tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to insert node: {}", e)))?;
        }

        for (position, edge) in structure.edges.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO workflow_edges
                    (workflow_id, id, position, source, target, condition, ui_config)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(workflow_id)
            .bind(edge.id().as_str())
            .bind(position as i32)
            .bind(edge.source().as_str())
            .bind(edge.target().as_str())
            .bind(edge.condition())
            .bind(edge.ui().clone().into_value())
            .execute(&mut **tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to insert edge: {}", e)))?;
        }

        Ok(())
    }

    async fn select_workflow(&self, id: &WorkflowId) -> Result<Option<Workflow>, DomainError> {
        let query = format!("SELECT {} FROM workflows WHERE id = $1", WORKFLOW_COLUMNS);

        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get workflow: {}", e)))?;

        row.as_ref().map(row_to_workflow).transpose()
    }
}

fn row_to_workflow(row: &PgRow) -> Result<Workflow, DomainError> {
    let id: Uuid = row.get("id");
    let owner: String = row.get("owner_id");
    let visibility: String = row.get("visibility");
    let version: i32 = row.get("version");
    let icon: Option<Value> = row.get("icon");
    let tags: Value = row.get("tags");
    let description: Option<String> = row.get("description");
    let created_at: DateTime<Utc> = row.get("created_at");
    let updated_at: DateTime<Utc> = row.get("updated_at");

    let owner_id = UserId::new(owner)
        .map_err(|e| DomainError::storage(format!("Invalid stored owner id: {}", e)))?;
    let visibility: Visibility = visibility
        .parse()
        .map_err(|e| DomainError::storage(format!("Invalid stored visibility: {}", e)))?;
    let tags: BTreeSet<String> = serde_json::from_value(tags)
        .map_err(|e| DomainError::storage(format!("Invalid stored tags: {}", e)))?;

    let mut workflow = Workflow::new(WorkflowId::from_uuid(id), owner_id, row.get::<String, _>("name"))
        .with_tags(tags)
        .with_visibility(visibility)
        .with_published(row.get("published"))
        .with_version(version.max(1) as u32)
        .with_timestamps(created_at, updated_at);

    if let Some(description) = description {
        workflow = workflow.with_description(description);
    }
    if let Some(icon) = icon {
        let icon: WorkflowIcon = serde_json::from_value(icon)
            .map_err(|e| DomainError::storage(format!("Invalid stored icon: {}", e)))?;
        workflow = workflow.with_icon(icon);
    }

    Ok(workflow)
}

fn row_to_node(row: &PgRow) -> Result<Node, DomainError> {
    let id = NodeId::new(row.get::<String, _>("id"))
        .map_err(|e| DomainError::storage(format!("Invalid stored node id: {}", e)))?;
    let config: NodeConfig = serde_json::from_value(row.get("config"))
        .map_err(|e| DomainError::storage(format!("Invalid stored node config: {}", e)))?;
    let description: Option<String> = row.get("description");

    let mut node = Node::new(id, row.get::<String, _>("name"), config)
        .with_ui(UiConfig::from_value(row.get("ui_config")));
    if let Some(description) = description {
        node = node.with_description(description);
    }

    Ok(node)
}

fn row_to_edge(row: &PgRow) -> Result<Edge, DomainError> {
    let invalid = |e: crate::domain::WorkflowError| {
        DomainError::storage(format!("Invalid stored edge: {}", e))
    };
    let id = EdgeId::new(row.get::<String, _>("id")).map_err(invalid)?;
    let source = NodeId::new(row.get::<String, _>("source")).map_err(invalid)?;
    let target = NodeId::new(row.get::<String, _>("target")).map_err(invalid)?;
    let condition: Option<String> = row.get("condition");

    let mut edge =
        Edge::new(id, source, target).with_ui(UiConfig::from_value(row.get("ui_config")));
    if let Some(condition) = condition {
        edge = edge.with_condition(condition);
    }

    Ok(edge)
}

#[async_trait]
impl WorkflowStructureRepository for PostgresWorkflowRepository {
    async fn check_access(
        &self,
        id: &WorkflowId,
        user_id: &UserId,
        read_only: bool,
    ) -> Result<bool, DomainError> {
        let workflow = self.select_workflow(id).await?;
        Ok(check_access(
            workflow.as_ref(),
            user_id,
            AccessMode::from_read_only(read_only),
        ))
    }

    async fn select_structure_by_id(
        &self,
        id: &WorkflowId,
    ) -> Result<Option<WorkflowStructure>, DomainError> {
        let mut tx = self.begin().await?;

        // One snapshot for all three reads
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to set isolation level: {}", e)))?;

        let query = format!("SELECT {} FROM workflows WHERE id = $1", WORKFLOW_COLUMNS);
        let Some(row) = sqlx::query(&query)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get workflow: {}", e)))?
        else {
            return Ok(None);
        };
        let workflow = row_to_workflow(&row)?;

        let node_rows = sqlx::query(
            "SELECT id, name, description, config, ui_config FROM workflow_nodes \
             WHERE workflow_id = $1 ORDER BY position",
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get nodes: {}", e)))?;

        let edge_rows = sqlx::query(
            "SELECT id, source, target, condition, ui_config FROM workflow_edges \
             WHERE workflow_id = $1 ORDER BY position",
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get edges: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit: {}", e)))?;

        let nodes = node_rows
            .iter()
            .map(row_to_node)
            .collect::<Result<Vec<_>, _>>()?;
        let edges = edge_rows
            .iter()
            .map(row_to_edge)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(WorkflowStructure::new(workflow, nodes, edges)))
    }

    async fn select_workflows_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<WorkflowSummary>, DomainError> {
        let query = format!(
            r#"
            SELECT {},
                (SELECT COUNT(*) FROM workflow_nodes n WHERE n.workflow_id = workflows.id) AS node_count
            FROM workflows
            WHERE owner_id = $1 OR visibility = 'public'
            "#,
            WORKFLOW_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(user_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to list workflows: {}", e)))?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let node_count: i64 = row.get("node_count");
            let workflow = row_to_workflow(&row)?;
            let mut summary =
                WorkflowStructure::new(workflow, Vec::new(), Vec::new()).summary();
            summary.node_count = node_count as usize;
            summaries.push(summary);
        }

        sort_summaries(&mut summaries);
        Ok(summaries)
    }

    async fn insert_structure(
        &self,
        structure: WorkflowStructure,
    ) -> Result<WorkflowStructure, DomainError> {
        let mut tx = self.begin().await?;

        Self::write_workflow(&mut tx, &structure.workflow, true).await?;
        Self::write_graph(&mut tx, &structure).await?;

        tx.commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit: {}", e)))?;

        Ok(structure)
    }

    async fn replace_structure(
        &self,
        structure: WorkflowStructure,
    ) -> Result<WorkflowStructure, DomainError> {
        let mut tx = self.begin().await?;
        let workflow_id = structure.id().as_uuid();

        let locked = sqlx::query("SELECT id FROM workflows WHERE id = $1 FOR UPDATE")
            .bind(workflow_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to lock workflow: {}", e)))?;

        if locked.is_none() {
            return Err(DomainError::not_found(format!(
                "Workflow '{}' not found",
                structure.id()
            )));
        }

        Self::write_workflow(&mut tx, &structure.workflow, false).await?;

        for table in ["workflow_nodes", "workflow_edges"] {
            sqlx::query(&format!("DELETE FROM {} WHERE workflow_id = $1", table))
                .bind(workflow_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| DomainError::storage(format!("Failed to clear {}: {}", table, e)))?;
        }

        Self::write_graph(&mut tx, &structure).await?;

        tx.commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit: {}", e)))?;

        Ok(structure)
    }

    async fn update_workflow(&self, workflow: Workflow) -> Result<Workflow, DomainError> {
        let mut tx = self.begin().await?;

        let updated = Self::write_workflow(&mut tx, &workflow, false).await?;
        if updated == 0 {
            return Err(DomainError::not_found(format!(
                "Workflow '{}' not found",
                workflow.id()
            )));
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit: {}", e)))?;

        Ok(workflow)
    }

    async fn delete_structure(&self, id: &WorkflowId) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to delete workflow: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_cascades_graph_tables() {
        let graph_tables: Vec<&&str> = SCHEMA
            .iter()
            .filter(|s| s.contains("workflow_nodes (") || s.contains("workflow_edges ("))
            .collect();

        assert_eq!(graph_tables.len(), 2);
        assert!(graph_tables
            .iter()
            .all(|s| s.contains("REFERENCES workflows (id) ON DELETE CASCADE")));
    }

    #[test]
    fn test_workflow_columns_match_insert_placeholders() {
        assert_eq!(WORKFLOW_COLUMNS.split(',').count(), 11);
    }
}
