//! Workflow management tools for the chat agent runtime
//!
//! Every call goes through [`WorkflowService`], so the same access rules apply
//! as on the HTTP surface. Failures come back as [`ToolResponse::Failure`]
//! with a stable code the agent can branch on.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::definition::ToolDefinition;
use crate::domain::workflow::ValidationFinding;
use crate::domain::{UserId, WorkflowError, WorkflowId};
use crate::infrastructure::services::{WorkflowDefinition, WorkflowService};

pub const LIST_WORKFLOWS: &str = "list-workflows";
pub const GET_WORKFLOW_STRUCTURE: &str = "get-workflow-structure";
pub const CREATE_WORKFLOW: &str = "create-workflow";
pub const UPDATE_WORKFLOW_STRUCTURE: &str = "update-workflow-structure";
pub const DELETE_WORKFLOW: &str = "delete-workflow";
pub const EXECUTE_WORKFLOW: &str = "execute-workflow";

/// Structured error handed back to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings: Option<Vec<ValidationFinding>>,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            findings: None,
        }
    }
}

impl From<WorkflowError> for ToolError {
    fn from(err: WorkflowError) -> Self {
        let mut error = Self::new(err.code(), err.to_string());
        if let WorkflowError::ValidationBlocking(findings) = err {
            error.findings = Some(findings);
        }
        error
    }
}

/// Outcome of a tool call; never a raw error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResponse {
    Success { data: Value },
    Failure { error: ToolError },
}

impl ToolResponse {
    pub fn success(data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self::Success { data },
            Err(e) => Self::failure(ToolError::new("serialization_error", e.to_string())),
        }
    }

    pub fn failure(error: ToolError) -> Self {
        Self::Failure { error }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Debug, Deserialize)]
struct WorkflowRef {
    workflow_id: WorkflowId,
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    workflow_id: WorkflowId,
    #[serde(flatten)]
    definition: WorkflowDefinition,
}

#[derive(Debug, Deserialize)]
struct ExecuteArgs {
    workflow_id: WorkflowId,
    #[serde(default)]
    input: Value,
}

/// The workflow tool set
#[derive(Debug, Clone)]
pub struct WorkflowTools {
    service: Arc<WorkflowService>,
}

impl WorkflowTools {
    pub fn new(service: Arc<WorkflowService>) -> Self {
        Self { service }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let workflow_id = json!({
            "type": "string",
            "format": "uuid",
            "description": "Identifier of the workflow"
        });
        let graph = graph_schema();

        vec![
            ToolDefinition::new(
                LIST_WORKFLOWS,
                "List the workflows you own and the public workflows of others",
                json!({ "type": "object", "properties": {} }),
            )
            .read_only(),
            ToolDefinition::new(
                GET_WORKFLOW_STRUCTURE,
                "Get a workflow's metadata, nodes and edges",
                json!({
                    "type": "object",
                    "properties": { "workflow_id": workflow_id },
                    "required": ["workflow_id"]
                }),
            )
            .read_only(),
            ToolDefinition::new(
                CREATE_WORKFLOW,
                "Create a new private workflow from a node and edge definition",
                with_required(graph.clone(), &["name"]),
            ),
            ToolDefinition::new(
                UPDATE_WORKFLOW_STRUCTURE,
                "Replace the nodes and edges of a workflow you own",
                with_workflow_id(graph, workflow_id.clone()),
            ),
            ToolDefinition::new(
                DELETE_WORKFLOW,
                "Delete a workflow you own together with its nodes and edges",
                json!({
                    "type": "object",
                    "properties": { "workflow_id": workflow_id },
                    "required": ["workflow_id"]
                }),
            ),
            ToolDefinition::new(
                EXECUTE_WORKFLOW,
                "Run a workflow with the given input and return its outputs",
                json!({
                    "type": "object",
                    "properties": {
                        "workflow_id": workflow_id,
                        "input": {
                            "type": "object",
                            "description": "Trigger payload passed to the input nodes"
                        }
                    },
                    "required": ["workflow_id"]
                }),
            ),
        ]
    }

    /// Dispatch a tool call on behalf of `user_id`
    ///
    /// `cancel` aborts an `execute-workflow` run, which then reports the
    /// `cancelled` outcome.
    pub async fn call(
        &self,
        name: &str,
        user_id: &UserId,
        arguments: Value,
        cancel: CancellationToken,
    ) -> ToolResponse {
        debug!(tool = name, user_id = %user_id, "Workflow tool called");

        let response = match name {
            LIST_WORKFLOWS => self.service.list(user_id).await.map(ToolResponse::success),
            GET_WORKFLOW_STRUCTURE => match parse::<WorkflowRef>(arguments) {
                Ok(args) => self
                    .service
                    .get_structure(&args.workflow_id, user_id)
                    .await
                    .map(ToolResponse::success),
                Err(response) => return response,
            },
            CREATE_WORKFLOW => match parse::<WorkflowDefinition>(arguments) {
                Ok(definition) => self
                    .service
                    .create(user_id, definition)
                    .await
                    .map(ToolResponse::success),
                Err(response) => return response,
            },
            UPDATE_WORKFLOW_STRUCTURE => match parse::<UpdateArgs>(arguments) {
                Ok(args) => self
                    .service
                    .update_structure(&args.workflow_id, user_id, args.definition)
                    .await
                    .map(ToolResponse::success),
                Err(response) => return response,
            },
            DELETE_WORKFLOW => match parse::<WorkflowRef>(arguments) {
                Ok(args) => self
                    .service
                    .delete(&args.workflow_id, user_id)
                    .await
                    .map(|_| ToolResponse::success(json!({ "deleted": args.workflow_id }))),
                Err(response) => return response,
            },
            EXECUTE_WORKFLOW => match parse::<ExecuteArgs>(arguments) {
                Ok(args) => self
                    .service
                    .execute(&args.workflow_id, user_id, args.input, cancel)
                    .await
                    .map(|result| {
                        ToolResponse::success(json!({
                            "success": result.is_success(),
                            "output": result.output(),
                            "execution": result,
                        }))
                    }),
                Err(response) => return response,
            },
            other => {
                return ToolResponse::failure(ToolError::new(
                    "unknown_tool",
                    format!("Unknown tool '{}'", other),
                ))
            }
        };

        response.unwrap_or_else(|err| {
            info!(tool = name, code = err.code(), "Workflow tool failed");
            ToolResponse::failure(err.into())
        })
    }
}

fn parse<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolResponse> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };

    serde_json::from_value(arguments).map_err(|e| {
        ToolResponse::failure(ToolError::new(
            "invalid_arguments",
            format!("Invalid arguments: {}", e),
        ))
    })
}

fn graph_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "maxLength": 100 },
            "description": { "type": "string" },
            "icon": {
                "type": "object",
                "properties": {
                    "value": { "type": "string" },
                    "background": { "type": "string" }
                },
                "required": ["value"]
            },
            "tags": { "type": "array", "items": { "type": "string" } },
            "nodes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "name": { "type": "string" },
                        "kind": {
                            "type": "string",
                            "enum": ["input", "output", "llm", "condition", "tool", "sub_workflow"]
                        },
                        "ui": { "type": "object" }
                    },
                    "required": ["id", "name", "kind"]
                }
            },
            "edges": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "source": { "type": "string" },
                        "target": { "type": "string" },
                        "condition": {
                            "type": "string",
                            "description": "Branch tag; the edge is followed only for that branch"
                        }
                    },
                    "required": ["id", "source", "target"]
                }
            }
        }
    })
}

fn with_required(mut schema: Value, required: &[&str]) -> Value {
    schema["required"] = json!(required);
    schema
}

fn with_workflow_id(mut schema: Value, workflow_id: Value) -> Value {
    schema["properties"]["workflow_id"] = workflow_id;
    with_required(schema, &["workflow_id"])
}
