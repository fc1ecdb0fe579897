//! Workflow endpoints

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::middleware::RequireUser;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::workflow::{export_file_name, ValidationMode, ValidationReport};
use crate::domain::{ExecutionResult, Visibility, Workflow, WorkflowId, WorkflowSummary};
use crate::infrastructure::services::{SavedWorkflow, WorkflowDefinition};

#[derive(Debug, Serialize)]
pub struct WorkflowListResponse {
    pub workflows: Vec<WorkflowSummary>,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub visibility: Visibility,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub published: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub mode: ValidationMode,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub input: Value,
}

/// Response from workflow execution
///
/// Runs that stop on a node failure, the visit budget or cancellation are
/// still reported here with `success: false`.
#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution: ExecutionResult,
}

impl From<ExecutionResult> for ExecuteResponse {
    fn from(result: ExecutionResult) -> Self {
        let error = result.clone().into_outputs().err().map(|e| e.to_string());

        Self {
            success: result.is_success(),
            output: result.output(),
            error,
            execution: result,
        }
    }
}

fn parse_id(id: &str) -> Result<WorkflowId, ApiError> {
    WorkflowId::parse(id).map_err(ApiError::from)
}

/// GET /v1/workflows
pub async fn list_workflows(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
) -> Result<Json<WorkflowListResponse>, ApiError> {
    let workflows = state.workflow_service.list(&user_id).await?;

    Ok(Json(WorkflowListResponse { workflows }))
}

/// POST /v1/workflows
pub async fn create_workflow(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    Json(definition): Json<WorkflowDefinition>,
) -> Result<(StatusCode, Json<SavedWorkflow>), ApiError> {
    let saved = state.workflow_service.create(&user_id, definition).await?;

    Ok((StatusCode::CREATED, Json(saved)))
}

/// GET /v1/workflows/{workflow_id}
pub async fn get_workflow(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    Path(workflow_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&workflow_id)?;
    let structure = state.workflow_service.get_structure(&id, &user_id).await?;

    Ok(Json(structure).into_response())
}

/// DELETE /v1/workflows/{workflow_id}
pub async fn delete_workflow(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    Path(workflow_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&workflow_id)?;
    state.workflow_service.delete(&id, &user_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// PUT /v1/workflows/{workflow_id}/structure
pub async fn update_structure(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    Path(workflow_id): Path<String>,
    Json(definition): Json<WorkflowDefinition>,
) -> Result<Json<SavedWorkflow>, ApiError> {
    let id = parse_id(&workflow_id)?;
    let saved = state
        .workflow_service
        .update_structure(&id, &user_id, definition)
        .await?;

    Ok(Json(saved))
}

/// PUT /v1/workflows/{workflow_id}/visibility
pub async fn set_visibility(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    Path(workflow_id): Path<String>,
    Json(request): Json<VisibilityRequest>,
) -> Result<Json<Workflow>, ApiError> {
    let id = parse_id(&workflow_id)?;
    let workflow = state
        .workflow_service
        .set_visibility(&id, &user_id, request.visibility)
        .await?;

    Ok(Json(workflow))
}

/// PUT /v1/workflows/{workflow_id}/publish
pub async fn publish_workflow(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    Path(workflow_id): Path<String>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<Workflow>, ApiError> {
    let id = parse_id(&workflow_id)?;
    let workflow = state
        .workflow_service
        .publish(&id, &user_id, request.published)
        .await?;

    Ok(Json(workflow))
}

/// POST /v1/workflows/{workflow_id}/validate
pub async fn validate_workflow(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    Path(workflow_id): Path<String>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidationReport>, ApiError> {
    let id = parse_id(&workflow_id)?;
    let report = state
        .workflow_service
        .validate(&id, &user_id, request.mode)
        .await?;

    Ok(Json(report))
}

/// POST /v1/workflows/{workflow_id}/execute
pub async fn execute_workflow(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    Path(workflow_id): Path<String>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let id = parse_id(&workflow_id)?;

    debug!(workflow_id = %id, user_id = %user_id, "Executing workflow");

    // A dropped request cancels the run
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let result = state
        .workflow_service
        .execute(&id, &user_id, request.input, cancel)
        .await?;

    Ok(Json(ExecuteResponse::from(result)))
}

/// GET /v1/workflows/{workflow_id}/export
pub async fn export_workflow(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    Path(workflow_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&workflow_id)?;
    let template = state.workflow_service.export(&id, &user_id).await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_file_name(&template.workflow.name)
    );
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| ApiError::internal(format!("Invalid export file name: {}", e)))?;

    Ok(([(header::CONTENT_DISPOSITION, disposition)], Json(template)).into_response())
}

/// POST /v1/workflows/import
pub async fn import_workflow(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    Json(document): Json<Value>,
) -> Result<(StatusCode, Json<SavedWorkflow>), ApiError> {
    let saved = state.workflow_service.import(&user_id, document).await?;

    Ok((StatusCode::CREATED, Json(saved)))
}

#[cfg(test)]
mod tests {
    use crate::api::router::create_router;
    use crate::api::state::{test_support, AppState};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestApp {
        state: AppState,
        router: Router,
    }

    impl TestApp {
        fn new() -> Self {
            let state = test_support::state();
            let router = create_router(state.clone());
            Self { state, router }
        }

        async fn send(
            &self,
            method: &str,
            uri: &str,
            user: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, axum::http::HeaderMap, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(user) = user {
                builder = builder.header(
                    header::AUTHORIZATION,
                    test_support::bearer(&self.state, user),
                );
            }
            let body = match body {
                Some(body) => {
                    builder = builder.header(header::CONTENT_TYPE, "application/json");
                    Body::from(body.to_string())
                }
                None => Body::empty(),
            };

            let response = self
                .router
                .clone()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap();

            let status = response.status();
            let headers = response.headers().clone();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };

            (status, headers, json)
        }

        async fn create_echo(&self, user: &str) -> String {
            let (status, _, body) = self
                .send("POST", "/v1/workflows", Some(user), Some(echo_workflow()))
                .await;
            assert_eq!(status, StatusCode::CREATED);
            body["structure"]["workflow"]["id"].as_str().unwrap().to_string()
        }
    }

    fn echo_workflow() -> Value {
        json!({
            "name": "Echo",
            "nodes": [
                { "id": "start", "name": "Start", "kind": "input" },
                { "id": "end", "name": "End", "kind": "output", "value": "${input:text}" }
            ],
            "edges": [
                { "id": "e1", "source": "start", "target": "end" }
            ]
        })
    }

    #[tokio::test]
    async fn test_requires_token() {
        let app = TestApp::new();

        let (status, _, body) = app.send("GET", "/v1/workflows", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["type"], "authentication_error");
    }

    #[tokio::test]
    async fn test_rejects_invalid_token() {
        let app = TestApp::new();

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/v1/workflows")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_list_and_get() {
        let app = TestApp::new();
        let id = app.create_echo("alice").await;

        let (status, _, body) = app.send("GET", "/v1/workflows", Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["workflows"].as_array().unwrap().len(), 1);
        assert_eq!(body["workflows"][0]["node_count"], 2);

        let (status, _, body) = app
            .send("GET", &format!("/v1/workflows/{}", id), Some("alice"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["workflow"]["owner_id"], "alice");
        assert_eq!(body["nodes"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_private_workflow_is_404_for_others() {
        let app = TestApp::new();
        let id = app.create_echo("alice").await;

        let (status, _, body) = app
            .send("GET", &format!("/v1/workflows/{}", id), Some("bob"), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found_or_forbidden");

        let (status, _, _) = app
            .send("DELETE", &format!("/v1/workflows/{}", id), Some("bob"), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_public_workflow_readable_but_not_editable() {
        let app = TestApp::new();
        let id = app.create_echo("alice").await;

        let (status, _, body) = app
            .send(
                "PUT",
                &format!("/v1/workflows/{}/visibility", id),
                Some("alice"),
                Some(json!({ "visibility": "public" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["visibility"], "public");

        let (status, _, _) = app
            .send("GET", &format!("/v1/workflows/{}", id), Some("bob"), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = app
            .send(
                "PUT",
                &format!("/v1/workflows/{}/structure", id),
                Some("bob"),
                Some(echo_workflow()),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_structural_errors_are_422_with_findings() {
        let app = TestApp::new();

        let (status, _, body) = app
            .send(
                "POST",
                "/v1/workflows",
                Some("alice"),
                Some(json!({
                    "name": "Broken",
                    "nodes": [{ "id": "start", "name": "Start", "kind": "input" }],
                    "edges": [{ "id": "e1", "source": "start", "target": "ghost" }]
                })),
            )
            .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "validation_blocking");
        assert_eq!(body["error"]["findings"][0]["code"], "dangling_edge");
    }

    #[tokio::test]
    async fn test_update_structure_bumps_version() {
        let app = TestApp::new();
        let id = app.create_echo("alice").await;

        let (status, _, body) = app
            .send(
                "PUT",
                &format!("/v1/workflows/{}/structure", id),
                Some("alice"),
                Some(echo_workflow()),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["structure"]["workflow"]["version"], 2);
    }

    #[tokio::test]
    async fn test_execute_returns_output() {
        let app = TestApp::new();
        let id = app.create_echo("alice").await;

        let (status, _, body) = app
            .send(
                "POST",
                &format!("/v1/workflows/{}/execute", id),
                Some("alice"),
                Some(json!({ "input": { "text": "hello" } })),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["output"], "hello");
        assert_eq!(body["execution"]["outcome"]["status"], "completed");
    }

    #[tokio::test]
    async fn test_execute_failure_is_reported_in_payload() {
        let app = TestApp::new();

        // No model client is configured in the test state
        let (status, _, body) = app
            .send(
                "POST",
                "/v1/workflows",
                Some("alice"),
                Some(json!({
                    "name": "Ask",
                    "nodes": [
                        { "id": "start", "name": "Start", "kind": "input" },
                        { "id": "ask", "name": "Ask", "kind": "llm", "model": "gpt", "prompt": "${input:q}" },
                        { "id": "end", "name": "End", "kind": "output" }
                    ],
                    "edges": [
                        { "id": "e1", "source": "start", "target": "ask" },
                        { "id": "e2", "source": "ask", "target": "end" }
                    ]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["structure"]["workflow"]["id"].as_str().unwrap().to_string();

        let (status, _, body) = app
            .send(
                "POST",
                &format!("/v1/workflows/{}/execute", id),
                Some("alice"),
                Some(json!({ "input": { "q": "hi" } })),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["execution"]["outcome"]["status"], "node_failed");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_validate_uses_requested_mode() {
        let app = TestApp::new();

        let (_, _, body) = app
            .send(
                "POST",
                "/v1/workflows",
                Some("alice"),
                Some(json!({ "name": "Draft" })),
            )
            .await;
        let id = body["structure"]["workflow"]["id"].as_str().unwrap().to_string();

        let (status, _, body) = app
            .send(
                "POST",
                &format!("/v1/workflows/{}/validate", id),
                Some("alice"),
                Some(json!({})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let storage_blocking = body["findings"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|f| f["severity"] == "blocking")
            .count();
        assert_eq!(storage_blocking, 0);

        let (_, _, body) = app
            .send(
                "POST",
                &format!("/v1/workflows/{}/validate", id),
                Some("alice"),
                Some(json!({ "mode": "execution" })),
            )
            .await;
        assert!(body["findings"]
            .as_array()
            .unwrap()
            .iter()
            .any(|f| f["severity"] == "blocking"));
    }

    #[tokio::test]
    async fn test_publish_draft_is_refused() {
        let app = TestApp::new();

        let (_, _, body) = app
            .send("POST", "/v1/workflows", Some("alice"), Some(json!({ "name": "Draft" })))
            .await;
        let id = body["structure"]["workflow"]["id"].as_str().unwrap().to_string();

        let (status, _, _) = app
            .send(
                "PUT",
                &format!("/v1/workflows/{}/publish", id),
                Some("alice"),
                Some(json!({ "published": true })),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_export_and_import() {
        let app = TestApp::new();
        let id = app.create_echo("alice").await;

        let (status, headers, template) = app
            .send("GET", &format!("/v1/workflows/{}/export", id), Some("alice"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\""));
        assert!(disposition.ends_with(".json\""));

        let (status, _, body) = app
            .send("POST", "/v1/workflows/import", Some("bob"), Some(template))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["structure"]["workflow"]["owner_id"], "bob");
        assert_ne!(body["structure"]["workflow"]["id"], id.as_str());
    }

    #[tokio::test]
    async fn test_import_garbage_is_400() {
        let app = TestApp::new();

        let (status, _, _) = app
            .send(
                "POST",
                "/v1/workflows/import",
                Some("alice"),
                Some(json!({ "hello": "world" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_then_get_is_404() {
        let app = TestApp::new();
        let id = app.create_echo("alice").await;

        let (status, _, _) = app
            .send("DELETE", &format!("/v1/workflows/{}", id), Some("alice"), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _, _) = app
            .send("GET", &format!("/v1/workflows/{}", id), Some("alice"), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_id_is_400() {
        let app = TestApp::new();

        let (status, _, _) = app
            .send("GET", "/v1/workflows/not-a-uuid", Some("alice"), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
