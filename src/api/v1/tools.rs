//! Agent-facing workflow tools over HTTP

use axum::extract::{Path, State};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::api::middleware::RequireUser;
use crate::api::state::AppState;
use crate::api::types::Json;
use crate::infrastructure::tools::{ToolDefinition, ToolResponse};

#[derive(Debug, Serialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDefinition>,
}

/// GET /v1/tools
pub async fn list_tools(
    State(state): State<AppState>,
    RequireUser(_): RequireUser,
) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: state.workflow_tools.definitions(),
    })
}

/// POST /v1/tools/{name}
///
/// Tool failures are part of the response body, so this always answers 200
/// once the caller is authenticated.
pub async fn call_tool(
    State(state): State<AppState>,
    RequireUser(user_id): RequireUser,
    Path(name): Path<String>,
    Json(arguments): Json<Value>,
) -> Json<ToolResponse> {
    // A dropped request cancels a running `execute-workflow`
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    Json(
        state
            .workflow_tools
            .call(&name, &user_id, arguments, cancel)
            .await,
    )
}

#[cfg(test)]
mod tests {
    use crate::api::router::create_router;
    use crate::api::state::test_support;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let state = test_support::state();
        let router = create_router(state.clone());

        let builder = Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, test_support::bearer(&state, "alice"));
        let request = match body {
            Some(body) => builder
                .method("POST")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.method("GET").body(Body::empty()).unwrap(),
        };

        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_list_tools() {
        let (status, body) = call("/v1/tools", None).await;

        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"list-workflows"));
        assert!(names.contains(&"execute-workflow"));
    }

    #[tokio::test]
    async fn test_call_create_workflow() {
        let (status, body) = call(
            "/v1/tools/create-workflow",
            Some(json!({
                "name": "From agent",
                "nodes": [{ "id": "start", "name": "Start", "kind": "input" }]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_structured_failure() {
        let (status, body) = call("/v1/tools/format-disk", Some(json!({}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "failure");
        assert_eq!(body["error"]["code"], "unknown_tool");
    }
}
