//! v1 API endpoints

pub mod tools;
pub mod workflows;

use axum::{
    routing::{get, post, put},
    Router,
};

use super::state::AppState;

/// Create v1 API router
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route(
            "/workflows",
            get(workflows::list_workflows).post(workflows::create_workflow),
        )
        .route("/workflows/import", post(workflows::import_workflow))
        .route(
            "/workflows/{workflow_id}",
            get(workflows::get_workflow).delete(workflows::delete_workflow),
        )
        .route(
            "/workflows/{workflow_id}/structure",
            put(workflows::update_structure),
        )
        .route(
            "/workflows/{workflow_id}/visibility",
            put(workflows::set_visibility),
        )
        .route(
            "/workflows/{workflow_id}/publish",
            put(workflows::publish_workflow),
        )
        .route(
            "/workflows/{workflow_id}/validate",
            post(workflows::validate_workflow),
        )
        .route(
            "/workflows/{workflow_id}/execute",
            post(workflows::execute_workflow),
        )
        .route(
            "/workflows/{workflow_id}/export",
            get(workflows::export_workflow),
        )
        .route("/tools", get(tools::list_tools))
        .route("/tools/{name}", post(tools::call_tool))
}
