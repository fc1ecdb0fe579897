//! PMP Chat Workflows
//!
//! Graph workflows for chat assistants:
//! - typed nodes (input, output, LLM, condition, tool, sub-workflow)
//! - structural validation with storage and execution rule sets
//! - a concurrent engine with branch skipping and a visit budget
//! - owner/public access control and portable JSON templates
//! - an agent-facing tool surface over the same operations

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use api::state::AppState;
use config::StorageBackend;
use domain::workflow::{Capabilities, ModelClient, WorkflowStructureRepository};
use infrastructure::{
    auth::{JwtConfig, JwtService},
    llm::{HttpClient, OpenAiCompatibleClient, DEFAULT_OPENAI_BASE_URL},
    services::WorkflowService,
    tools::ToolRegistry,
    workflow::{
        EngineConfig, InMemoryWorkflowRepository, PostgresWorkflowRepository,
        RepositoryWorkflowLoader, WorkflowEngine,
    },
};

/// Build the application state from configuration
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let repository = create_repository(config).await?;

    let mut capabilities = Capabilities::new()
        .with_tools(Arc::new(ToolRegistry::with_builtins()))
        .with_workflows(Arc::new(RepositoryWorkflowLoader::new(repository.clone())));
    if let Some(model) = create_model_client(config)? {
        capabilities = capabilities.with_model(model);
    }

    let engine_config = EngineConfig::from(&config.engine);
    info!(
        visit_budget = engine_config.visit_budget,
        max_parallel_nodes = engine_config.max_parallel_nodes,
        max_depth = engine_config.max_depth,
        "Workflow engine configured"
    );
    let engine = Arc::new(WorkflowEngine::with_config(capabilities, engine_config));

    let workflow_service = Arc::new(WorkflowService::new(repository, engine));

    Ok(AppState::new(workflow_service, Arc::new(create_jwt_service(config))))
}

async fn create_repository(
    config: &AppConfig,
) -> anyhow::Result<Arc<dyn WorkflowStructureRepository>> {
    info!("Storage backend: {:?}", config.storage.backend);

    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryWorkflowRepository::new())),
        StorageBackend::Postgres => {
            info!("Connecting to PostgreSQL...");
            let repository = PostgresWorkflowRepository::connect(&config.storage.postgres())
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to PostgreSQL: {}", e))?;
            info!("PostgreSQL connection established");

            Ok(Arc::new(repository))
        }
    }
}

fn create_model_client(config: &AppConfig) -> anyhow::Result<Option<Arc<dyn ModelClient>>> {
    let models = &config.models;
    if !models.is_configured() {
        warn!("No model endpoint configured; LLM nodes will fail");
        return Ok(None);
    }

    let http = HttpClient::with_timeout(Duration::from_secs(models.timeout_secs))?;
    let base_url = models
        .base_url
        .clone()
        .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());

    info!(base_url = %base_url, "Model client configured");

    Ok(Some(Arc::new(OpenAiCompatibleClient::with_base_url(
        http,
        models.api_key.clone(),
        base_url,
    ))))
}

fn create_jwt_service(config: &AppConfig) -> JwtService {
    let secret = match config.auth.jwt_secret {
        Some(ref secret) => secret.clone(),
        None => {
            warn!("auth.jwt_secret is not set; generated a random secret, tokens will not survive a restart");
            format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
        }
    };

    JwtService::new(JwtConfig::new(secret, config.auth.token_expiration_hours))
}
