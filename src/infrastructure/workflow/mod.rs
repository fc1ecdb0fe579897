//! Workflow infrastructure implementations

mod engine;
mod handlers;
mod in_memory_repository;
mod loader;
mod postgres_repository;

pub use engine::{EngineConfig, WorkflowEngine, DEFAULT_MAX_DEPTH, DEFAULT_MAX_PARALLEL_NODES};
pub use handlers::{
    builtin_handlers, ConditionHandler, InputHandler, LlmHandler, OutputHandler,
    SubWorkflowHandler, ToolHandler,
};
pub use in_memory_repository::InMemoryWorkflowRepository;
pub use loader::RepositoryWorkflowLoader;
pub use postgres_repository::PostgresWorkflowRepository;
