//! PostgreSQL connection pool

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::debug;

use crate::domain::DomainError;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/pmp_chat_workflows";

/// Pool settings for the workflow tables
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    /// How long a repository call waits for a free connection
    pub acquire_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATABASE_URL)
    }
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }
}

pub async fn connect_pool(config: &PostgresConfig) -> Result<PgPool, DomainError> {
    debug!(max_connections = config.max_connections, "Opening PostgreSQL pool");

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.url)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to connect to PostgreSQL: {}", e)))
}
