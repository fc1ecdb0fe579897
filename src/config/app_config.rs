use serde::Deserialize;

use crate::domain::workflow::DEFAULT_VISIT_BUDGET;
use crate::infrastructure::storage::PostgresConfig;
use crate::infrastructure::workflow::{EngineConfig, DEFAULT_MAX_DEPTH, DEFAULT_MAX_PARALLEL_NODES};

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub engine: EngineSettings,
    pub auth: AuthConfig,
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

/// Execution limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub visit_budget: u32,
    pub max_parallel_nodes: usize,
    pub max_depth: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret; a random one is generated at start-up when unset
    pub jwt_secret: Option<String>,
    pub token_expiration_hours: u64,
}

/// OpenAI-compatible endpoint backing LLM nodes
///
/// Without a `base_url` or `api_key` no model client is configured and LLM
/// nodes fail when run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_url: None,
            max_connections: 10,
        }
    }
}

impl StorageConfig {
    pub fn postgres(&self) -> PostgresConfig {
        let config = match self.database_url {
            Some(ref url) => PostgresConfig::new(url.clone()),
            None => PostgresConfig::default(),
        };
        config.with_max_connections(self.max_connections)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            visit_budget: DEFAULT_VISIT_BUDGET,
            max_parallel_nodes: DEFAULT_MAX_PARALLEL_NODES,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl From<&EngineSettings> for EngineConfig {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            visit_budget: settings.visit_budget,
            max_parallel_nodes: settings.max_parallel_nodes,
            max_depth: settings.max_depth,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_expiration_hours: 24,
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: 120,
        }
    }
}

impl ModelsConfig {
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some() || self.api_key.is_some()
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
