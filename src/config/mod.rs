//! Layered application configuration

mod app_config;

pub use app_config::{
    AppConfig, AuthConfig, EngineSettings, LogFormat, LoggingConfig, ModelsConfig, ServerConfig,
    StorageBackend, StorageConfig,
};
