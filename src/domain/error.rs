use thiserror::Error;

/// Errors raised below the workflow layer
///
/// Repositories, the model client, tool invocations and token handling report
/// failures with these. The workflow service lifts them into `WorkflowError`.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    /// A write lost a race, e.g. a duplicate id on insert
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// The model endpoint or another upstream service failed
    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_names_the_provider() {
        let error = DomainError::provider("openai-compatible", "HTTP 502");
        assert_eq!(error.to_string(), "Provider error: openai-compatible - HTTP 502");
    }

    #[test]
    fn test_storage_error_message() {
        let error = DomainError::storage("connection refused");
        assert!(matches!(error, DomainError::Storage { .. }));
        assert_eq!(error.to_string(), "Storage error: connection refused");
    }
}
