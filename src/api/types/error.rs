//! API error envelope

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::workflow::ValidationFinding;
use crate::domain::{DomainError, WorkflowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorType {
    InvalidRequestError,
    AuthenticationError,
    NotFoundError,
    ValidationError,
    ServerError,
    ServiceUnavailableError,
}

impl std::fmt::Display for ApiErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequestError => write!(f, "invalid_request_error"),
            Self::AuthenticationError => write!(f, "authentication_error"),
            Self::NotFoundError => write!(f, "not_found_error"),
            Self::ValidationError => write!(f, "validation_error"),
            Self::ServerError => write!(f, "server_error"),
            Self::ServiceUnavailableError => write!(f, "service_unavailable_error"),
        }
    }
}

/// `{ "error": { ... } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: ApiErrorType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub findings: Option<Vec<ValidationFinding>>,
}

/// API error with status code
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ApiErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, error_type: ApiErrorType, message: impl Into<String>) -> Self {
        Self {
            status,
            response: ApiErrorResponse {
                error: ApiErrorDetail {
                    message: message.into(),
                    error_type,
                    code: None,
                    findings: None,
                },
            },
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.response.error.code = Some(code.into());
        self
    }

    pub fn with_findings(mut self, findings: Vec<ValidationFinding>) -> Self {
        self.response.error.findings = Some(findings);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ApiErrorType::InvalidRequestError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ApiErrorType::AuthenticationError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ApiErrorType::NotFoundError, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            ApiErrorType::ValidationError,
            message,
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ApiErrorType::ServerError, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorType::ServiceUnavailableError,
            message,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match &err {
            DomainError::NotFound { message } => Self::not_found(message),
            DomainError::Validation { message } => Self::bad_request(message),
            DomainError::Conflict { message } => {
                Self::new(StatusCode::CONFLICT, ApiErrorType::InvalidRequestError, message)
            }
            DomainError::Provider { provider, message } => {
                Self::unavailable(format!("{}: {}", provider, message))
            }
            DomainError::Configuration { message }
            | DomainError::Internal { message }
            | DomainError::Storage { message } => Self::internal(message),
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let code = err.code();
        let message = err.to_string();

        let api_error = match err {
            WorkflowError::NotFoundOrForbidden(_) => Self::not_found(message),
            WorkflowError::ValidationBlocking(findings) => {
                Self::unprocessable(message).with_findings(findings)
            }
            WorkflowError::ImportFormatUnsupported { .. }
            | WorkflowError::ImportMalformed(_)
            | WorkflowError::Validation(_)
            | WorkflowError::VariableResolution(_) => Self::bad_request(message),
            WorkflowError::CapabilityUnavailable(_) => Self::unavailable(message),
            WorkflowError::BudgetExceeded { .. }
            | WorkflowError::NodeHandlerFailure { .. }
            | WorkflowError::Cancelled
            | WorkflowError::NoTerminalOutput
            | WorkflowError::Storage(_) => Self::internal(message),
        };

        api_error.with_code(code)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.response.error.error_type, self.response.error.message
        )
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::{FindingCode, FindingSubject, Severity};

    #[test]
    fn test_api_error_creation() {
        let err = ApiError::bad_request("Invalid input").with_code("invalid_type");

        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.response.error.error_type, ApiErrorType::InvalidRequestError);
        assert_eq!(err.response.error.code, Some("invalid_type".to_string()));
    }

    #[test]
    fn test_not_found_or_forbidden_is_404() {
        let err: ApiError = WorkflowError::not_found_or_forbidden("wf").into();

        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.response.error.code.as_deref(), Some("not_found_or_forbidden"));
    }

    #[test]
    fn test_blocking_findings_are_422_with_findings() {
        let finding = ValidationFinding {
            severity: Severity::Blocking,
            code: FindingCode::NoEntryNode,
            subject: FindingSubject::Workflow,
            message: "no entry".to_string(),
        };
        let err: ApiError = WorkflowError::ValidationBlocking(vec![finding]).into();

        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        let json = serde_json::to_value(&err.response).unwrap();
        assert_eq!(json["error"]["type"], "validation_error");
        assert_eq!(json["error"]["findings"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_import_errors_are_400() {
        let err: ApiError = WorkflowError::ImportFormatUnsupported {
            found: 9,
            supported: 1,
        }
        .into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: ApiError = WorkflowError::import_malformed("edge to nowhere").into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_domain_error_conversion() {
        let api_err: ApiError = DomainError::storage("disk").into();
        assert_eq!(api_err.status, StatusCode::INTERNAL_SERVER_ERROR);

        let api_err: ApiError = DomainError::conflict("exists").into();
        assert_eq!(api_err.status, StatusCode::CONFLICT);
    }

    #[test]
    fn test_error_serialization_omits_empty_fields() {
        let err = ApiError::unauthorized("Missing token");
        let json = serde_json::to_string(&err.response).unwrap();

        assert!(json.contains("authentication_error"));
        assert!(!json.contains("findings"));
        assert!(!json.contains("code"));
    }
}
