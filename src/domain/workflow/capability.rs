//! Capabilities consumed by node handlers
//!
//! Model calls, tool calls and nested workflow loading are injected into the
//! engine explicitly. Handlers never reach for ambient services.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::{WorkflowId, WorkflowStructure};
use super::error::WorkflowError;
use crate::domain::user::UserId;
use crate::domain::DomainError;

/// A single-turn model completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: None,
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ModelUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub model: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ModelUsage>,
}

/// Chat model backend used by LLM nodes
#[async_trait]
pub trait ModelClient: Send + Sync + std::fmt::Debug {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, DomainError>;
}

/// Named tool backend used by tool nodes
#[async_trait]
pub trait ToolInvoker: Send + Sync + std::fmt::Debug {
    async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, DomainError>;
}

/// Loads the structure of a workflow referenced by a sub-workflow node
///
/// Implementations must apply the read-access rule for `user_id`.
#[async_trait]
pub trait WorkflowLoader: Send + Sync + std::fmt::Debug {
    async fn load_for_execution(
        &self,
        id: &WorkflowId,
        user_id: &UserId,
    ) -> Result<WorkflowStructure, WorkflowError>;
}

/// The capability set handed to the built-in handlers
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub model: Option<Arc<dyn ModelClient>>,
    pub tools: Option<Arc<dyn ToolInvoker>>,
    pub workflows: Option<Arc<dyn WorkflowLoader>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: Arc<dyn ModelClient>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolInvoker>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_workflows(mut self, workflows: Arc<dyn WorkflowLoader>) -> Self {
        self.workflows = Some(workflows);
        self
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Model client answering with a fixed reply, or echoing the prompt
    #[derive(Debug, Default)]
    pub struct MockModelClient {
        reply: Option<String>,
        error: Option<String>,
        requests: Mutex<Vec<ModelRequest>>,
    }

    impl MockModelClient {
        pub fn echo() -> Self {
            Self::default()
        }

        pub fn replying(reply: impl Into<String>) -> Self {
            Self {
                reply: Some(reply.into()),
                ..Default::default()
            }
        }

        pub fn failing(error: impl Into<String>) -> Self {
            Self {
                error: Some(error.into()),
                ..Default::default()
            }
        }

        pub fn requests(&self) -> Vec<ModelRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelClient for MockModelClient {
        async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, DomainError> {
            self.requests.lock().unwrap().push(request.clone());

            if let Some(ref error) = self.error {
                return Err(DomainError::provider("mock", error.clone()));
            }

            Ok(ModelResponse {
                model: request.model.clone(),
                content: self.reply.clone().unwrap_or(request.prompt),
                usage: None,
            })
        }
    }

    /// Tool invoker with canned results per tool name
    #[derive(Debug, Default)]
    pub struct MockToolInvoker {
        results: HashMap<String, Value>,
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl MockToolInvoker {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_result(mut self, name: impl Into<String>, result: Value) -> Self {
            self.results.insert(name.into(), result);
            self
        }

        pub fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToolInvoker for MockToolInvoker {
        async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, DomainError> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments));

            self.results
                .get(name)
                .cloned()
                .ok_or_else(|| DomainError::not_found(format!("Tool '{}' not found", name)))
        }
    }
}
