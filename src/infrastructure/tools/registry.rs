//! Registry of tools callable from workflow tool nodes

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use tracing::debug;

use super::definition::ToolDefinition;
use crate::domain::workflow::ToolInvoker;
use crate::domain::DomainError;

/// Handler function for tool execution
pub type ToolFn =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, DomainError>> + Send + Sync>;

struct RegisteredTool {
    definition: ToolDefinition,
    handler: ToolFn,
}

/// Named async closures, registered once at start-up
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the general-purpose tools every deployment gets
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register_fn(
            ToolDefinition::new(
                "echo",
                "Return the arguments unchanged",
                json!({ "type": "object" }),
            )
            .read_only(),
            |arguments| async move { Ok(arguments) },
        );

        registry.register_fn(
            ToolDefinition::new(
                "current_time",
                "Current UTC time as RFC 3339 and Unix seconds",
                json!({ "type": "object", "properties": {} }),
            )
            .read_only(),
            |_| async move {
                let now = Utc::now();
                Ok(json!({
                    "iso": now.to_rfc3339(),
                    "unix": now.timestamp(),
                }))
            },
        );

        registry
    }

    /// Register a tool; a later registration with the same name replaces it
    pub fn register(&mut self, definition: ToolDefinition, handler: ToolFn) {
        self.tools.insert(
            definition.name().to_string(),
            RegisteredTool {
                definition,
                handler,
            },
        );
    }

    pub fn register_fn<F, Fut>(&mut self, definition: ToolDefinition, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, DomainError>> + Send + 'static,
    {
        self.register(definition, Arc::new(move |arguments| handler(arguments).boxed()));
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl ToolInvoker for ToolRegistry {
    async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, DomainError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| DomainError::not_found(format!("Tool '{}' is not registered", name)))?;

        debug!(tool = name, "Invoking tool");
        (tool.handler)(arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builtins() {
        let registry = ToolRegistry::with_builtins();

        assert!(registry.has_tool("echo"));
        assert!(registry.has_tool("current_time"));

        let echoed = registry.invoke("echo", json!({"a": 1})).await.unwrap();
        assert_eq!(echoed, json!({"a": 1}));

        let now = registry.invoke("current_time", json!({})).await.unwrap();
        assert!(now["unix"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_register_closure() {
        let mut registry = ToolRegistry::new();
        registry.register_fn(
            ToolDefinition::new("double", "Double a number", json!({"type": "object"})),
            |arguments| async move {
                let n = arguments["n"]
                    .as_i64()
                    .ok_or_else(|| DomainError::validation("n must be an integer"))?;
                Ok(json!(n * 2))
            },
        );

        assert_eq!(registry.invoke("double", json!({"n": 21})).await.unwrap(), json!(42));
        assert!(matches!(
            registry.invoke("double", json!({})).await,
            Err(DomainError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();

        let result = registry.invoke("missing", json!({})).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_definitions_are_sorted() {
        let names: Vec<String> = ToolRegistry::with_builtins()
            .definitions()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["current_time", "echo"]);
    }
}
