//! Tool definitions and schemas

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Definition of a tool exposed to an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    name: String,

    description: String,

    /// JSON Schema for the tool's arguments
    parameters: Value,

    /// Whether calling the tool leaves stored state unchanged
    #[serde(default)]
    read_only: bool,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// OpenAI function-calling format
    pub fn to_openai_function(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_openai_function_format() {
        let definition = ToolDefinition::new("echo", "Echo arguments", json!({"type": "object"}))
            .read_only();

        let function = definition.to_openai_function();
        assert_eq!(function["type"], "function");
        assert_eq!(function["function"]["name"], "echo");
        assert_eq!(function["function"]["parameters"], json!({"type": "object"}));
        assert!(definition.is_read_only());
    }
}
