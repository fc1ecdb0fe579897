//! Graph nodes

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::WorkflowError;
use super::node_types::{NodeConfig, NodeKind};

/// Maximum length for node and edge IDs
pub const MAX_ELEMENT_ID_LENGTH: usize = 64;

static ELEMENT_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("valid element id pattern"));

/// Validate a node or edge identifier
pub fn validate_element_id(id: &str) -> Result<(), WorkflowError> {
    if id.is_empty() {
        return Err(WorkflowError::validation("Element ID cannot be empty"));
    }

    if id.len() > MAX_ELEMENT_ID_LENGTH {
        return Err(WorkflowError::validation(format!(
            "Element ID exceeds maximum length of {} characters",
            MAX_ELEMENT_ID_LENGTH
        )));
    }

    if !ELEMENT_ID_PATTERN.is_match(id) {
        return Err(WorkflowError::validation(format!(
            "Invalid element ID '{}': only alphanumeric characters, '-' and '_' are allowed",
            id
        )));
    }

    Ok(())
}

/// Node identifier, unique within one workflow
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Result<Self, WorkflowError> {
        let id = id.into();
        validate_element_id(&id)?;
        Ok(Self(id))
    }

    /// Fresh random identifier, used when importing templates
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NodeId {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Editor layout attached to nodes and edges
///
/// Opaque to the core: it is stored, exported and imported verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UiConfig(Map<String, Value>);

impl UiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Build from a stored JSON value; non-object values yield an empty config
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

/// A unit of work in the graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    id: NodeId,

    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    /// Kind discriminator and kind-specific configuration
    #[serde(flatten)]
    config: NodeConfig,

    #[serde(default)]
    ui: UiConfig,
}

impl Node {
    pub fn new(id: NodeId, name: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            config,
            ui: UiConfig::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_ui(mut self, ui: UiConfig) -> Self {
        self.ui = ui;
        self
    }

    /// Same node under a different identifier
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn ui(&self) -> &UiConfig {
        &self.ui
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::node_types::{LlmNodeConfig, OutputNodeConfig};
    use serde_json::json;

    #[test]
    fn test_valid_node_ids() {
        assert!(NodeId::new("llm-1").is_ok());
        assert!(NodeId::new("branch_a").is_ok());
        assert!(NodeId::new(uuid::Uuid::new_v4().to_string()).is_ok());
    }

    #[test]
    fn test_invalid_node_ids() {
        assert!(NodeId::new("").is_err());
        assert!(NodeId::new("has space").is_err());
        assert!(NodeId::new("x".repeat(MAX_ELEMENT_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_node_wire_format() {
        let node = Node::new(
            NodeId::new("ask").unwrap(),
            "Ask model",
            NodeConfig::Llm(LlmNodeConfig::new("gpt-4o-mini", "Summarize ${input:text}")),
        )
        .with_ui(UiConfig::new().with("position", json!({"x": 10, "y": 20})));

        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["id"], "ask");
        assert_eq!(json["kind"], "llm");
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["ui"]["position"]["x"], 10);

        let parsed: Node = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, node);
    }

    #[test]
    fn test_node_without_ui_defaults() {
        let node: Node = serde_json::from_value(json!({
            "id": "out",
            "name": "Result",
            "kind": "output"
        }))
        .unwrap();

        assert_eq!(node.kind(), NodeKind::Output);
        assert!(node.ui().is_empty());
        assert_eq!(node.config(), &NodeConfig::Output(OutputNodeConfig::default()));
    }

    #[test]
    fn test_ui_config_from_non_object() {
        assert!(UiConfig::from_value(json!(null)).is_empty());
        assert!(UiConfig::from_value(json!([1, 2])).is_empty());
    }
}
