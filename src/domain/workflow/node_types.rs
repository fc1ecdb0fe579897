//! Node kinds and their configuration
//!
//! Configuration fields a kind cannot run without are optional in the data
//! model so that half-finished drafts can be stored. [`NodeConfig::missing_fields`]
//! reports what is still required.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::WorkflowId;

/// Branch tag taken by a condition node when no branch matches
pub const DEFAULT_BRANCH_TAG: &str = "else";

/// Discriminator of a node's behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Input,
    Output,
    Llm,
    Condition,
    Tool,
    SubWorkflow,
}

impl NodeKind {
    pub const ALL: [NodeKind; 6] = [
        NodeKind::Input,
        NodeKind::Output,
        NodeKind::Llm,
        NodeKind::Condition,
        NodeKind::Tool,
        NodeKind::SubWorkflow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Llm => "llm",
            Self::Condition => "condition",
            Self::Tool => "tool",
            Self::SubWorkflow => "sub_workflow",
        }
    }

    /// Whether nodes of this kind produce a branch discriminant
    pub fn is_branching(&self) -> bool {
        matches!(self, Self::Condition)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific node configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeConfig {
    Input(InputNodeConfig),
    Output(OutputNodeConfig),
    Llm(LlmNodeConfig),
    Condition(ConditionNodeConfig),
    Tool(ToolNodeConfig),
    SubWorkflow(SubWorkflowNodeConfig),
}

impl NodeConfig {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Input(_) => NodeKind::Input,
            Self::Output(_) => NodeKind::Output,
            Self::Llm(_) => NodeKind::Llm,
            Self::Condition(_) => NodeKind::Condition,
            Self::Tool(_) => NodeKind::Tool,
            Self::SubWorkflow(_) => NodeKind::SubWorkflow,
        }
    }

    /// Required configuration that is absent or empty
    pub fn missing_fields(&self) -> Vec<String> {
        match self {
            Self::Input(config) => config
                .fields
                .iter()
                .enumerate()
                .filter(|(_, f)| f.name.trim().is_empty())
                .map(|(i, _)| format!("fields[{}].name", i))
                .collect(),
            Self::Output(_) => Vec::new(),
            Self::Llm(config) => {
                let mut missing = Vec::new();
                if is_blank(config.model.as_deref()) {
                    missing.push("model".to_string());
                }
                if is_blank(config.prompt.as_deref()) {
                    missing.push("prompt".to_string());
                }
                missing
            }
            Self::Condition(config) => config.missing_fields(),
            Self::Tool(config) => {
                if is_blank(config.tool_name.as_deref()) {
                    vec!["tool_name".to_string()]
                } else {
                    Vec::new()
                }
            }
            Self::SubWorkflow(config) => {
                if config.workflow_id.is_none() {
                    vec!["workflow_id".to_string()]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// A field accepted by an input node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputField {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl InputField {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            required: false,
            default: Some(default),
        }
    }
}

/// Entry point receiving the trigger payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InputNodeConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<InputField>,
}

impl InputNodeConfig {
    pub fn with_field(mut self, field: InputField) -> Self {
        self.fields.push(field);
        self
    }
}

/// Terminal node; its value becomes part of the workflow result
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutputNodeConfig {
    /// JSON template; when absent the inbound values are passed through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl OutputNodeConfig {
    pub fn with_value(value: Value) -> Self {
        Self { value: Some(value) }
    }
}

/// Model call
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LlmNodeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl LlmNodeConfig {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            prompt: Some(prompt.into()),
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// How the conditions of one branch combine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConditionConnector {
    #[default]
    All,
    Any,
}

/// A single comparison; `field` and `value` may contain variable references
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator) -> Self {
        Self {
            field: field.into(),
            operator,
            value: Value::Null,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }
}

/// One outcome of a condition node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionBranch {
    pub tag: String,
    #[serde(default)]
    pub connector: ConditionConnector,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ConditionBranch {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            connector: ConditionConnector::All,
            conditions: Vec::new(),
        }
    }

    pub fn with_connector(mut self, connector: ConditionConnector) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Combine per-condition results according to the connector
    pub fn combine(&self, results: impl IntoIterator<Item = bool>) -> bool {
        let mut results = results.into_iter();
        match self.connector {
            ConditionConnector::All => results.all(|r| r),
            ConditionConnector::Any => results.any(|r| r),
        }
    }
}

fn default_branch_tag() -> String {
    DEFAULT_BRANCH_TAG.to_string()
}

/// Branch node; the tag of the first matching branch becomes the discriminant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionNodeConfig {
    #[serde(default)]
    pub branches: Vec<ConditionBranch>,
    #[serde(default = "default_branch_tag")]
    pub default_branch: String,
}

impl Default for ConditionNodeConfig {
    fn default() -> Self {
        Self {
            branches: Vec::new(),
            default_branch: default_branch_tag(),
        }
    }
}

impl ConditionNodeConfig {
    pub fn with_branch(mut self, branch: ConditionBranch) -> Self {
        self.branches.push(branch);
        self
    }

    pub fn with_default_branch(mut self, tag: impl Into<String>) -> Self {
        self.default_branch = tag.into();
        self
    }

    /// Every tag this node can resolve to
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.branches
            .iter()
            .map(|b| b.tag.as_str())
            .chain(std::iter::once(self.default_branch.as_str()))
    }

    fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();

        if self.branches.is_empty() {
            missing.push("branches".to_string());
        }

        for (i, branch) in self.branches.iter().enumerate() {
            if branch.tag.trim().is_empty() {
                missing.push(format!("branches[{}].tag", i));
            }
            if branch.conditions.is_empty() {
                missing.push(format!("branches[{}].conditions", i));
            }
            for (j, condition) in branch.conditions.iter().enumerate() {
                if condition.field.trim().is_empty() {
                    missing.push(format!("branches[{}].conditions[{}].field", i, j));
                }
            }
        }

        if self.default_branch.trim().is_empty() {
            missing.push("default_branch".to_string());
        }

        missing
    }
}

/// Tool call through the injected tool invoker
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolNodeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Argument template; string leaves may contain variable references
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub arguments: Map<String, Value>,
}

impl ToolNodeConfig {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            arguments: Map::new(),
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }
}

/// Nested run of another workflow
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubWorkflowNodeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,
    /// Input template for the nested run; defaults to the inbound values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

impl SubWorkflowNodeConfig {
    pub fn new(workflow_id: WorkflowId) -> Self {
        Self {
            workflow_id: Some(workflow_id),
            input: None,
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }
}

/// Condition comparison operators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Null, empty string, empty array or empty object
    IsEmpty,
    IsNotEmpty,
    /// Substring for strings, membership for arrays
    Contains,
    StartsWith,
    EndsWith,
}

impl ConditionOperator {
    pub fn evaluate(&self, field_value: &Value, compare_value: &Value) -> bool {
        match self {
            Self::Eq => field_value == compare_value,
            Self::Ne => field_value != compare_value,
            Self::Gt => compare_numbers(field_value, compare_value, |a, b| a > b),
            Self::Gte => compare_numbers(field_value, compare_value, |a, b| a >= b),
            Self::Lt => compare_numbers(field_value, compare_value, |a, b| a < b),
            Self::Lte => compare_numbers(field_value, compare_value, |a, b| a <= b),
            Self::IsEmpty => is_empty(field_value),
            Self::IsNotEmpty => !is_empty(field_value),
            Self::Contains => contains(field_value, compare_value),
            Self::StartsWith => match (field_value.as_str(), compare_value.as_str()) {
                (Some(f), Some(v)) => f.starts_with(v),
                _ => false,
            },
            Self::EndsWith => match (field_value.as_str(), compare_value.as_str()) {
                (Some(f), Some(v)) => f.ends_with(v),
                _ => false,
            },
        }
    }
}

fn compare_numbers<F>(a: &Value, b: &Value, f: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (as_number(a), as_number(b)) {
        (Some(a), Some(b)) => f(a, b),
        _ => false,
    }
}

// Model and tool outputs often carry numbers as strings.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(arr) => arr.is_empty(),
        Value::Object(obj) => obj.is_empty(),
        _ => false,
    }
}

fn contains(field: &Value, value: &Value) -> bool {
    match field {
        Value::String(s) => value.as_str().map(|v| s.contains(v)).unwrap_or(false),
        Value::Array(arr) => arr.contains(value),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_llm_missing_fields() {
        let config = NodeConfig::Llm(LlmNodeConfig::default());
        assert_eq!(config.missing_fields(), vec!["model", "prompt"]);

        let config = NodeConfig::Llm(LlmNodeConfig::new("gpt-4o", "Hi"));
        assert!(config.missing_fields().is_empty());
    }

    #[test]
    fn test_condition_missing_fields() {
        let config = NodeConfig::Condition(ConditionNodeConfig::default());
        assert_eq!(config.missing_fields(), vec!["branches"]);

        let config = NodeConfig::Condition(
            ConditionNodeConfig::default().with_branch(ConditionBranch::new("yes")),
        );
        assert_eq!(config.missing_fields(), vec!["branches[0].conditions"]);
    }

    #[test]
    fn test_tool_and_sub_workflow_missing_fields() {
        assert_eq!(
            NodeConfig::Tool(ToolNodeConfig::default()).missing_fields(),
            vec!["tool_name"]
        );
        assert_eq!(
            NodeConfig::SubWorkflow(SubWorkflowNodeConfig::default()).missing_fields(),
            vec!["workflow_id"]
        );
        assert!(NodeConfig::Output(OutputNodeConfig::default())
            .missing_fields()
            .is_empty());
    }

    #[test]
    fn test_condition_config_defaults() {
        let config: ConditionNodeConfig = serde_json::from_value(json!({
            "branches": [{"tag": "yes", "conditions": [
                {"field": "${input:score}", "operator": "gt", "value": 5}
            ]}]
        }))
        .unwrap();

        assert_eq!(config.default_branch, DEFAULT_BRANCH_TAG);
        assert_eq!(config.branches[0].connector, ConditionConnector::All);
        assert_eq!(config.tags().collect::<Vec<_>>(), vec!["yes", "else"]);
    }

    #[test]
    fn test_branch_combine() {
        let all = ConditionBranch::new("a");
        assert!(all.combine([true, true]));
        assert!(!all.combine([true, false]));

        let any = ConditionBranch::new("b").with_connector(ConditionConnector::Any);
        assert!(any.combine([false, true]));
        assert!(!any.combine([false, false]));
    }

    #[test]
    fn test_condition_operator_eq() {
        let op = ConditionOperator::Eq;
        assert!(op.evaluate(&json!("test"), &json!("test")));
        assert!(!op.evaluate(&json!("test"), &json!("other")));
    }

    #[test]
    fn test_condition_operator_comparisons() {
        assert!(ConditionOperator::Gt.evaluate(&json!(10), &json!(5)));
        assert!(ConditionOperator::Gte.evaluate(&json!(10), &json!(10)));
        assert!(ConditionOperator::Lt.evaluate(&json!("3"), &json!(5)));
        assert!(!ConditionOperator::Lte.evaluate(&json!("abc"), &json!(5)));
    }

    #[test]
    fn test_condition_operator_collections() {
        assert!(ConditionOperator::IsEmpty.evaluate(&json!([]), &Value::Null));
        assert!(ConditionOperator::IsNotEmpty.evaluate(&json!("x"), &Value::Null));
        assert!(ConditionOperator::Contains.evaluate(&json!([1, 2, 3]), &json!(2)));
        assert!(ConditionOperator::StartsWith.evaluate(&json!("hello world"), &json!("hello")));
        assert!(ConditionOperator::EndsWith.evaluate(&json!("hello world"), &json!("world")));
    }

    #[test]
    fn test_node_kind_branching() {
        assert!(NodeKind::Condition.is_branching());
        assert!(!NodeKind::Llm.is_branching());
        assert_eq!(NodeKind::SubWorkflow.to_string(), "sub_workflow");
    }
}
