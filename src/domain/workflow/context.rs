//! Execution context and variable resolution
//!
//! Templates inside node configuration may reference:
//! - `${input}` - the whole trigger payload
//! - `${input:field}` / `${input:field:default}` - a payload field
//! - `${node:node-id}` - the whole output of a node
//! - `${node:node-id:field}` / `${node:node-id:field:default}` - a field of a node output
//!
//! Fields use dot notation with numeric array indices (`items.0.name`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use super::error::WorkflowError;
use super::node::NodeId;
use crate::domain::user::UserId;

/// Default number of node runs allowed for one execution
pub const DEFAULT_VISIT_BUDGET: u32 = 10_000;

static REFERENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{(input|node)(?::([^}]*))?\}").expect("valid reference pattern"));

/// Shared counter bounding the number of node runs
///
/// Nested sub-workflow runs draw from the same budget as their parent.
#[derive(Debug)]
pub struct VisitBudget {
    limit: u32,
    used: AtomicU32,
}

impl VisitBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            used: AtomicU32::new(0),
        }
    }

    /// Take one visit; false once the budget is exhausted
    pub fn try_consume(&self) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.limit).then_some(used + 1)
            })
            .is_ok()
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used())
    }
}

impl Default for VisitBudget {
    fn default() -> Self {
        Self::new(DEFAULT_VISIT_BUDGET)
    }
}

/// Who started a run and how deeply it is nested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub user_id: UserId,
    pub depth: u32,
}

impl Invocation {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, depth: 0 }
    }

    pub fn nested(&self) -> Self {
        Self {
            user_id: self.user_id.clone(),
            depth: self.depth + 1,
        }
    }
}

/// A parsed variable reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableRef {
    Input {
        field: Option<String>,
        default: Option<String>,
    },
    Node {
        node: String,
        field: Option<String>,
        default: Option<String>,
    },
}

impl VariableRef {
    fn from_captures(caps: &Captures<'_>) -> Result<Self, WorkflowError> {
        let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let non_empty = |s: Option<&str>| s.filter(|v| !v.is_empty()).map(String::from);

        match &caps[1] {
            "input" => {
                let mut parts = body.splitn(2, ':');
                Ok(Self::Input {
                    field: non_empty(parts.next()),
                    default: parts.next().map(String::from),
                })
            }
            _ => {
                let mut parts = body.splitn(3, ':');
                let node = non_empty(parts.next()).ok_or_else(|| {
                    WorkflowError::variable_resolution(format!(
                        "Node reference '{}' is missing a node id",
                        &caps[0]
                    ))
                })?;
                Ok(Self::Node {
                    node,
                    field: non_empty(parts.next()),
                    default: parts.next().map(String::from),
                })
            }
        }
    }

    pub fn has_default(&self) -> bool {
        match self {
            Self::Input { default, .. } | Self::Node { default, .. } => default.is_some(),
        }
    }
}

/// State of one execution, shared by all concurrently running handlers
///
/// Node outputs are written by the engine after a handler returns; handlers
/// only read them, and no lock is held across an await point.
#[derive(Debug)]
pub struct ExecutionContext {
    input: Value,
    outputs: RwLock<HashMap<NodeId, Value>>,
    budget: Arc<VisitBudget>,
    invocation: Invocation,
}

impl ExecutionContext {
    pub fn new(input: Value, invocation: Invocation, budget: Arc<VisitBudget>) -> Self {
        Self {
            input,
            outputs: RwLock::new(HashMap::new()),
            budget,
            invocation,
        }
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn budget(&self) -> &Arc<VisitBudget> {
        &self.budget
    }

    /// Record the latest output of a node
    pub fn set_output(&self, node_id: NodeId, output: Value) {
        self.outputs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node_id, output);
    }

    pub fn output(&self, node_id: &NodeId) -> Option<Value> {
        self.outputs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node_id)
            .cloned()
    }

    /// Output of a node named in a reference; malformed ids never match
    fn output_by_name(&self, node_id: &str) -> Option<Value> {
        let id = NodeId::new(node_id).ok()?;
        self.output(&id)
    }

    /// Resolve a single reference such as `${node:ask:content}`
    pub fn resolve_expression(&self, expression: &str) -> Result<Value, WorkflowError> {
        let caps = REFERENCE_PATTERN.captures(expression).ok_or_else(|| {
            WorkflowError::variable_resolution(format!(
                "Invalid variable expression: {}",
                expression
            ))
        })?;

        self.resolve_ref(&VariableRef::from_captures(&caps)?)
    }

    /// Substitute every reference inside a string template
    pub fn resolve_string(&self, template: &str) -> Result<String, WorkflowError> {
        let mut result = String::with_capacity(template.len());
        let mut last = 0;

        for caps in REFERENCE_PATTERN.captures_iter(template) {
            let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
            result.push_str(&template[last..whole.0]);

            let value = self.resolve_ref(&VariableRef::from_captures(&caps)?)?;
            result.push_str(&value_to_string(&value));
            last = whole.1;
        }

        result.push_str(&template[last..]);
        Ok(result)
    }

    /// Resolve references throughout a JSON template
    ///
    /// A string consisting of exactly one reference becomes the referenced
    /// value itself; other strings are interpolated.
    pub fn resolve_value(&self, template: &Value) -> Result<Value, WorkflowError> {
        match template {
            Value::String(s) => {
                match REFERENCE_PATTERN.captures(s) {
                    Some(caps) if caps.get(0).is_some_and(|m| m.start() == 0 && m.end() == s.len()) => {
                        self.resolve_ref(&VariableRef::from_captures(&caps)?)
                    }
                    _ => Ok(Value::String(self.resolve_string(s)?)),
                }
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.resolve_value(v)?)))
                .collect::<Result<Map<_, _>, WorkflowError>>()
                .map(Value::Object),
            other => Ok(other.clone()),
        }
    }

    fn resolve_ref(&self, reference: &VariableRef) -> Result<Value, WorkflowError> {
        match reference {
            VariableRef::Input { field, default } => {
                let value = match field {
                    Some(path) => get_nested_field(&self.input, path).cloned(),
                    None => Some(self.input.clone()),
                };
                present_or_default(value, default.as_deref(), || {
                    format!(
                        "Required input field '{}' not found",
                        field.as_deref().unwrap_or("")
                    )
                })
            }
            VariableRef::Node {
                node,
                field,
                default,
            } => {
                let Some(output) = self.output_by_name(node) else {
                    return present_or_default(None, default.as_deref(), || {
                        format!("Node '{}' has not produced an output", node)
                    });
                };
                let value = match field {
                    Some(path) => get_nested_field(&output, path).cloned(),
                    None => Some(output),
                };
                present_or_default(value, default.as_deref(), || {
                    format!(
                        "Required field '{}' not found in output of node '{}'",
                        field.as_deref().unwrap_or(""),
                        node
                    )
                })
            }
        }
    }

    /// Whether a string contains any variable reference
    pub fn has_variables(template: &str) -> bool {
        REFERENCE_PATTERN.is_match(template)
    }

    /// Extract all variable references from a template
    pub fn extract_variables(template: &str) -> Vec<VariableRef> {
        REFERENCE_PATTERN
            .captures_iter(template)
            .filter_map(|caps| VariableRef::from_captures(&caps).ok())
            .collect()
    }
}

fn present_or_default(
    value: Option<Value>,
    default: Option<&str>,
    message: impl FnOnce() -> String,
) -> Result<Value, WorkflowError> {
    match value {
        Some(v) if !v.is_null() => Ok(v),
        _ => match default {
            Some(d) => Ok(parse_default_value(d)),
            None => Err(WorkflowError::variable_resolution(message())),
        },
    }
}

/// Get a nested field from a JSON value using dot notation
pub fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;

    for part in path.split('.') {
        current = match current {
            Value::Object(obj) => obj.get(part)?,
            Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Parse a default value string into a JSON value
fn parse_default_value(default: &str) -> Value {
    serde_json::from_str::<Value>(default).unwrap_or_else(|_| Value::String(default.to_string()))
}

/// Convert a JSON value to its template string representation
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(input: Value) -> ExecutionContext {
        ExecutionContext::new(
            input,
            Invocation::new(UserId::new("tester").unwrap()),
            Arc::new(VisitBudget::default()),
        )
    }

    fn node(id: &str) -> NodeId {
        NodeId::new(id).unwrap()
    }

    #[test]
    fn test_resolve_input_field() {
        let ctx = context(json!({"question": "What is Rust?", "user": {"tier": "pro"}}));

        assert_eq!(ctx.resolve_expression("${input:question}").unwrap(), json!("What is Rust?"));
        assert_eq!(ctx.resolve_expression("${input:user.tier}").unwrap(), json!("pro"));
        assert_eq!(ctx.resolve_expression("${input}").unwrap()["user"]["tier"], "pro");
    }

    #[test]
    fn test_resolve_with_default() {
        let ctx = context(json!({}));

        assert_eq!(ctx.resolve_expression("${input:limit:10}").unwrap(), json!(10));
        assert_eq!(ctx.resolve_expression("${input:mode:fast}").unwrap(), json!("fast"));
        assert_eq!(ctx.resolve_expression("${node:missing:x:0}").unwrap(), json!(0));
    }

    #[test]
    fn test_missing_reference_errors() {
        let ctx = context(json!({}));

        assert!(matches!(
            ctx.resolve_expression("${input:question}"),
            Err(WorkflowError::VariableResolution(_))
        ));
        assert!(ctx.resolve_expression("${node:ask:content}").is_err());
        assert!(ctx.resolve_expression("plain text").is_err());
    }

    #[test]
    fn test_resolve_node_output() {
        let ctx = context(json!({}));
        ctx.set_output(node("search"), json!({"items": [{"title": "Ownership"}]}));

        assert_eq!(
            ctx.resolve_expression("${node:search:items.0.title}").unwrap(),
            json!("Ownership")
        );
        assert_eq!(
            ctx.resolve_expression("${node:search}").unwrap(),
            json!({"items": [{"title": "Ownership"}]})
        );
    }

    #[test]
    fn test_node_reference_with_invalid_id_is_unresolved() {
        let ctx = context(json!({}));
        ctx.set_output(node("search"), json!("found"));

        assert_eq!(ctx.resolve_expression("${node:search}").unwrap(), json!("found"));
        assert!(matches!(
            ctx.resolve_expression("${node:sea rch}"),
            Err(WorkflowError::VariableResolution(_))
        ));
        assert_eq!(ctx.resolve_expression("${node:sea rch:x:none}").unwrap(), json!("none"));
    }

    #[test]
    fn test_resolve_string_interpolates() {
        let ctx = context(json!({"name": "Ada", "count": 3}));
        ctx.set_output(node("greet"), json!({"text": "hello"}));

        let result = ctx
            .resolve_string("${node:greet:text}, ${input:name}! You have ${input:count} items.")
            .unwrap();
        assert_eq!(result, "hello, Ada! You have 3 items.");
    }

    #[test]
    fn test_resolve_value_keeps_types() {
        let ctx = context(json!({"tags": ["a", "b"], "n": 2}));

        let resolved = ctx
            .resolve_value(&json!({
                "tags": "${input:tags}",
                "label": "n=${input:n}",
                "nested": [{"count": "${input:n}"}],
                "flag": true
            }))
            .unwrap();

        assert_eq!(resolved["tags"], json!(["a", "b"]));
        assert_eq!(resolved["label"], json!("n=2"));
        assert_eq!(resolved["nested"][0]["count"], json!(2));
        assert_eq!(resolved["flag"], json!(true));
    }

    #[test]
    fn test_extract_variables() {
        let vars = ExecutionContext::extract_variables("${input:q} and ${node:a:b:c}");
        assert_eq!(
            vars,
            vec![
                VariableRef::Input {
                    field: Some("q".to_string()),
                    default: None
                },
                VariableRef::Node {
                    node: "a".to_string(),
                    field: Some("b".to_string()),
                    default: Some("c".to_string())
                },
            ]
        );
        assert!(vars[1].has_default());
        assert!(ExecutionContext::has_variables("x ${input}"));
        assert!(!ExecutionContext::has_variables("no refs"));
    }

    #[test]
    fn test_visit_budget() {
        let budget = VisitBudget::new(2);
        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert!(!budget.try_consume());
        assert_eq!(budget.used(), 2);
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_invocation_nesting() {
        let root = Invocation::new(UserId::new("u1").unwrap());
        let child = root.nested();
        assert_eq!(child.depth, 1);
        assert_eq!(child.user_id, root.user_id);
    }
}
