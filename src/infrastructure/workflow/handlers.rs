//! Built-in node handlers, one per node kind

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::domain::workflow::{
    Capabilities, ConditionNodeConfig, InputNodeConfig, LlmNodeConfig, ModelClient, ModelRequest,
    Node, NodeConfig, NodeContext, NodeHandler, NodeKind, NodeOutput, OutputNodeConfig,
    SubWorkflowNodeConfig, ToolInvoker, ToolNodeConfig, WorkflowError, WorkflowLoader,
};

/// Handler table for every built-in kind, wired to the given capabilities
pub fn builtin_handlers(capabilities: &Capabilities) -> HashMap<NodeKind, Arc<dyn NodeHandler>> {
    let mut handlers: HashMap<NodeKind, Arc<dyn NodeHandler>> = HashMap::new();
    handlers.insert(NodeKind::Input, Arc::new(InputHandler));
    handlers.insert(NodeKind::Output, Arc::new(OutputHandler));
    handlers.insert(NodeKind::Condition, Arc::new(ConditionHandler));
    handlers.insert(
        NodeKind::Llm,
        Arc::new(LlmHandler::new(capabilities.model.clone())),
    );
    handlers.insert(
        NodeKind::Tool,
        Arc::new(ToolHandler::new(capabilities.tools.clone())),
    );
    handlers.insert(
        NodeKind::SubWorkflow,
        Arc::new(SubWorkflowHandler::new(capabilities.workflows.clone())),
    );
    handlers
}

fn mismatched_config(node: &Node, expected: NodeKind) -> WorkflowError {
    WorkflowError::validation(format!(
        "Node '{}' is of kind '{}' but was dispatched to the '{}' handler",
        node.id(),
        node.kind(),
        expected
    ))
}

fn required<'a>(node: &Node, field: &str, value: Option<&'a str>) -> Result<&'a str, WorkflowError> {
    value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
        WorkflowError::validation(format!("Node '{}' is missing '{}'", node.id(), field))
    })
}

/// Passes the trigger payload on, applying field defaults
#[derive(Debug, Default)]
pub struct InputHandler;

impl InputHandler {
    fn apply_fields(config: &InputNodeConfig, payload: &Value) -> Result<Value, WorkflowError> {
        if config.fields.is_empty() {
            return Ok(payload.clone());
        }

        let mut object = payload.as_object().cloned().unwrap_or_default();

        for field in &config.fields {
            let present = object.get(&field.name).is_some_and(|v| !v.is_null());
            if present {
                continue;
            }

            match (&field.default, field.required) {
                (Some(default), _) => {
                    object.insert(field.name.clone(), default.clone());
                }
                (None, true) => {
                    return Err(WorkflowError::validation(format!(
                        "Required input field '{}' is missing",
                        field.name
                    )));
                }
                (None, false) => {}
            }
        }

        Ok(Value::Object(object))
    }
}

#[async_trait]
impl NodeHandler for InputHandler {
    async fn run(&self, node: &Node, ctx: &NodeContext<'_>) -> Result<NodeOutput, WorkflowError> {
        let NodeConfig::Input(config) = node.config() else {
            return Err(mismatched_config(node, NodeKind::Input));
        };

        Self::apply_fields(config, &ctx.merged_inbound()).map(NodeOutput::value)
    }
}

/// Produces a terminal value from its template or its inbound values
#[derive(Debug, Default)]
pub struct OutputHandler;

#[async_trait]
impl NodeHandler for OutputHandler {
    async fn run(&self, node: &Node, ctx: &NodeContext<'_>) -> Result<NodeOutput, WorkflowError> {
        let NodeConfig::Output(OutputNodeConfig { value }) = node.config() else {
            return Err(mismatched_config(node, NodeKind::Output));
        };

        let output = match value {
            Some(template) => ctx.execution.resolve_value(template)?,
            None => ctx.merged_inbound(),
        };

        Ok(NodeOutput::value(output))
    }
}

/// Evaluates branches in order; the first match decides the discriminant
#[derive(Debug, Default)]
pub struct ConditionHandler;

impl ConditionHandler {
    fn select_branch<'c>(
        config: &'c ConditionNodeConfig,
        ctx: &NodeContext<'_>,
    ) -> Result<&'c str, WorkflowError> {
        for branch in &config.branches {
            let results = branch
                .conditions
                .iter()
                .map(|condition| -> Result<bool, WorkflowError> {
                    let field = ctx
                        .execution
                        .resolve_value(&Value::String(condition.field.clone()))?;
                    let expected = ctx.execution.resolve_value(&condition.value)?;
                    Ok(condition.operator.evaluate(&field, &expected))
                })
                .collect::<Result<Vec<bool>, _>>()?;

            if branch.combine(results) {
                return Ok(branch.tag.as_str());
            }
        }

        Ok(config.default_branch.as_str())
    }
}

#[async_trait]
impl NodeHandler for ConditionHandler {
    async fn run(&self, node: &Node, ctx: &NodeContext<'_>) -> Result<NodeOutput, WorkflowError> {
        let NodeConfig::Condition(config) = node.config() else {
            return Err(mismatched_config(node, NodeKind::Condition));
        };

        let tag = Self::select_branch(config, ctx)?;
        debug!(node_id = %node.id(), branch = %tag, "Condition resolved");

        Ok(NodeOutput::branch(
            json!({ "branch": tag, "value": ctx.merged_inbound() }),
            tag,
        ))
    }
}

/// Calls the injected model client
#[derive(Debug)]
pub struct LlmHandler {
    model: Option<Arc<dyn ModelClient>>,
}

impl LlmHandler {
    pub fn new(model: Option<Arc<dyn ModelClient>>) -> Self {
        Self { model }
    }

    fn build_request(
        node: &Node,
        config: &LlmNodeConfig,
        ctx: &NodeContext<'_>,
    ) -> Result<ModelRequest, WorkflowError> {
        let model = required(node, "model", config.model.as_deref())?;
        let prompt = required(node, "prompt", config.prompt.as_deref())?;

        let mut request = ModelRequest::new(model, ctx.execution.resolve_string(prompt)?);
        if let Some(ref system) = config.system_prompt {
            request = request.with_system_prompt(ctx.execution.resolve_string(system)?);
        }
        request.temperature = config.temperature;
        request.max_tokens = config.max_tokens;

        Ok(request)
    }
}

#[async_trait]
impl NodeHandler for LlmHandler {
    async fn run(&self, node: &Node, ctx: &NodeContext<'_>) -> Result<NodeOutput, WorkflowError> {
        let NodeConfig::Llm(config) = node.config() else {
            return Err(mismatched_config(node, NodeKind::Llm));
        };
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| WorkflowError::capability_unavailable("no model client configured"))?;

        let request = Self::build_request(node, config, ctx)?;

        let response = tokio::select! {
            response = model.complete(request) => response
                .map_err(|e| WorkflowError::node_failure(node.id().clone(), e.to_string()))?,
            _ = ctx.cancel.cancelled() => return Err(WorkflowError::Cancelled),
        };

        let mut output = Map::new();
        // JSON object replies are also exposed under `data`
        if let Ok(data @ Value::Object(_)) = serde_json::from_str::<Value>(&response.content) {
            output.insert("data".to_string(), data);
        }
        output.insert("content".to_string(), Value::String(response.content));
        output.insert("model".to_string(), Value::String(response.model));
        if let Some(usage) = response.usage {
            output.insert("usage".to_string(), json!(usage));
        }

        Ok(NodeOutput::value(Value::Object(output)))
    }
}

/// Calls a named tool through the injected invoker
#[derive(Debug)]
pub struct ToolHandler {
    tools: Option<Arc<dyn ToolInvoker>>,
}

impl ToolHandler {
    pub fn new(tools: Option<Arc<dyn ToolInvoker>>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl NodeHandler for ToolHandler {
    async fn run(&self, node: &Node, ctx: &NodeContext<'_>) -> Result<NodeOutput, WorkflowError> {
        let NodeConfig::Tool(ToolNodeConfig {
            tool_name,
            arguments,
        }) = node.config()
        else {
            return Err(mismatched_config(node, NodeKind::Tool));
        };
        let tools = self
            .tools
            .as_ref()
            .ok_or_else(|| WorkflowError::capability_unavailable("no tool invoker configured"))?;

        let name = required(node, "tool_name", tool_name.as_deref())?;
        let arguments = ctx
            .execution
            .resolve_value(&Value::Object(arguments.clone()))?;

        let result = tokio::select! {
            result = tools.invoke(name, arguments) => result
                .map_err(|e| WorkflowError::node_failure(node.id().clone(), e.to_string()))?,
            _ = ctx.cancel.cancelled() => return Err(WorkflowError::Cancelled),
        };

        Ok(NodeOutput::value(result))
    }
}

/// Runs another workflow as a single step
#[derive(Debug)]
pub struct SubWorkflowHandler {
    workflows: Option<Arc<dyn WorkflowLoader>>,
}

impl SubWorkflowHandler {
    pub fn new(workflows: Option<Arc<dyn WorkflowLoader>>) -> Self {
        Self { workflows }
    }
}

#[async_trait]
impl NodeHandler for SubWorkflowHandler {
    async fn run(&self, node: &Node, ctx: &NodeContext<'_>) -> Result<NodeOutput, WorkflowError> {
        let NodeConfig::SubWorkflow(SubWorkflowNodeConfig { workflow_id, input }) = node.config()
        else {
            return Err(mismatched_config(node, NodeKind::SubWorkflow));
        };
        let workflows = self.workflows.as_ref().ok_or_else(|| {
            WorkflowError::capability_unavailable("no workflow loader configured")
        })?;
        let workflow_id = workflow_id.as_ref().ok_or_else(|| {
            WorkflowError::validation(format!("Node '{}' is missing 'workflow_id'", node.id()))
        })?;

        let structure = workflows
            .load_for_execution(workflow_id, &ctx.execution.invocation().user_id)
            .await?;
        let input = match input {
            Some(template) => ctx.execution.resolve_value(template)?,
            None => ctx.merged_inbound(),
        };

        debug!(node_id = %node.id(), workflow_id = %workflow_id, "Running sub-workflow");

        let result = ctx
            .nested
            .run_nested(structure, input, ctx.execution, ctx.cancel.clone())
            .await?;
        let output = result.output();
        result.into_outputs()?;

        Ok(NodeOutput::value(output))
    }
}
