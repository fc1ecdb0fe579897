//! Directed edges between nodes

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::WorkflowError;
use super::node::{validate_element_id, NodeId, UiConfig};

/// Edge identifier, unique within one workflow
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EdgeId(String);

impl EdgeId {
    pub fn new(id: impl Into<String>) -> Result<Self, WorkflowError> {
        let id = id.into();
        validate_element_id(&id)?;
        Ok(Self(id))
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EdgeId {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EdgeId> for String {
    fn from(id: EdgeId) -> Self {
        id.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A directed edge
///
/// An edge carrying a `condition` tag is conditional: it is only followed when
/// its source node resolves to the branch with that tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    id: EdgeId,

    source: NodeId,

    target: NodeId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    condition: Option<String>,

    #[serde(default)]
    ui: UiConfig,
}

impl Edge {
    pub fn new(id: EdgeId, source: NodeId, target: NodeId) -> Self {
        Self {
            id,
            source,
            target,
            condition: None,
            ui: UiConfig::default(),
        }
    }

    pub fn with_condition(mut self, tag: impl Into<String>) -> Self {
        self.condition = Some(tag.into());
        self
    }

    pub fn with_ui(mut self, ui: UiConfig) -> Self {
        self.ui = ui;
        self
    }

    /// Same edge with new identifiers for itself and its endpoints
    pub fn remapped(mut self, id: EdgeId, source: NodeId, target: NodeId) -> Self {
        self.id = id;
        self.source = source;
        self.target = target;
        self
    }

    pub fn id(&self) -> &EdgeId {
        &self.id
    }

    pub fn source(&self) -> &NodeId {
        &self.source
    }

    pub fn target(&self) -> &NodeId {
        &self.target
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }

    pub fn ui(&self) -> &UiConfig {
        &self.ui
    }

    /// Whether a completed source with the given discriminant activates this edge
    pub fn is_active_for(&self, discriminant: Option<&str>) -> bool {
        match &self.condition {
            None => true,
            Some(tag) => discriminant == Some(tag.as_str()),
        }
    }
}
