//! Workflow domain entities

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::edge::Edge;
use super::error::WorkflowError;
use super::node::{Node, NodeId};
use crate::domain::user::UserId;

/// Maximum length for workflow names
pub const MAX_NAME_LENGTH: usize = 100;

/// Maximum number of tags on a workflow
pub const MAX_TAGS: usize = 20;

/// Workflow identifier, generated on create and on import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(Uuid);

impl WorkflowId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Parse an identifier received from a caller
    pub fn parse(id: &str) -> Result<Self, WorkflowError> {
        Uuid::parse_str(id.trim())
            .map(Self)
            .map_err(|_| WorkflowError::validation(format!("Invalid workflow ID '{}'", id)))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for WorkflowId {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who may read a workflow besides its owner
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

impl FromStr for Visibility {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            other => Err(WorkflowError::validation(format!(
                "Unknown visibility '{}'",
                other
            ))),
        }
    }
}

/// Icon shown next to the workflow in the editor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowIcon {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
}

impl WorkflowIcon {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            background: None,
        }
    }

    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = Some(background.into());
        self
    }
}

/// Validate a workflow display name
pub fn validate_workflow_name(name: &str) -> Result<(), WorkflowError> {
    if name.trim().is_empty() {
        return Err(WorkflowError::validation("Workflow name cannot be empty"));
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(WorkflowError::validation(format!(
            "Workflow name exceeds maximum length of {} characters",
            MAX_NAME_LENGTH
        )));
    }

    Ok(())
}

/// Validate a tag set
pub fn validate_tags(tags: &BTreeSet<String>) -> Result<(), WorkflowError> {
    if tags.len() > MAX_TAGS {
        return Err(WorkflowError::validation(format!(
            "A workflow may carry at most {} tags",
            MAX_TAGS
        )));
    }

    if tags.iter().any(|t| t.trim().is_empty()) {
        return Err(WorkflowError::validation("Tags cannot be empty"));
    }

    Ok(())
}

/// Workflow metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    id: WorkflowId,

    name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<WorkflowIcon>,

    #[serde(default)]
    tags: BTreeSet<String>,

    #[serde(default)]
    visibility: Visibility,

    #[serde(default)]
    published: bool,

    /// Incremented on every structure replacement
    version: u32,

    owner_id: UserId,

    created_at: DateTime<Utc>,

    updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Create a new private, unpublished workflow
    pub fn new(id: WorkflowId, owner_id: UserId, name: impl Into<String>) -> Self {
        let now = Utc::now();

        Self {
            id,
            name: name.into(),
            description: None,
            icon: None,
            tags: BTreeSet::new(),
            visibility: Visibility::Private,
            published: false,
            version: 1,
            owner_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_icon(mut self, icon: WorkflowIcon) -> Self {
        self.icon = Some(icon);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_published(mut self, published: bool) -> Self {
        self.published = published;
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Restore persisted timestamps
    pub fn with_timestamps(mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at;
        self
    }

    // Getters

    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn icon(&self) -> Option<&WorkflowIcon> {
        self.icon.as_ref()
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    pub fn is_published(&self) -> bool {
        self.published
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn owner_id(&self) -> &UserId {
        &self.owner_id
    }

    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.owner_id == user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // Setters

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
        self.touch();
    }

    pub fn set_icon(&mut self, icon: Option<WorkflowIcon>) {
        self.icon = icon;
        self.touch();
    }

    pub fn set_tags(&mut self, tags: BTreeSet<String>) {
        self.tags = tags;
        self.touch();
    }

    pub fn set_visibility(&mut self, visibility: Visibility) {
        self.visibility = visibility;
        self.touch();
    }

    pub fn set_published(&mut self, published: bool) {
        self.published = published;
        self.touch();
    }

    /// Record a structure replacement
    pub fn increment_version(&mut self) {
        self.version += 1;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A workflow with its complete node and edge set
///
/// This is the unit fetched and replaced atomically by repositories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStructure {
    pub workflow: Workflow,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowStructure {
    pub fn new(workflow: Workflow, nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            workflow,
            nodes,
            edges,
        }
    }

    pub fn id(&self) -> &WorkflowId {
        self.workflow.id()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary::from(self)
    }
}

/// Listing projection of a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowSummary {
    pub id: WorkflowId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<WorkflowIcon>,
    pub tags: BTreeSet<String>,
    pub visibility: Visibility,
    pub published: bool,
    pub version: u32,
    pub owner_id: UserId,
    pub node_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&WorkflowStructure> for WorkflowSummary {
    fn from(structure: &WorkflowStructure) -> Self {
        let workflow = &structure.workflow;

        Self {
            id: *workflow.id(),
            name: workflow.name().to_string(),
            description: workflow.description().map(String::from),
            icon: workflow.icon().cloned(),
            tags: workflow.tags().clone(),
            visibility: workflow.visibility(),
            published: workflow.is_published(),
            version: workflow.version(),
            owner_id: workflow.owner_id().clone(),
            node_count: structure.nodes.len(),
            updated_at: workflow.updated_at(),
        }
    }
}
