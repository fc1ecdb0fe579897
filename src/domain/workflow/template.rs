//! Portable workflow templates
//!
//! A template carries the metadata, nodes and edges of a workflow without
//! anything server-assigned: no workflow id, owner, visibility or timestamps.
//! Importing always produces a new private, unpublished workflow with fresh
//! identifiers.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::edge::{Edge, EdgeId};
use super::entity::{
    validate_tags, validate_workflow_name, Workflow, WorkflowIcon, WorkflowId, WorkflowStructure,
};
use super::error::WorkflowError;
use super::node::{Node, NodeId};
use crate::domain::user::UserId;

/// Newest template format this build reads and writes
pub const TEMPLATE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<WorkflowIcon>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplate {
    pub format_version: u32,
    pub exported_at: DateTime<Utc>,
    pub workflow: TemplateMetadata,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowTemplate {
    /// Build a template from a stored structure
    ///
    /// Output is deterministic apart from `exported_at`: nodes and edges keep
    /// their stored order and tags are sorted.
    pub fn export(structure: &WorkflowStructure, exported_at: DateTime<Utc>) -> Self {
        let workflow = &structure.workflow;

        Self {
            format_version: TEMPLATE_FORMAT_VERSION,
            exported_at,
            workflow: TemplateMetadata {
                name: workflow.name().to_string(),
                description: workflow.description().map(String::from),
                icon: workflow.icon().cloned(),
                tags: workflow.tags().clone(),
            },
            nodes: structure.nodes.clone(),
            edges: structure.edges.clone(),
        }
    }

    /// Parse an uploaded template document
    ///
    /// The format version is checked before the body, so documents written by
    /// a newer format are reported as unsupported rather than malformed.
    pub fn from_json(document: Value) -> Result<Self, WorkflowError> {
        let version = document
            .get("formatVersion")
            .and_then(Value::as_u64)
            .ok_or_else(|| WorkflowError::import_malformed("missing or invalid formatVersion"))?;

        check_version(version)?;

        serde_json::from_value(document).map_err(|e| WorkflowError::import_malformed(e.to_string()))
    }

    /// Turn the template into a new workflow owned by `owner_id`
    pub fn instantiate(self, owner_id: UserId) -> Result<WorkflowStructure, WorkflowError> {
        check_version(u64::from(self.format_version))?;

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id()) {
                return Err(WorkflowError::import_malformed(format!(
                    "duplicate node id '{}'",
                    node.id()
                )));
            }
        }

        for edge in &self.edges {
            for endpoint in [edge.source(), edge.target()] {
                if !seen.contains(endpoint) {
                    return Err(WorkflowError::import_malformed(format!(
                        "edge '{}' references unknown node '{}'",
                        edge.id(),
                        endpoint
                    )));
                }
            }
        }

        validate_workflow_name(&self.workflow.name)
            .and_then(|_| validate_tags(&self.workflow.tags))
            .map_err(|e| WorkflowError::import_malformed(e.to_string()))?;

        let id_map: HashMap<NodeId, NodeId> = self
            .nodes
            .iter()
            .map(|n| (n.id().clone(), NodeId::generate()))
            .collect();

        let nodes: Vec<Node> = self
            .nodes
            .into_iter()
            .map(|node| {
                let fresh = id_map[node.id()].clone();
                node.with_id(fresh)
            })
            .collect();

        let edges: Vec<Edge> = self
            .edges
            .into_iter()
            .map(|edge| {
                let source = id_map[edge.source()].clone();
                let target = id_map[edge.target()].clone();
                edge.remapped(EdgeId::generate(), source, target)
            })
            .collect();

        let metadata = self.workflow;
        let mut workflow = Workflow::new(WorkflowId::generate(), owner_id, metadata.name)
            .with_tags(metadata.tags);
        if let Some(description) = metadata.description {
            workflow = workflow.with_description(description);
        }
        if let Some(icon) = metadata.icon {
            workflow = workflow.with_icon(icon);
        }

        Ok(WorkflowStructure::new(workflow, nodes, edges))
    }
}

fn check_version(version: u64) -> Result<(), WorkflowError> {
    if version > u64::from(TEMPLATE_FORMAT_VERSION) {
        return Err(WorkflowError::ImportFormatUnsupported {
            found: u32::try_from(version).unwrap_or(u32::MAX),
            supported: TEMPLATE_FORMAT_VERSION,
        });
    }

    if version == 0 {
        return Err(WorkflowError::import_malformed("formatVersion must be at least 1"));
    }

    Ok(())
}

/// Download file name for an exported workflow
///
/// Every character that is not ASCII alphanumeric is replaced by `_`.
pub fn export_file_name(workflow_name: &str) -> String {
    let stem: String = workflow_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    if stem.is_empty() {
        "workflow.json".to_string()
    } else {
        format!("{}.json", stem)
    }
}
