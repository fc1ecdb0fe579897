//! Ownership and visibility rules

use serde::{Deserialize, Serialize};

use super::entity::Workflow;
use crate::domain::user::UserId;

/// What the caller intends to do with a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Read the structure, export, or execute
    ReadOnly,
    /// Mutate structure or metadata, delete
    Edit,
}

impl AccessMode {
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly)
    }

    pub fn from_read_only(read_only: bool) -> Self {
        if read_only { Self::ReadOnly } else { Self::Edit }
    }
}

/// Whether `user_id` may access `workflow` in the given mode
///
/// The owner may always read and edit. Anyone may read a public workflow.
/// Everything else, including a missing workflow, is denied.
pub fn check_access(workflow: Option<&Workflow>, user_id: &UserId, mode: AccessMode) -> bool {
    let Some(workflow) = workflow else {
        return false;
    };

    if workflow.is_owned_by(user_id) {
        return true;
    }

    mode.is_read_only() && workflow.is_public()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::entity::{Visibility, WorkflowId};

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn workflow(visibility: Visibility) -> Workflow {
        Workflow::new(WorkflowId::generate(), user("owner"), "Shared").with_visibility(visibility)
    }

    #[test]
    fn test_owner_has_full_access() {
        for visibility in [Visibility::Private, Visibility::Public] {
            let wf = workflow(visibility);
            assert!(check_access(Some(&wf), &user("owner"), AccessMode::ReadOnly));
            assert!(check_access(Some(&wf), &user("owner"), AccessMode::Edit));
        }
    }

    #[test]
    fn test_public_is_read_only_for_others() {
        let wf = workflow(Visibility::Public);
        assert!(check_access(Some(&wf), &user("stranger"), AccessMode::ReadOnly));
        assert!(!check_access(Some(&wf), &user("stranger"), AccessMode::Edit));
    }

    #[test]
    fn test_private_denied_to_others() {
        let wf = workflow(Visibility::Private);
        assert!(!check_access(Some(&wf), &user("stranger"), AccessMode::ReadOnly));
        assert!(!check_access(Some(&wf), &user("stranger"), AccessMode::Edit));
    }

    #[test]
    fn test_missing_workflow_denied() {
        assert!(!check_access(None, &user("owner"), AccessMode::ReadOnly));
        assert!(!check_access(None, &user("owner"), AccessMode::Edit));
    }

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(AccessMode::from_read_only(true), AccessMode::ReadOnly);
        assert_eq!(AccessMode::from_read_only(false), AccessMode::Edit);
    }
}
