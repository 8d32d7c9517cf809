//! Structural change event shapes.
//!
//! # Responsibility
//! - Define the inbound wire shape delivered by the host event mechanism.
//! - Define the classified shape the synchronizer consumes.
//!
//! # Invariants
//! - `ChangeEvent` carries the subject path as delivered: for move events
//!   that is the OLD path, while the repository already holds the new one.

use crate::store::node_store::NodeId;
use serde::{Deserialize, Serialize};

/// Event category handled by the engine; all others are ignored.
pub const CATEGORY_WORKFLOW: &str = "workflow";

/// Recognized workflow actions.
pub const ACTION_RENAME: &str = "rename";
pub const ACTION_REPLACE_LOCALIZED_NAMES: &str = "replaceAllLocalizedNames";
pub const ACTION_MOVE: &str = "move";

/// Inbound event wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Event category; only `workflow` is handled.
    pub category: String,
    /// Workflow action name.
    pub action: String,
    /// Subject node id as delivered by the host.
    pub subject_id: String,
    /// Subject path as delivered (OLD path for move events).
    pub subject_path: String,
    /// Ordered action arguments; rename carries old/new leaf names.
    #[serde(default)]
    pub arguments: Vec<String>,
}

impl ChangeEvent {
    /// Returns whether the event belongs to the handled category.
    pub fn is_workflow(&self) -> bool {
        self.category == CATEGORY_WORKFLOW
    }
}

/// Classified structural change kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// A handle's leaf name changed (delivered as a localized-names replace).
    LeafRename,
    /// An ancestor folder's leaf name changed.
    FolderRename,
    /// A handle subtree moved to a different parent.
    SubtreeMove,
}

/// Classified structural change ready for synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralChange {
    pub kind: ChangeKind,
    /// Stable subject id; the synchronizer re-resolves current state from it.
    pub subject_uuid: NodeId,
    /// Subject path as delivered (OLD path for `SubtreeMove`).
    pub subject_path: String,
    /// Old leaf name; present for `FolderRename`.
    pub old_name: Option<String>,
    /// New leaf name; present for `FolderRename`.
    pub new_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{ChangeEvent, CATEGORY_WORKFLOW};

    #[test]
    fn is_workflow_matches_category_exactly() {
        let mut event = ChangeEvent {
            category: CATEGORY_WORKFLOW.to_string(),
            action: "rename".to_string(),
            subject_id: "x".to_string(),
            subject_path: "/content/documents/a".to_string(),
            arguments: Vec::new(),
        };
        assert!(event.is_workflow());
        event.category = "security".to_string();
        assert!(!event.is_workflow());
    }
}
