use crate::{GroupState, NodeId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural failures. An operation returning one of these left the node
/// table untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Ancestor cycle detected at node {0}")]
    Cycle(NodeId),
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("Node {0} is not a group")]
    NotAGroup(NodeId),
    #[error("Node id already in use: {0}")]
    DuplicateId(NodeId),
}

/// User-input inconsistencies. Reported to the caller, never raised.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineWarning {
    /// Grouping with fewer than two nodes, or nothing to ungroup.
    #[error("invalid selection: {reason}")]
    InvalidSelection { reason: String },
    /// A minimized group had no cached size; the fallback was used.
    #[error("group {group_id} had no cached size, using fallback")]
    MissingCache { group_id: NodeId },
    /// The requested transition does not apply to the group's state.
    #[error("cannot {requested} group {group_id} while {state}")]
    IgnoredTransition {
        group_id: NodeId,
        state: GroupState,
        requested: String,
    },
}

/// What an operation did to the table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationReport {
    /// Node created by the operation, if any.
    pub created: Option<NodeId>,
    /// Existing nodes whose fields were rewritten.
    pub changed: Vec<NodeId>,
    /// Nodes removed from the table.
    pub removed: Vec<NodeId>,
    pub warnings: Vec<EngineWarning>,
}

impl OperationReport {
    pub fn warning(warning: EngineWarning) -> Self {
        Self {
            warnings: vec![warning],
            ..Self::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.created.is_none() && self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn mark_changed(&mut self, id: &NodeId) {
        if !self.changed.contains(id) {
            self.changed.push(id.clone());
        }
    }

    /// Fold a follow-up report into this one.
    pub fn merge(&mut self, other: OperationReport) {
        if self.created.is_none() {
            self.created = other.created;
        }
        for id in &other.changed {
            self.mark_changed(id);
        }
        for id in other.removed {
            if !self.removed.contains(&id) {
                self.removed.push(id);
            }
        }
        self.warnings.extend(other.warnings);
    }
}
