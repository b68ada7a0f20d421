//! Mutation records queued by the document for the change watcher.

use super::NodeId;

/// A single tree change, in the order it happened.
///
/// Records are only queued for targets connected to the document, which
/// mirrors a subtree observer registered on the document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRecord {
    /// Children were inserted into or removed from `target`.
    ChildList {
        target: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },

    /// Attribute `name` on `target` was set or removed.
    Attributes {
        target: NodeId,
        name: String,
        old_value: Option<String>,
    },
}

impl MutationRecord {
    pub fn target(&self) -> NodeId {
        match self {
            MutationRecord::ChildList { target, .. } => *target,
            MutationRecord::Attributes { target, .. } => *target,
        }
    }
}
