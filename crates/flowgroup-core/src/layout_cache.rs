use crate::geometry::{Size, Vec2};
use crate::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Child layout of a group captured when it was minimized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupLayoutSnapshot {
    pub group_id: NodeId,
    /// Size of the group before minimizing.
    pub group_size: Option<Size>,
    /// Local position of every descendant, keyed by node id.
    pub positions: BTreeMap<NodeId, Vec2>,
}

impl GroupLayoutSnapshot {
    pub fn new(group_id: NodeId) -> Self {
        Self {
            group_id,
            group_size: None,
            positions: BTreeMap::new(),
        }
    }
}

#[derive(Error, Debug)]
pub enum LayoutCacheError {
    #[error("Layout cache backend error: {0}")]
    Backend(String),
}

/// Per-group transient layout store.
///
/// Kept separate from the diagram document so a minimize/restore round-trip
/// survives a reload even when the document was not saved in between.
pub trait LayoutCache {
    fn store_layout(&mut self, snapshot: &GroupLayoutSnapshot) -> Result<(), LayoutCacheError>;
    fn load_layout(&self, group_id: &NodeId)
    -> Result<Option<GroupLayoutSnapshot>, LayoutCacheError>;
    fn clear_layout(&mut self, group_id: &NodeId) -> Result<(), LayoutCacheError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryLayoutCache {
    entries: HashMap<NodeId, GroupLayoutSnapshot>,
}

impl InMemoryLayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LayoutCache for InMemoryLayoutCache {
    fn store_layout(&mut self, snapshot: &GroupLayoutSnapshot) -> Result<(), LayoutCacheError> {
        self.entries
            .insert(snapshot.group_id.clone(), snapshot.clone());
        Ok(())
    }

    fn load_layout(
        &self,
        group_id: &NodeId,
    ) -> Result<Option<GroupLayoutSnapshot>, LayoutCacheError> {
        Ok(self.entries.get(group_id).cloned())
    }

    fn clear_layout(&mut self, group_id: &NodeId) -> Result<(), LayoutCacheError> {
        self.entries.remove(group_id);
        Ok(())
    }
}
