use flowgroup_core::{DiagramNode, EngineError, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::ops::{Index, IndexMut};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(pub usize);

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Flat node table owned by the editing session.
///
/// Parent/child is a relation between rows (`parent_id`), never nested
/// ownership, so deleting or reparenting a group cannot leave dangling
/// owners behind. Rows keep insertion order, which is also the paint order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<DiagramNode>", into = "Vec<DiagramNode>")]
pub struct NodeTable {
    nodes: Vec<DiagramNode>,
    node_map: HashMap<NodeId, NodeIndex>,
}

impl From<Vec<DiagramNode>> for NodeTable {
    fn from(nodes: Vec<DiagramNode>) -> Self {
        let mut table = NodeTable::new();
        for node in nodes {
            table.insert(node);
        }
        table
    }
}

impl From<NodeTable> for Vec<DiagramNode> {
    fn from(table: NodeTable) -> Self {
        table.nodes
    }
}

impl NodeTable {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            node_map: HashMap::new(),
        }
    }

    /// Insert a node, replacing any existing row with the same id in place.
    pub fn insert(&mut self, node: DiagramNode) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(&node.id) {
            self.nodes[idx.0] = node;
            return idx;
        }
        let idx = NodeIndex(self.nodes.len());
        self.node_map.insert(node.id.clone(), idx);
        self.nodes.push(node);
        idx
    }

    /// Remove a set of rows. Returns the ids that were actually present.
    pub fn remove_many(&mut self, ids: &HashSet<NodeId>) -> Vec<NodeId> {
        let mut removed = Vec::new();
        self.nodes.retain(|node| {
            if ids.contains(&node.id) {
                removed.push(node.id.clone());
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            self.rebuild_index();
        }
        removed
    }

    pub fn remove(&mut self, id: &NodeId) -> Option<DiagramNode> {
        let idx = self.node_map.get(id).copied()?;
        let node = self.nodes.remove(idx.0);
        self.rebuild_index();
        Some(node)
    }

    fn rebuild_index(&mut self) {
        self.node_map.clear();
        for (i, node) in self.nodes.iter().enumerate() {
            self.node_map.insert(node.id.clone(), NodeIndex(i));
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.node_map.contains_key(id)
    }

    pub fn index_of(&self, id: &NodeId) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }

    pub fn get(&self, id: &NodeId) -> Option<&DiagramNode> {
        self.node_map.get(id).map(|&idx| &self.nodes[idx.0])
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut DiagramNode> {
        self.node_map.get(id).map(|&idx| &mut self.nodes[idx.0])
    }

    pub fn require(&self, id: &NodeId) -> Result<&DiagramNode, EngineError> {
        self.get(id)
            .ok_or_else(|| EngineError::NodeNotFound(id.clone()))
    }

    pub fn require_mut(&mut self, id: &NodeId) -> Result<&mut DiagramNode, EngineError> {
        self.get_mut(id)
            .ok_or_else(|| EngineError::NodeNotFound(id.clone()))
    }

    pub fn require_group(&self, id: &NodeId) -> Result<&DiagramNode, EngineError> {
        let node = self.require(id)?;
        if node.is_group() {
            Ok(node)
        } else {
            Err(EngineError::NotAGroup(id.clone()))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiagramNode> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DiagramNode> {
        self.nodes.iter_mut()
    }

    pub fn groups(&self) -> impl Iterator<Item = &DiagramNode> {
        self.nodes.iter().filter(|node| node.is_group())
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id.clone()).collect()
    }

    /// Direct children of `parent`, in table order.
    pub fn children_of(&self, parent: &NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.parent_id.as_ref() == Some(parent))
            .map(|node| node.id.clone())
            .collect()
    }

    /// Every node whose parent chain includes `root`, breadth first.
    /// `root` itself is not included.
    pub fn descendants_of(&self, root: &NodeId) -> Vec<NodeId> {
        let mut children: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for node in &self.nodes {
            if let Some(parent) = &node.parent_id {
                children.entry(parent).or_default().push(&node.id);
            }
        }

        let mut out = Vec::new();
        let mut seen: HashSet<&NodeId> = HashSet::new();
        seen.insert(root);
        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            if let Some(kids) = children.get(current) {
                for &kid in kids {
                    // Guard against malformed cyclic tables.
                    if seen.insert(kid) {
                        out.push(kid.clone());
                        queue.push_back(kid);
                    }
                }
            }
        }
        out
    }

    /// Check the structural invariants of a table loaded from outside:
    /// parents exist and are groups, no ancestor cycles, and `cached_size`
    /// is present exactly on minimized groups.
    pub fn validate(&self) -> Result<(), TableIssue> {
        for node in &self.nodes {
            if let Some(parent_id) = &node.parent_id {
                match self.get(parent_id) {
                    None => {
                        return Err(TableIssue::MissingParent {
                            node: node.id.clone(),
                            parent: parent_id.clone(),
                        });
                    }
                    Some(parent) if !parent.is_group() => {
                        return Err(TableIssue::ParentNotGroup {
                            node: node.id.clone(),
                            parent: parent_id.clone(),
                        });
                    }
                    Some(_) => {}
                }
            }
            if node.cached_size.is_some() != node.is_minimized() {
                return Err(TableIssue::CacheMismatch(node.id.clone()));
            }
            crate::transform::ancestors(self, &node.id)?;
        }
        Ok(())
    }
}

/// Reason a table failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableIssue {
    #[error("node {node} references missing parent {parent}")]
    MissingParent { node: NodeId, parent: NodeId },
    #[error("node {node} has non-group parent {parent}")]
    ParentNotGroup { node: NodeId, parent: NodeId },
    #[error("group {0} cached size does not match its minimized state")]
    CacheMismatch(NodeId),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl Index<NodeIndex> for NodeTable {
    type Output = DiagramNode;
    fn index(&self, index: NodeIndex) -> &Self::Output {
        &self.nodes[index.0]
    }
}

impl IndexMut<NodeIndex> for NodeTable {
    fn index_mut(&mut self, index: NodeIndex) -> &mut Self::Output {
        &mut self.nodes[index.0]
    }
}
