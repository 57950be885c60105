//! Local (parent-relative) <-> absolute (canvas) coordinates.
//!
//! Every function here is a pure query over one table snapshot, except
//! [`set_parent`], which rewrites a single row and validates first.

use crate::table::NodeTable;
use flowgroup_core::{EngineError, NodeId, Rect, Vec2};
use std::collections::HashSet;
use tracing::warn;

/// Ancestor ids of `id`, nearest parent first.
///
/// Fails with `Cycle` when the chain revisits a node. A parent reference
/// that does not resolve ends the chain.
pub fn ancestors(table: &NodeTable, id: &NodeId) -> Result<Vec<NodeId>, EngineError> {
    let mut node = table.require(id)?;
    let mut visited: HashSet<&NodeId> = HashSet::from([&node.id]);
    let mut chain = Vec::new();

    while let Some(parent_id) = node.parent_id.as_ref() {
        if !visited.insert(parent_id) {
            return Err(EngineError::Cycle(parent_id.clone()));
        }
        match table.get(parent_id) {
            Some(parent) => {
                chain.push(parent.id.clone());
                node = parent;
            }
            None => {
                warn!(
                    node_id = %node.id,
                    parent_id = %parent_id,
                    "Dangling parent reference, treating node as top-level"
                );
                break;
            }
        }
    }
    Ok(chain)
}

/// Canvas position of `id`: its local position plus every ancestor's.
pub fn to_absolute(table: &NodeTable, id: &NodeId) -> Result<Vec2, EngineError> {
    let node = table.require(id)?;
    let mut pos = node.position;
    for ancestor in ancestors(table, id)? {
        if let Some(parent) = table.get(&ancestor) {
            pos = pos + parent.position;
        }
    }
    Ok(pos)
}

/// Express a canvas point in the local space of `new_parent`.
/// Identity when `new_parent` is `None`.
pub fn to_relative(
    table: &NodeTable,
    absolute: Vec2,
    new_parent: Option<&NodeId>,
) -> Result<Vec2, EngineError> {
    match new_parent {
        None => Ok(absolute),
        Some(parent_id) => Ok(absolute - to_absolute(table, parent_id)?),
    }
}

/// Absolute bounding box of a node, using its current (possibly minimized) size.
pub fn absolute_rect(table: &NodeTable, id: &NodeId) -> Result<Rect, EngineError> {
    let pos = to_absolute(table, id)?;
    let node = table.require(id)?;
    Ok(Rect::from_pos_size(pos, node.size))
}

/// Number of ancestors. Top-level nodes have depth 0.
pub fn depth(table: &NodeTable, id: &NodeId) -> Result<usize, EngineError> {
    Ok(ancestors(table, id)?.len())
}

/// Whether `ancestor` appears on the parent chain of `id`.
pub fn is_ancestor(table: &NodeTable, ancestor: &NodeId, id: &NodeId) -> Result<bool, EngineError> {
    Ok(ancestors(table, id)?.iter().any(|a| a == ancestor))
}

/// Move `id` under `new_parent` without changing its absolute position.
///
/// Rejects a parent that is not a group, and a parent that is the node
/// itself or one of its descendants (`Cycle`). On error the table is left
/// exactly as it was.
pub fn set_parent(
    table: &mut NodeTable,
    id: &NodeId,
    new_parent: Option<&NodeId>,
) -> Result<Vec2, EngineError> {
    let absolute = to_absolute(table, id)?;

    if let Some(parent_id) = new_parent {
        table.require_group(parent_id)?;
        if parent_id == id || is_ancestor(table, id, parent_id)? {
            return Err(EngineError::Cycle(parent_id.clone()));
        }
    }

    let local = to_relative(table, absolute, new_parent)?;
    let node = table.require_mut(id)?;
    node.parent_id = new_parent.cloned();
    node.position = local;
    Ok(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgroup_core::{DiagramNode, Size};
    use proptest::prelude::*;

    fn nested() -> NodeTable {
        let mut table = NodeTable::new();
        table.insert(DiagramNode::group("outer", Vec2::new(100.0, 100.0), Size::new(600.0, 400.0)));
        table.insert(
            DiagramNode::group("inner", Vec2::new(20.0, 60.0), Size::new(300.0, 200.0))
                .with_parent("outer"),
        );
        table.insert(
            DiagramNode::leaf("leaf", Vec2::new(10.0, 50.0), Size::new(150.0, 40.0))
                .with_parent("inner"),
        );
        table
    }

    #[test]
    fn test_to_absolute_sums_parent_chain() {
        let table = nested();
        assert_eq!(
            to_absolute(&table, &NodeId::from("leaf")).unwrap(),
            Vec2::new(130.0, 210.0)
        );
        assert_eq!(
            to_absolute(&table, &NodeId::from("outer")).unwrap(),
            Vec2::new(100.0, 100.0)
        );
        assert_eq!(depth(&table, &NodeId::from("leaf")).unwrap(), 2);
    }

    #[test]
    fn test_to_relative_inverts_parent_offset() {
        let table = nested();
        let inner = NodeId::from("inner");
        assert_eq!(
            to_relative(&table, Vec2::new(130.0, 210.0), Some(&inner)).unwrap(),
            Vec2::new(10.0, 50.0)
        );
        assert_eq!(
            to_relative(&table, Vec2::new(5.0, 6.0), None).unwrap(),
            Vec2::new(5.0, 6.0)
        );
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut table = nested();
        table.get_mut(&NodeId::from("outer")).unwrap().parent_id = Some(NodeId::from("inner"));
        assert!(matches!(
            to_absolute(&table, &NodeId::from("leaf")),
            Err(EngineError::Cycle(_))
        ));
    }

    #[test]
    fn test_dangling_parent_ends_chain() {
        let mut table = NodeTable::new();
        table.insert(
            DiagramNode::leaf("orphan", Vec2::new(7.0, 8.0), Size::new(10.0, 10.0))
                .with_parent("gone"),
        );
        assert_eq!(
            to_absolute(&table, &NodeId::from("orphan")).unwrap(),
            Vec2::new(7.0, 8.0)
        );
    }

    #[test]
    fn test_set_parent_preserves_absolute_position() {
        let mut table = nested();
        let leaf = NodeId::from("leaf");
        let before = to_absolute(&table, &leaf).unwrap();

        set_parent(&mut table, &leaf, Some(&NodeId::from("outer"))).unwrap();
        assert_eq!(table.get(&leaf).unwrap().position, Vec2::new(30.0, 110.0));
        assert_eq!(to_absolute(&table, &leaf).unwrap(), before);

        set_parent(&mut table, &leaf, None).unwrap();
        assert_eq!(table.get(&leaf).unwrap().position, before);
    }

    #[test]
    fn test_set_parent_rejects_descendant_and_leaves_table_unchanged() {
        let mut table = nested();
        let snapshot = table.clone();

        let err = set_parent(&mut table, &NodeId::from("outer"), Some(&NodeId::from("inner")));
        assert_eq!(err, Err(EngineError::Cycle(NodeId::from("inner"))));
        assert_eq!(table, snapshot);

        let err = set_parent(&mut table, &NodeId::from("inner"), Some(&NodeId::from("inner")));
        assert!(matches!(err, Err(EngineError::Cycle(_))));

        let err = set_parent(&mut table, &NodeId::from("inner"), Some(&NodeId::from("leaf")));
        assert_eq!(err, Err(EngineError::NotAGroup(NodeId::from("leaf"))));
        assert_eq!(table, snapshot);
    }

    proptest! {
        #[test]
        fn prop_relative_then_absolute_round_trips(
            gx in -500i32..500, gy in -500i32..500,
            px in -500i32..500, py in -500i32..500,
            lx in -1000i32..1000, ly in -1000i32..1000,
        ) {
            let mut table = NodeTable::new();
            let parent_at = Vec2::new(px as f32, py as f32);
            table.insert(DiagramNode::group("p", parent_at, Size::new(300.0, 200.0)));
            table.insert(
                DiagramNode::group("g", Vec2::new(gx as f32, gy as f32), Size::new(300.0, 200.0))
                    .with_parent("p"),
            );
            let g = NodeId::from("g");
            let point = Vec2::new(lx as f32, ly as f32);

            let local = to_relative(&table, point, Some(&g)).unwrap();
            table.insert(DiagramNode::leaf("x", local, Size::new(10.0, 10.0)).with_parent("g"));
            let back = to_absolute(&table, &NodeId::from("x")).unwrap();

            prop_assert!((back.x - point.x).abs() < 1e-3);
            prop_assert!((back.y - point.y).abs() < 1e-3);
        }
    }
}
