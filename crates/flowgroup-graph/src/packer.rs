use crate::table::NodeTable;
use flowgroup_core::{EngineError, LayoutConfig, NodeId, Size, Vec2};
use tracing::debug;

/// Stack the visible direct children of `group_id` vertically below the
/// header.
///
/// Every row spans the group's inner width. Leaves get the fixed row height;
/// a nested group keeps its own height so its children still fit inside it,
/// and a minimized one keeps its square. The group grows taller when the
/// stack would overflow its bottom margin, but never shrinks.
///
/// Returns the ids whose position or size changed. The group's own id is in
/// the list when it was resized. Collapsed and minimized groups are left
/// alone.
pub fn pack(
    table: &mut NodeTable,
    group_id: &NodeId,
    config: &LayoutConfig,
) -> Result<Vec<NodeId>, EngineError> {
    let group = table.require_group(group_id)?;
    if group.state().hides_children() {
        debug!(group_id = %group_id, state = %group.state(), "Skipping pack");
        return Ok(Vec::new());
    }
    let group_size = group.size;

    let mut children: Vec<NodeId> = table
        .iter()
        .filter(|node| node.parent_id.as_ref() == Some(group_id) && node.is_visible())
        .map(|node| node.id.clone())
        .collect();
    children.sort();

    let row_width = config.inner_width(group_size.width);
    let mut changed = Vec::new();
    let mut cursor_y = config.content_top();
    let mut stack_bottom = None;

    for child_id in &children {
        let child = table.require_mut(child_id)?;
        let position = Vec2::new(config.child_padding_x, cursor_y);
        let size = if child.is_minimized() {
            child.size
        } else if child.is_group() {
            Size::new(row_width, child.size.height)
        } else {
            Size::new(row_width, config.child_row_height)
        };

        if child.position != position || child.size != size {
            child.position = position;
            child.size = size;
            changed.push(child_id.clone());
        }

        stack_bottom = Some(cursor_y + size.height);
        cursor_y += size.height + config.child_row_spacing;
    }

    if let Some(bottom) = stack_bottom {
        let needed = bottom + config.child_padding_y;
        if needed > group_size.height {
            let group = table.require_mut(group_id)?;
            group.size.height = needed;
            changed.push(group_id.clone());
        }
    }

    debug!(
        group_id = %group_id,
        children = children.len(),
        changed = changed.len(),
        "Packed group"
    );
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgroup_core::{DiagramNode, GroupState, Visibility};
    use proptest::prelude::*;

    fn group_with(children: &[(&str, bool)]) -> NodeTable {
        let mut table = NodeTable::new();
        table.insert(DiagramNode::group("g", Vec2::new(0.0, 0.0), Size::new(300.0, 200.0)));
        for (i, (id, is_group)) in children.iter().enumerate() {
            let pos = Vec2::new(17.0 * i as f32, 23.0 * i as f32);
            let node = if *is_group {
                DiagramNode::group(*id, pos, Size::new(200.0, 100.0))
            } else {
                DiagramNode::leaf(*id, pos, Size::new(150.0, 80.0))
            };
            table.insert(node.with_parent("g"));
        }
        table
    }

    #[test]
    fn test_children_stack_in_id_order() {
        let mut table = group_with(&[("b", false), ("a", false)]);
        let config = LayoutConfig::default();
        pack(&mut table, &NodeId::from("g"), &config).unwrap();

        let a = table.get(&NodeId::from("a")).unwrap();
        let b = table.get(&NodeId::from("b")).unwrap();
        assert_eq!(a.position, Vec2::new(10.0, 50.0));
        assert_eq!(a.size, Size::new(280.0, 40.0));
        assert_eq!(b.position, Vec2::new(10.0, 98.0));
        assert_eq!(table.get(&NodeId::from("g")).unwrap().size.height, 200.0);
    }

    #[test]
    fn test_nested_group_spans_inner_width_and_group_grows() {
        let mut table = group_with(&[("a", false), ("inner", true), ("z", false)]);
        let config = LayoutConfig::default();
        let changed = pack(&mut table, &NodeId::from("g"), &config).unwrap();

        let inner = table.get(&NodeId::from("inner")).unwrap();
        assert_eq!(inner.size, Size::new(280.0, 100.0));
        assert_eq!(inner.position, Vec2::new(10.0, 98.0));
        let z = table.get(&NodeId::from("z")).unwrap();
        assert_eq!(z.position, Vec2::new(10.0, 206.0));
        // 206 + 40 + 10
        assert_eq!(table.get(&NodeId::from("g")).unwrap().size.height, 256.0);
        assert!(changed.contains(&NodeId::from("g")));
    }

    #[test]
    fn test_wide_nested_group_stays_inside_parent_margins() {
        let mut table = group_with(&[("wide", true), ("tiny", true)]);
        table.get_mut(&NodeId::from("wide")).unwrap().size = Size::new(500.0, 100.0);
        {
            let tiny = table.get_mut(&NodeId::from("tiny")).unwrap();
            tiny.group_state = Some(GroupState::Minimized);
            tiny.cached_size = Some(tiny.size);
            tiny.size = Size::square(40.0);
        }
        let config = LayoutConfig::default();
        pack(&mut table, &NodeId::from("g"), &config).unwrap();

        let wide = table.get(&NodeId::from("wide")).unwrap();
        assert_eq!(wide.position, Vec2::new(10.0, 98.0));
        assert_eq!(wide.position.x + wide.size.width, 290.0);
        assert_eq!(wide.size.height, 100.0);
        let tiny = table.get(&NodeId::from("tiny")).unwrap();
        assert_eq!(tiny.size, Size::square(40.0));
        assert_eq!(tiny.position, Vec2::new(10.0, 50.0));
    }

    #[test]
    fn test_hidden_children_and_inactive_groups_are_skipped() {
        let mut table = group_with(&[("a", false), ("b", false)]);
        table.get_mut(&NodeId::from("a")).unwrap().visibility = Visibility::Hidden;
        let config = LayoutConfig::default();
        pack(&mut table, &NodeId::from("g"), &config).unwrap();
        assert_eq!(
            table.get(&NodeId::from("b")).unwrap().position,
            Vec2::new(10.0, 50.0)
        );
        assert_eq!(table.get(&NodeId::from("a")).unwrap().position, Vec2::ZERO);

        let mut table = group_with(&[("a", false), ("b", false)]);
        table.get_mut(&NodeId::from("g")).unwrap().group_state = Some(GroupState::Collapsed);
        let before = table.clone();
        assert!(pack(&mut table, &NodeId::from("g"), &config).unwrap().is_empty());
        assert_eq!(table, before);
    }

    #[test]
    fn test_pack_rejects_leaf() {
        let mut table = group_with(&[("a", false)]);
        assert_eq!(
            pack(&mut table, &NodeId::from("a"), &LayoutConfig::default()),
            Err(EngineError::NotAGroup(NodeId::from("a")))
        );
    }

    proptest! {
        #[test]
        fn prop_pack_is_idempotent(
            kinds in proptest::collection::vec(any::<bool>(), 0..12),
        ) {
            let ids: Vec<String> = (0..kinds.len()).map(|i| format!("n{i:02}")).collect();
            let children: Vec<(&str, bool)> = ids
                .iter()
                .zip(kinds.iter())
                .map(|(id, kind)| (id.as_str(), *kind))
                .collect();
            let mut table = group_with(&children);
            let config = LayoutConfig::default();
            let g = NodeId::from("g");

            pack(&mut table, &g, &config).unwrap();
            let once = table.clone();
            let second = pack(&mut table, &g, &config).unwrap();

            prop_assert!(second.is_empty());
            prop_assert_eq!(table, once);
        }
    }
}
