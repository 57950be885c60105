use flowgroup_core::{DiagramNode, LayoutConfig, NodeId, Size, Vec2};
use flowgroup_graph::NodeTable;

/// A canvas of `group_count` top-level groups laid out on a grid, each
/// holding `leaves_per_group` leaves and one nested group with two leaves.
pub fn generate_synthetic_diagram(group_count: usize, leaves_per_group: usize) -> NodeTable {
    let config = LayoutConfig::default();
    let mut table = NodeTable::new();
    let columns = (group_count as f32).sqrt().ceil().max(1.0) as usize;

    for g in 0..group_count {
        let group_id = format!("group_{g}");
        let origin = Vec2::new(
            (g % columns) as f32 * 600.0,
            (g / columns) as f32 * 800.0,
        );
        table.insert(DiagramNode::group(
            group_id.as_str(),
            origin,
            Size::new(400.0, 600.0),
        ));

        for l in 0..leaves_per_group {
            table.insert(
                DiagramNode::leaf(
                    format!("{group_id}_leaf_{l}"),
                    Vec2::new(config.child_padding_x, config.content_top() + l as f32 * 10.0),
                    config.default_leaf_size,
                )
                .with_parent(group_id.as_str()),
            );
        }

        let nested_id = format!("{group_id}_nested");
        table.insert(
            DiagramNode::group(nested_id.as_str(), Vec2::new(20.0, 300.0), Size::new(300.0, 200.0))
                .with_parent(group_id.as_str()),
        );
        for l in 0..2 {
            table.insert(
                DiagramNode::leaf(
                    format!("{nested_id}_leaf_{l}"),
                    Vec2::new(config.child_padding_x, config.content_top()),
                    config.default_leaf_size,
                )
                .with_parent(nested_id.as_str()),
            );
        }
    }

    table
}

/// Top-level leaves scattered next to each other, ready to be grouped.
pub fn generate_loose_leaves(count: usize) -> (NodeTable, Vec<NodeId>) {
    let config = LayoutConfig::default();
    let mut table = NodeTable::new();
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let id = NodeId::from(format!("leaf_{i}"));
        table.insert(DiagramNode::leaf(
            id.clone(),
            Vec2::new((i % 10) as f32 * 180.0, (i / 10) as f32 * 60.0),
            config.default_leaf_size,
        ));
        ids.push(id);
    }
    (table, ids)
}
