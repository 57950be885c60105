use crate::containment;
use crate::grouping::EditOutcome;
use crate::lifecycle;
use crate::table::NodeTable;
use crate::transform;
use flowgroup_core::{
    DiagramNode, EngineError, LayoutConfig, NodeId, Provider, Size, Vec2, Visibility,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// An in-progress drag. Nothing in the table changes until the drop.
#[derive(Debug, Clone, PartialEq)]
pub struct DragState {
    pub node_id: NodeId,
    pub origin_parent: Option<NodeId>,
    pub origin_position: Vec2,
    /// Local position the renderer should draw while dragging.
    pub preview: Vec2,
}

/// Sidebar entry a new resource is created from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    pub label: String,
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub size: Option<Size>,
}

impl ResourceTemplate {
    pub fn new(label: impl Into<String>, provider: Provider) -> Self {
        Self {
            label: label.into(),
            provider,
            size: None,
        }
    }
}

pub fn begin_drag(table: &NodeTable, id: &NodeId) -> Result<DragState, EngineError> {
    let node = table.require(id)?;
    Ok(DragState {
        node_id: id.clone(),
        origin_parent: node.parent_id.clone(),
        origin_position: node.position,
        preview: node.position,
    })
}

/// Move the preview to the canvas point `point`.
///
/// While the node stays in its current parent the candidate local position
/// is clamped on every move, so the preview never leaves the parent's
/// margins.
pub fn drag_to(
    table: &NodeTable,
    state: &mut DragState,
    point: Vec2,
    config: &LayoutConfig,
) -> Result<Vec2, EngineError> {
    let node = table.require(&state.node_id)?;
    let preview = match &state.origin_parent {
        Some(parent_id) => {
            let parent = table.require(parent_id)?;
            let local = transform::to_relative(table, point, Some(parent_id))?;
            config.clamp_child_position(local, node.size, parent.size)
        }
        None => point,
    };
    state.preview = preview;
    Ok(preview)
}

/// Clamp a node that was just parented under `group_id` into the group's
/// margins and take its visibility from the group's chain. A minimized
/// group is measured at the size it will be restored to.
fn settle_in_group(
    table: &mut NodeTable,
    id: &NodeId,
    group_id: &NodeId,
    config: &LayoutConfig,
) -> Result<(), EngineError> {
    let group = table.require_group(group_id)?;
    let group_size = group.cached_size.unwrap_or(group.size);
    let hidden =
        group.state().hides_children() || lifecycle::hidden_by_ancestor(table, group_id)?;

    let node = table.require_mut(id)?;
    node.position = config.clamp_child_position(node.position, node.size, group_size);
    node.visibility = Visibility::from_hidden(hidden);
    Ok(())
}

/// Put `id` at the canvas point `point`, reparenting it into the innermost
/// group under the point (excluding its own subtree), or to the top level.
pub fn place_at(
    table: &mut NodeTable,
    id: &NodeId,
    point: Vec2,
    config: &LayoutConfig,
) -> Result<EditOutcome, EngineError> {
    let container = containment::container_at(table, point, Some(id), config.containment_margin)?;
    let mut outcome = EditOutcome::default();

    match &container {
        Some(group_id) => {
            if group_id == id || transform::is_ancestor(table, id, group_id)? {
                return Err(EngineError::Cycle(group_id.clone()));
            }
            table.require_group(group_id)?;
            let local = transform::to_relative(table, point, Some(group_id))?;
            let node = table.require_mut(id)?;
            node.parent_id = Some(group_id.clone());
            node.position = local;
            settle_in_group(table, id, group_id, config)?;
            outcome.schedule_pack(group_id);
        }
        None => {
            let node = table.require_mut(id)?;
            node.parent_id = None;
            node.position = point;
            node.visibility = Visibility::Visible;
        }
    }
    outcome.report.mark_changed(id);
    for flipped in lifecycle::recompute_visibility(table, id)? {
        outcome.report.mark_changed(&flipped);
    }

    debug!(node_id = %id, container = ?container, "Placed node");
    Ok(outcome)
}

/// Move `id` under `new_parent` (or to the top level) keeping its absolute
/// position, then clamp it into the new parent and recompute the visibility
/// of its whole subtree.
pub fn reparent(
    table: &mut NodeTable,
    id: &NodeId,
    new_parent: Option<&NodeId>,
    config: &LayoutConfig,
) -> Result<EditOutcome, EngineError> {
    transform::set_parent(table, id, new_parent)?;
    let mut outcome = EditOutcome::default();

    match new_parent {
        Some(group_id) => {
            settle_in_group(table, id, group_id, config)?;
            outcome.schedule_pack(group_id);
        }
        None => table.require_mut(id)?.visibility = Visibility::Visible,
    }
    outcome.report.mark_changed(id);
    for flipped in lifecycle::recompute_visibility(table, id)? {
        outcome.report.mark_changed(&flipped);
    }

    debug!(node_id = %id, parent = ?new_parent, "Reparented node");
    Ok(outcome)
}

/// Commit a drag at `point`.
pub fn drop_at(
    table: &mut NodeTable,
    state: &DragState,
    point: Vec2,
    config: &LayoutConfig,
) -> Result<EditOutcome, EngineError> {
    place_at(table, &state.node_id, point, config)
}

/// Create a leaf from a sidebar template and place it at `point`.
pub fn drop_new_resource(
    table: &mut NodeTable,
    template: &ResourceTemplate,
    new_id: NodeId,
    point: Vec2,
    config: &LayoutConfig,
) -> Result<EditOutcome, EngineError> {
    if table.contains(&new_id) {
        return Err(EngineError::DuplicateId(new_id));
    }
    let size = template.size.unwrap_or(config.default_leaf_size);
    table.insert(
        DiagramNode::leaf(new_id.clone(), point, size)
            .with_label(template.label.clone())
            .with_provider(template.provider),
    );
    let mut outcome = place_at(table, &new_id, point, config)?;
    outcome.report.changed.retain(|id| id != &new_id);
    outcome.report.created = Some(new_id);
    Ok(outcome)
}
