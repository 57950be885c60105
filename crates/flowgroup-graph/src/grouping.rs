use crate::lifecycle;
use crate::table::NodeTable;
use crate::transform;
use flowgroup_core::{
    DiagramNode, EngineError, EngineWarning, LayoutCache, LayoutConfig, NodeId, OperationReport,
    Provider, Rect, Size, Vec2, Viewport, Visibility,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Table edit plus the groups whose children need re-packing afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditOutcome {
    pub report: OperationReport,
    pub pack: Vec<NodeId>,
}

impl EditOutcome {
    pub fn warning(warning: EngineWarning) -> Self {
        warn!(%warning, "Edit skipped");
        Self {
            report: OperationReport::warning(warning),
            pack: Vec::new(),
        }
    }

    pub(crate) fn schedule_pack(&mut self, group_id: &NodeId) {
        if !self.pack.contains(group_id) {
            self.pack.push(group_id.clone());
        }
    }
}

/// What happens to the children of a deleted group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChildPolicy {
    /// Remove the whole subtree with the group.
    #[default]
    Delete,
    /// Move the children to the deleted group's parent, keeping their
    /// absolute positions.
    Promote,
}

/// Most common provider; the first one seen wins ties.
pub fn dominant_provider<I: IntoIterator<Item = Provider>>(providers: I) -> Provider {
    let mut counts: Vec<(Provider, usize)> = Vec::new();
    for provider in providers {
        match counts.iter_mut().find(|(p, _)| *p == provider) {
            Some((_, count)) => *count += 1,
            None => counts.push((provider, 1)),
        }
    }
    let mut best: Option<(Provider, usize)> = None;
    for (provider, count) in counts {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((provider, count));
        }
    }
    best.map(|(provider, _)| provider).unwrap_or_default()
}

/// Absolute box of a new group wrapping `members`: their union padded by the
/// grouping margins and raised to the minimum expanded size.
pub fn grouping_box(members: &[Rect], config: &LayoutConfig) -> Option<Rect> {
    let union = Rect::bounding(members.iter().copied())?;
    let min = Vec2::new(
        union.min.x - config.grouping_padding_x,
        union.min.y - config.grouping_padding_top,
    );
    let width = (union.width() + 2.0 * config.grouping_padding_x)
        .max(config.min_expanded_group_size.width);
    let height = (union.height() + config.grouping_padding_top + config.grouping_padding_bottom)
        .max(config.min_expanded_group_size.height);
    Some(Rect::from_pos_size(min, Size::new(width, height)))
}

/// Drop ids whose ancestor is also in the list; they travel with it.
fn outermost(table: &NodeTable, ids: &[NodeId]) -> Result<Vec<NodeId>, EngineError> {
    let selected: HashSet<&NodeId> = ids.iter().collect();
    let mut out = Vec::new();
    for id in ids {
        let ancestors = transform::ancestors(table, id)?;
        if !ancestors.iter().any(|a| selected.contains(a)) && !out.contains(id) {
            out.push(id.clone());
        }
    }
    Ok(out)
}

/// Wrap `ids` in a new group called `group_id`.
///
/// The new group sits under the members' common parent when they all share
/// one, otherwise at the top level. Members keep their absolute positions
/// and are deselected. Fewer than two members is an `InvalidSelection`.
pub fn group_nodes(
    table: &mut NodeTable,
    ids: &[NodeId],
    group_id: NodeId,
    config: &LayoutConfig,
) -> Result<EditOutcome, EngineError> {
    if table.contains(&group_id) {
        return Err(EngineError::DuplicateId(group_id));
    }
    for id in ids {
        table.require(id)?;
    }
    let members = outermost(table, ids)?;
    if members.len() < 2 {
        return Ok(EditOutcome::warning(EngineWarning::InvalidSelection {
            reason: format!("grouping needs at least two nodes, got {}", members.len()),
        }));
    }

    let mut absolute: HashMap<NodeId, Vec2> = HashMap::new();
    let mut rects = Vec::with_capacity(members.len());
    for id in &members {
        let rect = transform::absolute_rect(table, id)?;
        absolute.insert(id.clone(), rect.min);
        rects.push(rect);
    }
    let Some(bounds) = grouping_box(&rects, config) else {
        return Ok(EditOutcome::default());
    };

    let first_parent = table.require(&members[0])?.parent_id.clone();
    let common_parent = if members
        .iter()
        .all(|id| table.get(id).map(|n| &n.parent_id) == Some(&first_parent))
    {
        first_parent
    } else {
        None
    };

    let provider = dominant_provider(
        members
            .iter()
            .filter_map(|id| table.get(id).map(|n| n.provider)),
    );
    let local = transform::to_relative(table, bounds.min, common_parent.as_ref())?;

    let mut group = DiagramNode::group(group_id.clone(), local, bounds.size())
        .with_provider(provider)
        .with_label("Group");
    group.parent_id = common_parent.clone();
    if let Some(parent) = &common_parent {
        group.visibility = Visibility::from_hidden(
            table.require(parent)?.state().hides_children()
                || lifecycle::hidden_by_ancestor(table, parent)?,
        );
    }
    table.insert(group);

    let mut outcome = EditOutcome::default();
    outcome.report.created = Some(group_id.clone());
    for id in &members {
        let node = table.require_mut(id)?;
        node.parent_id = Some(group_id.clone());
        node.position = absolute[id] - bounds.min;
        node.selected = false;
        outcome.report.mark_changed(id);
    }

    outcome.schedule_pack(&group_id);
    if let Some(parent) = &common_parent {
        outcome.schedule_pack(parent);
    }
    debug!(
        group_id = %group_id,
        members = members.len(),
        provider = %provider,
        "Grouped nodes"
    );
    Ok(outcome)
}

/// Dissolve `targets`: every child moves to the top level at its absolute
/// position, becomes visible and unselected, then the groups are deleted
/// and their cached layouts dropped.
pub fn ungroup(
    table: &mut NodeTable,
    cache: &mut dyn LayoutCache,
    targets: &[NodeId],
) -> Result<EditOutcome, EngineError> {
    if targets.is_empty() {
        return Ok(EditOutcome::warning(EngineWarning::InvalidSelection {
            reason: "no group to ungroup".to_string(),
        }));
    }
    for id in targets {
        table.require_group(id)?;
    }
    let target_set: HashSet<&NodeId> = targets.iter().collect();

    // Absolute positions all come from the table as it was before the edit.
    let mut promoted = Vec::new();
    for node in table.iter() {
        if let Some(parent) = &node.parent_id {
            if target_set.contains(parent) && !target_set.contains(&node.id) {
                promoted.push(node.id.clone());
            }
        }
    }
    let mut absolute = HashMap::new();
    for id in &promoted {
        absolute.insert(id.clone(), transform::to_absolute(table, id)?);
    }

    let mut outcome = EditOutcome::default();
    for id in &promoted {
        let node = table.require_mut(id)?;
        node.parent_id = None;
        node.position = absolute[id];
        node.visibility = Visibility::Visible;
        node.selected = false;
        outcome.report.mark_changed(id);
    }
    let doomed: HashSet<NodeId> = targets.iter().cloned().collect();
    let removed = table.remove_many(&doomed);
    for id in &promoted {
        for flipped in lifecycle::recompute_visibility(table, id)? {
            outcome.report.mark_changed(&flipped);
        }
    }
    for id in &removed {
        if let Err(error) = cache.clear_layout(id) {
            warn!(group_id = %id, %error, "Failed to clear group layout");
        }
    }
    outcome.report.removed = removed;

    debug!(
        groups = targets.len(),
        promoted = promoted.len(),
        "Ungrouped"
    );
    Ok(outcome)
}

/// Add an empty top-level group of the default size centered in the viewport.
pub fn create_empty_group(
    table: &mut NodeTable,
    group_id: NodeId,
    viewport: &Viewport,
    provider: Provider,
    config: &LayoutConfig,
) -> EditOutcome {
    let size = config.default_group_size;
    let center = viewport.center();
    let position = Vec2::new(center.x - size.width / 2.0, center.y - size.height / 2.0);
    table.insert(
        DiagramNode::group(group_id.clone(), position, size)
            .with_provider(provider)
            .with_label("Group"),
    );
    let mut outcome = EditOutcome::default();
    outcome.report.created = Some(group_id);
    outcome
}

/// Remove `ids` from the table. Children of deleted groups are removed too
/// or promoted to the group's parent, per `policy`.
pub fn delete_nodes(
    table: &mut NodeTable,
    cache: &mut dyn LayoutCache,
    ids: &[NodeId],
    policy: ChildPolicy,
) -> Result<EditOutcome, EngineError> {
    for id in ids {
        table.require(id)?;
    }
    let mut outcome = EditOutcome::default();

    for id in ids {
        let Some(node) = table.get(id) else {
            // Already removed along with an ancestor.
            continue;
        };
        let parent = node.parent_id.clone();

        let mut doomed: HashSet<NodeId> = HashSet::from([id.clone()]);
        match policy {
            ChildPolicy::Delete => doomed.extend(table.descendants_of(id)),
            ChildPolicy::Promote => {
                for child in table.children_of(id) {
                    transform::set_parent(table, &child, parent.as_ref())?;
                    outcome.report.mark_changed(&child);
                }
            }
        }

        for removed in table.remove_many(&doomed) {
            if let Err(error) = cache.clear_layout(&removed) {
                warn!(node_id = %removed, %error, "Failed to clear group layout");
            }
            outcome.report.removed.push(removed);
        }

        if policy == ChildPolicy::Promote {
            let promoted: Vec<NodeId> = outcome
                .report
                .changed
                .iter()
                .filter(|c| table.get(c).is_some_and(|n| n.parent_id == parent))
                .cloned()
                .collect();
            for child in promoted {
                let hidden = lifecycle::hidden_by_ancestor(table, &child)?;
                table.require_mut(&child)?.visibility = Visibility::from_hidden(hidden);
                for flipped in lifecycle::recompute_visibility(table, &child)? {
                    outcome.report.mark_changed(&flipped);
                }
            }
            if let Some(parent) = &parent {
                outcome.schedule_pack(parent);
            }
        }
    }

    let removed: HashSet<&NodeId> = outcome.report.removed.iter().collect();
    outcome.report.changed.retain(|id| !removed.contains(id));
    let pack: Vec<NodeId> = outcome
        .pack
        .iter()
        .filter(|id| table.contains(id))
        .cloned()
        .collect();
    outcome.pack = pack;

    debug!(removed = outcome.report.removed.len(), ?policy, "Deleted nodes");
    Ok(outcome)
}

pub fn rename_node(
    table: &mut NodeTable,
    id: &NodeId,
    label: &str,
) -> Result<EditOutcome, EngineError> {
    let node = table.require_mut(id)?;
    let mut outcome = EditOutcome::default();
    if node.label != label {
        node.label = label.to_string();
        outcome.report.mark_changed(id);
    }
    Ok(outcome)
}

/// Copy a leaf next to itself inside the same parent. The copy is offset
/// and clamped into the parent, and starts unselected.
pub fn duplicate_leaf(
    table: &mut NodeTable,
    id: &NodeId,
    new_id: NodeId,
    config: &LayoutConfig,
) -> Result<EditOutcome, EngineError> {
    if table.contains(&new_id) {
        return Err(EngineError::DuplicateId(new_id));
    }
    let source = table.require(id)?;
    if !source.is_leaf() {
        return Ok(EditOutcome::warning(EngineWarning::InvalidSelection {
            reason: format!("only resources can be duplicated, {id} is a group"),
        }));
    }

    let mut copy = source.clone();
    copy.id = new_id.clone();
    copy.selected = false;
    copy.position = copy.position + Vec2::new(config.duplicate_offset, config.duplicate_offset);
    if let Some(parent_id) = &copy.parent_id {
        let parent_size = table.require(parent_id)?.size;
        copy.position = config.clamp_child_position(copy.position, copy.size, parent_size);
    }
    let parent = copy.parent_id.clone();
    table.insert(copy);

    let mut outcome = EditOutcome::default();
    outcome.report.created = Some(new_id);
    if let Some(parent) = &parent {
        outcome.schedule_pack(parent);
    }
    Ok(outcome)
}
