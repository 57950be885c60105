//! Expand / collapse / minimize / restore for groups.
//!
//! Structural lookups (`NodeNotFound`, `NotAGroup`) are the only errors.
//! Transitions that do not apply to the group's current state come back as
//! `IgnoredTransition` warnings, and layout cache failures are logged and
//! degrade to fallbacks.

use crate::table::NodeTable;
use crate::transform;
use flowgroup_core::{
    EngineError, EngineWarning, GroupLayoutSnapshot, GroupState, LayoutCache, LayoutConfig,
    NodeId, OperationReport, Size, Visibility,
};
use tracing::{debug, warn};

/// Result of a lifecycle transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LifecycleOutcome {
    pub report: OperationReport,
    /// `(from, to)` when the group's state actually changed.
    pub transition: Option<(GroupState, GroupState)>,
    /// The group's children should be re-packed once the mutation settles.
    pub schedule_pack: bool,
}

impl LifecycleOutcome {
    fn ignored(group_id: &NodeId, state: GroupState, requested: &str) -> Self {
        warn!(group_id = %group_id, state = %state, requested, "Ignoring group transition");
        Self {
            report: OperationReport::warning(EngineWarning::IgnoredTransition {
                group_id: group_id.clone(),
                state,
                requested: requested.to_string(),
            }),
            ..Self::default()
        }
    }
}

/// Whether any ancestor of `id` is collapsed or minimized.
pub fn hidden_by_ancestor(table: &NodeTable, id: &NodeId) -> Result<bool, EngineError> {
    for ancestor in transform::ancestors(table, id)? {
        if let Some(node) = table.get(&ancestor) {
            if node.is_group() && node.state().hides_children() {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Recompute the visibility of every descendant of `root` from its own
/// ancestor chain. Returns the ids whose visibility flipped.
pub fn recompute_visibility(
    table: &mut NodeTable,
    root: &NodeId,
) -> Result<Vec<NodeId>, EngineError> {
    let mut flipped = Vec::new();
    for id in table.descendants_of(root) {
        let visibility = Visibility::from_hidden(hidden_by_ancestor(table, &id)?);
        let node = table.require_mut(&id)?;
        if node.visibility != visibility {
            node.visibility = visibility;
            flipped.push(id);
        }
    }
    Ok(flipped)
}

fn hide_descendants(table: &mut NodeTable, root: &NodeId, report: &mut OperationReport) {
    for id in table.descendants_of(root) {
        if let Some(node) = table.get_mut(&id) {
            if node.visibility != Visibility::Hidden {
                node.visibility = Visibility::Hidden;
                report.mark_changed(&id);
            }
        }
    }
}

/// Clamp every direct leaf child of `group_id` into the group's current
/// size minus the margins.
pub fn clamp_leaf_children(
    table: &mut NodeTable,
    group_id: &NodeId,
    config: &LayoutConfig,
) -> Result<Vec<NodeId>, EngineError> {
    let parent_size = table.require_group(group_id)?.size;
    let mut moved = Vec::new();
    for id in table.children_of(group_id) {
        let node = table.require_mut(&id)?;
        if !node.is_leaf() {
            continue;
        }
        let clamped = config.clamp_child_position(node.position, node.size, parent_size);
        if clamped != node.position {
            node.position = clamped;
            moved.push(id);
        }
    }
    Ok(moved)
}

/// Flip a group between expanded and collapsed.
///
/// Collapsing hides every descendant without touching coordinates.
/// Expanding recomputes descendant visibility, re-clamps direct leaves and
/// asks for a packer pass. Minimized groups are ignored.
pub fn toggle_collapse(
    table: &mut NodeTable,
    group_id: &NodeId,
    config: &LayoutConfig,
) -> Result<LifecycleOutcome, EngineError> {
    let from = table.require_group(group_id)?.state();
    let mut outcome = LifecycleOutcome::default();

    match from {
        GroupState::Minimized => {
            return Ok(LifecycleOutcome::ignored(group_id, from, "toggle collapse"));
        }
        GroupState::Expanded => {
            table.require_mut(group_id)?.group_state = Some(GroupState::Collapsed);
            hide_descendants(table, group_id, &mut outcome.report);
            outcome.transition = Some((from, GroupState::Collapsed));
        }
        GroupState::Collapsed => {
            table.require_mut(group_id)?.group_state = Some(GroupState::Expanded);
            for id in recompute_visibility(table, group_id)? {
                outcome.report.mark_changed(&id);
            }
            for id in clamp_leaf_children(table, group_id, config)? {
                outcome.report.mark_changed(&id);
            }
            outcome.transition = Some((from, GroupState::Expanded));
            outcome.schedule_pack = true;
        }
    }

    outcome.report.mark_changed(group_id);
    debug!(group_id = %group_id, transition = ?outcome.transition, "Toggled collapse");
    Ok(outcome)
}

/// User resize of an expanded group.
///
/// The requested size is raised to the minimum expanded size, direct leaves
/// are re-clamped into the new box and a packer pass is requested.
/// Collapsed and minimized groups cannot be resized.
pub fn resize_group(
    table: &mut NodeTable,
    group_id: &NodeId,
    requested: Size,
    config: &LayoutConfig,
) -> Result<LifecycleOutcome, EngineError> {
    let state = table.require_group(group_id)?.state();
    if state != GroupState::Expanded {
        return Ok(LifecycleOutcome::ignored(group_id, state, "resize"));
    }

    let min = config.min_expanded_group_size;
    let size = Size::new(
        requested.width.max(min.width),
        requested.height.max(min.height),
    );
    let mut outcome = LifecycleOutcome {
        schedule_pack: true,
        ..LifecycleOutcome::default()
    };

    let group = table.require_mut(group_id)?;
    if group.size != size {
        group.size = size;
        outcome.report.mark_changed(group_id);
    }
    for id in clamp_leaf_children(table, group_id, config)? {
        outcome.report.mark_changed(&id);
    }

    debug!(group_id = %group_id, width = size.width, height = size.height, "Resized group");
    Ok(outcome)
}

/// Shrink a group to the minimized square.
///
/// The full size goes to `cached_size`; every descendant's local position is
/// written to the layout cache keyed by the group id; descendants are hidden.
pub fn minimize(
    table: &mut NodeTable,
    cache: &mut dyn LayoutCache,
    group_id: &NodeId,
    config: &LayoutConfig,
) -> Result<LifecycleOutcome, EngineError> {
    let group = table.require_group(group_id)?;
    let from = group.state();
    if from == GroupState::Minimized {
        return Ok(LifecycleOutcome::ignored(group_id, from, "minimize"));
    }
    let full_size = group.size;

    let mut snapshot = GroupLayoutSnapshot::new(group_id.clone());
    snapshot.group_size = Some(full_size);
    for id in table.descendants_of(group_id) {
        if let Some(node) = table.get(&id) {
            snapshot.positions.insert(id, node.position);
        }
    }
    if let Err(error) = cache.store_layout(&snapshot) {
        warn!(group_id = %group_id, %error, "Failed to store group layout");
    }

    let group = table.require_mut(group_id)?;
    group.cached_size = Some(full_size);
    group.size = config.minimized_size();
    group.group_state = Some(GroupState::Minimized);

    let mut outcome = LifecycleOutcome {
        transition: Some((from, GroupState::Minimized)),
        ..LifecycleOutcome::default()
    };
    outcome.report.mark_changed(group_id);
    hide_descendants(table, group_id, &mut outcome.report);

    debug!(
        group_id = %group_id,
        children = snapshot.positions.len(),
        "Minimized group"
    );
    Ok(outcome)
}

/// Bring a minimized group back to expanded.
///
/// Size comes from `cached_size`; when that is missing the cached snapshot's
/// size is used, else the default group size, and a `MissingCache` warning
/// is reported. Descendant positions present in the snapshot are restored,
/// the snapshot is consumed and a packer pass is requested.
pub fn restore(
    table: &mut NodeTable,
    cache: &mut dyn LayoutCache,
    group_id: &NodeId,
    config: &LayoutConfig,
) -> Result<LifecycleOutcome, EngineError> {
    let from = table.require_group(group_id)?.state();
    if from != GroupState::Minimized {
        return Ok(LifecycleOutcome::ignored(group_id, from, "restore"));
    }

    let snapshot = match cache.load_layout(group_id) {
        Ok(snapshot) => snapshot,
        Err(error) => {
            warn!(group_id = %group_id, %error, "Failed to load group layout");
            None
        }
    };

    let mut outcome = LifecycleOutcome {
        transition: Some((from, GroupState::Expanded)),
        schedule_pack: true,
        ..LifecycleOutcome::default()
    };

    let group = table.require_mut(group_id)?;
    let size = match group.cached_size.take() {
        Some(size) => size,
        None => {
            warn!(group_id = %group_id, "Minimized group had no cached size");
            outcome.report.warnings.push(EngineWarning::MissingCache {
                group_id: group_id.clone(),
            });
            snapshot
                .as_ref()
                .and_then(|snapshot| snapshot.group_size)
                .unwrap_or(config.default_group_size)
        }
    };
    group.size = size;
    group.group_state = Some(GroupState::Expanded);
    outcome.report.mark_changed(group_id);

    if let Some(snapshot) = &snapshot {
        for id in table.descendants_of(group_id) {
            if let Some(position) = snapshot.positions.get(&id) {
                let node = table.require_mut(&id)?;
                if node.position != *position {
                    node.position = *position;
                    outcome.report.mark_changed(&id);
                }
            }
        }
    }

    for id in recompute_visibility(table, group_id)? {
        outcome.report.mark_changed(&id);
    }

    if let Err(error) = cache.clear_layout(group_id) {
        warn!(group_id = %group_id, %error, "Failed to clear group layout");
    }

    debug!(
        group_id = %group_id,
        restored = snapshot.as_ref().map_or(0, |s| s.positions.len()),
        "Restored group"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgroup_core::{DiagramNode, InMemoryLayoutCache, LayoutCacheError, Vec2};
    use proptest::prelude::*;

    fn nested() -> NodeTable {
        let mut table = NodeTable::new();
        table.insert(DiagramNode::group("g", Vec2::new(0.0, 0.0), Size::new(300.0, 200.0)));
        table.insert(
            DiagramNode::group("inner", Vec2::new(10.0, 50.0), Size::new(200.0, 120.0))
                .with_parent("g"),
        );
        table.insert(
            DiagramNode::leaf("a", Vec2::new(30.0, 60.0), Size::new(150.0, 40.0))
                .with_parent("inner"),
        );
        table.insert(
            DiagramNode::leaf("b", Vec2::new(10.0, 150.0), Size::new(150.0, 40.0))
                .with_parent("g"),
        );
        table
    }

    struct FailingCache;

    impl LayoutCache for FailingCache {
        fn store_layout(&mut self, _: &GroupLayoutSnapshot) -> Result<(), LayoutCacheError> {
            Err(LayoutCacheError::Backend("disk full".into()))
        }
        fn load_layout(&self, _: &NodeId) -> Result<Option<GroupLayoutSnapshot>, LayoutCacheError> {
            Err(LayoutCacheError::Backend("disk full".into()))
        }
        fn clear_layout(&mut self, _: &NodeId) -> Result<(), LayoutCacheError> {
            Err(LayoutCacheError::Backend("disk full".into()))
        }
    }

    #[test]
    fn test_minimize_then_restore_reproduces_size() {
        let mut table = nested();
        let mut cache = InMemoryLayoutCache::new();
        let config = LayoutConfig::default();
        let g = NodeId::from("g");

        let outcome = minimize(&mut table, &mut cache, &g, &config).unwrap();
        assert_eq!(outcome.transition, Some((GroupState::Expanded, GroupState::Minimized)));
        let group = table.get(&g).unwrap();
        assert_eq!(group.size, Size::new(40.0, 40.0));
        assert_eq!(group.cached_size, Some(Size::new(300.0, 200.0)));
        assert!(table.descendants_of(&g).iter().all(|id| !table.get(id).unwrap().is_visible()));
        assert_eq!(cache.len(), 1);

        let outcome = restore(&mut table, &mut cache, &g, &config).unwrap();
        assert!(outcome.schedule_pack);
        assert!(outcome.report.warnings.is_empty());
        let group = table.get(&g).unwrap();
        assert_eq!(group.size, Size::new(300.0, 200.0));
        assert_eq!(group.cached_size, None);
        assert_eq!(group.state(), GroupState::Expanded);
        assert!(cache.is_empty());
        assert_eq!(table, nested());
    }

    #[test]
    fn test_restore_keeps_grandchildren_of_collapsed_subgroup_hidden() {
        let mut table = nested();
        let mut cache = InMemoryLayoutCache::new();
        let config = LayoutConfig::default();
        let g = NodeId::from("g");
        let inner = NodeId::from("inner");

        toggle_collapse(&mut table, &inner, &config).unwrap();
        minimize(&mut table, &mut cache, &g, &config).unwrap();
        restore(&mut table, &mut cache, &g, &config).unwrap();

        assert!(table.get(&inner).unwrap().is_visible());
        assert!(table.get(&NodeId::from("b")).unwrap().is_visible());
        assert!(!table.get(&NodeId::from("a")).unwrap().is_visible());
    }

    #[test]
    fn test_restore_without_cached_size_falls_back() {
        let mut table = nested();
        let mut cache = InMemoryLayoutCache::new();
        let config = LayoutConfig::default();
        let g = NodeId::from("g");
        {
            let group = table.get_mut(&g).unwrap();
            group.group_state = Some(GroupState::Minimized);
            group.size = Size::square(40.0);
        }

        let outcome = restore(&mut table, &mut cache, &g, &config).unwrap();
        assert_eq!(
            outcome.report.warnings,
            vec![EngineWarning::MissingCache { group_id: g.clone() }]
        );
        assert_eq!(table.get(&g).unwrap().size, config.default_group_size);
    }

    #[test]
    fn test_snapshot_size_is_second_fallback() {
        let mut table = nested();
        let mut cache = InMemoryLayoutCache::new();
        let config = LayoutConfig::default();
        let g = NodeId::from("g");

        table.get_mut(&g).unwrap().size = Size::new(500.0, 420.0);
        minimize(&mut table, &mut cache, &g, &config).unwrap();
        table.get_mut(&g).unwrap().cached_size = None;

        let outcome = restore(&mut table, &mut cache, &g, &config).unwrap();
        assert_eq!(outcome.report.warnings.len(), 1);
        assert_eq!(table.get(&g).unwrap().size, Size::new(500.0, 420.0));
    }

    #[test]
    fn test_cache_failures_never_surface() {
        let mut table = nested();
        let mut cache = FailingCache;
        let config = LayoutConfig::default();
        let g = NodeId::from("g");

        assert!(minimize(&mut table, &mut cache, &g, &config).is_ok());
        let outcome = restore(&mut table, &mut cache, &g, &config).unwrap();
        assert!(outcome.report.warnings.is_empty());
        assert_eq!(table.get(&g).unwrap().size, Size::new(300.0, 200.0));
    }

    #[test]
    fn test_resize_reclamps_leaves_and_enforces_minimum() {
        let mut table = nested();
        let config = LayoutConfig::default();
        let g = NodeId::from("g");
        let b = NodeId::from("b");

        resize_group(&mut table, &g, Size::new(600.0, 400.0), &config).unwrap();
        table.get_mut(&b).unwrap().position = Vec2::new(400.0, 300.0);

        let outcome = resize_group(&mut table, &g, Size::new(120.0, 90.0), &config).unwrap();
        assert!(outcome.schedule_pack);
        assert!(outcome.transition.is_none());
        assert_eq!(table.get(&g).unwrap().size, Size::new(300.0, 200.0));
        // 300 - 150 - 10, 200 - 40 - 10
        assert_eq!(table.get(&b).unwrap().position, Vec2::new(140.0, 150.0));
        assert!(outcome.report.changed.contains(&b));
        // Nested groups are left for the packer.
        assert_eq!(
            table.get(&NodeId::from("inner")).unwrap().position,
            Vec2::new(10.0, 50.0)
        );
    }

    #[test]
    fn test_resize_is_ignored_unless_expanded() {
        let mut table = nested();
        let config = LayoutConfig::default();
        let g = NodeId::from("g");
        toggle_collapse(&mut table, &g, &config).unwrap();
        let before = table.clone();

        let outcome = resize_group(&mut table, &g, Size::new(800.0, 600.0), &config).unwrap();
        assert!(!outcome.schedule_pack);
        assert!(matches!(
            outcome.report.warnings.as_slice(),
            [EngineWarning::IgnoredTransition {
                state: GroupState::Collapsed,
                ..
            }]
        ));
        assert_eq!(table, before);
    }

    #[test]
    fn test_invalid_transitions_are_ignored() {
        let mut table = nested();
        let mut cache = InMemoryLayoutCache::new();
        let config = LayoutConfig::default();
        let g = NodeId::from("g");

        let outcome = restore(&mut table, &mut cache, &g, &config).unwrap();
        assert!(outcome.transition.is_none());
        assert!(matches!(
            outcome.report.warnings[0],
            EngineWarning::IgnoredTransition {
                state: GroupState::Expanded,
                ..
            }
        ));

        minimize(&mut table, &mut cache, &g, &config).unwrap();
        let before = table.clone();
        let outcome = toggle_collapse(&mut table, &g, &config).unwrap();
        assert!(outcome.transition.is_none());
        assert_eq!(table, before);

        let outcome = minimize(&mut table, &mut cache, &g, &config).unwrap();
        assert!(outcome.report.is_noop());
        assert_eq!(table.get(&g).unwrap().cached_size, Some(Size::new(300.0, 200.0)));
    }

    #[test]
    fn test_expand_reclamps_leaves() {
        let mut table = nested();
        let config = LayoutConfig::default();
        let g = NodeId::from("g");

        toggle_collapse(&mut table, &g, &config).unwrap();
        assert!(!table.get(&NodeId::from("a")).unwrap().is_visible());
        table.get_mut(&g).unwrap().size = Size::new(300.0, 120.0);

        let outcome = toggle_collapse(&mut table, &g, &config).unwrap();
        assert!(outcome.schedule_pack);
        // b is 40 tall: max y = 120 - 40 - 10
        assert_eq!(table.get(&NodeId::from("b")).unwrap().position, Vec2::new(10.0, 70.0));
        assert!(table.get(&NodeId::from("a")).unwrap().is_visible());
    }

    #[test]
    fn test_lookup_errors() {
        let mut table = nested();
        let config = LayoutConfig::default();
        assert_eq!(
            toggle_collapse(&mut table, &NodeId::from("b"), &config),
            Err(EngineError::NotAGroup(NodeId::from("b")))
        );
        assert_eq!(
            toggle_collapse(&mut table, &NodeId::from("nope"), &config),
            Err(EngineError::NodeNotFound(NodeId::from("nope")))
        );
    }

    proptest! {
        #[test]
        fn prop_minimize_restore_round_trips(
            positions in proptest::collection::vec((-200i32..400, -200i32..400), 1..10),
            nest_every in 2usize..5,
        ) {
            let mut table = NodeTable::new();
            table.insert(DiagramNode::group("root", Vec2::new(5.0, 5.0), Size::new(320.0, 240.0)));
            let mut parent = NodeId::from("root");
            for (i, (x, y)) in positions.iter().enumerate() {
                let pos = Vec2::new(*x as f32, *y as f32);
                let id = format!("n{i}");
                if i % nest_every == 0 {
                    table.insert(
                        DiagramNode::group(id.as_str(), pos, Size::new(200.0, 150.0))
                            .with_parent(parent.clone()),
                    );
                    parent = NodeId::new(id);
                } else {
                    table.insert(
                        DiagramNode::leaf(id.as_str(), pos, Size::new(150.0, 40.0))
                            .with_parent(parent.clone()),
                    );
                }
            }
            let original = table.clone();
            let mut cache = InMemoryLayoutCache::new();
            let config = LayoutConfig::default();
            let root = NodeId::from("root");

            minimize(&mut table, &mut cache, &root, &config).unwrap();
            restore(&mut table, &mut cache, &root, &config).unwrap();

            prop_assert_eq!(table, original);
        }
    }
}
