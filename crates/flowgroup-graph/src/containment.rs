use crate::table::NodeTable;
use crate::transform;
use flowgroup_core::{EngineError, GroupState, NodeId, Rect, Vec2};
use std::collections::HashSet;

/// A group that may receive a drop, with its absolute box.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerCandidate {
    pub id: NodeId,
    pub rect: Rect,
    pub depth: usize,
    pub state: GroupState,
}

/// Groups that can currently accept a drop.
///
/// Minimized groups are never targets, nor are groups hidden by a collapsed
/// or minimized ancestor. `exclude` removes the dragged node and its whole
/// subtree so nothing can be dropped into itself.
pub fn drop_candidates(
    table: &NodeTable,
    exclude: Option<&NodeId>,
) -> Result<Vec<ContainerCandidate>, EngineError> {
    let excluded: HashSet<NodeId> = match exclude {
        Some(id) => {
            let mut set: HashSet<NodeId> = table.descendants_of(id).into_iter().collect();
            set.insert(id.clone());
            set
        }
        None => HashSet::new(),
    };

    let mut candidates = Vec::new();
    for group in table.groups() {
        if excluded.contains(&group.id) || group.is_minimized() || !group.is_visible() {
            continue;
        }
        candidates.push(ContainerCandidate {
            id: group.id.clone(),
            rect: transform::absolute_rect(table, &group.id)?,
            depth: transform::depth(table, &group.id)?,
            state: group.state(),
        });
    }
    Ok(candidates)
}

/// Innermost candidate whose box, grown by `margin`, contains `point`.
///
/// Smallest area wins; ties go to the deeper group, then the smaller id,
/// so the answer never depends on candidate order.
pub fn resolve_container(
    point: Vec2,
    candidates: &[ContainerCandidate],
    margin: f32,
) -> Option<NodeId> {
    let mut best: Option<(&ContainerCandidate, f32)> = None;

    for candidate in candidates {
        if candidate.state == GroupState::Minimized {
            continue;
        }
        let rect = candidate.rect.expand(margin);
        if !rect.contains(point) {
            continue;
        }
        let area = rect.area();
        let better = match &best {
            None => true,
            Some((current, best_area)) => {
                if area != *best_area {
                    area < *best_area
                } else if candidate.depth != current.depth {
                    candidate.depth > current.depth
                } else {
                    candidate.id < current.id
                }
            }
        };
        if better {
            best = Some((candidate, area));
        }
    }

    best.map(|(candidate, _)| candidate.id.clone())
}

/// Convenience wrapper: build candidates from the table and resolve.
pub fn container_at(
    table: &NodeTable,
    point: Vec2,
    exclude: Option<&NodeId>,
    margin: f32,
) -> Result<Option<NodeId>, EngineError> {
    let candidates = drop_candidates(table, exclude)?;
    Ok(resolve_container(point, &candidates, margin))
}
