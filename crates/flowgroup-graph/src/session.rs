//! Editing session: owns the node table and the UI state around it, applies
//! operations atomically and runs follow-up work once each one settles.

use crate::containment;
use crate::drag::{self, DragState, ResourceTemplate};
use crate::grouping::{self, ChildPolicy, EditOutcome};
use crate::lifecycle::{self, LifecycleOutcome};
use crate::packer;
use crate::table::NodeTable;
use crate::transform;
use flowgroup_core::{
    DiagramNode, EngineError, EngineWarning, GroupLayoutSnapshot, GroupState,
    InMemoryLayoutCache, LayoutCache, LayoutCacheError, LayoutConfig, NodeId, OperationReport,
    Provider, Rect, Size, Vec2, Viewport, Visibility,
};
use flowgroup_events::telemetry::{
    self, OP_CREATE_GROUP, OP_DELETE, OP_DROP, OP_DUPLICATE, OP_GROUP_SELECTION, OP_MINIMIZE,
    OP_RENAME, OP_REPARENT, OP_RESIZE, OP_RESTORE, OP_TOGGLE_COLLAPSE, OP_UNGROUP,
};
use flowgroup_events::{ChangeAction, Event, EventBus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveTool {
    #[default]
    Select,
    Lasso,
    Note,
    Text,
    Area,
}

/// UI state that is not part of the saved document.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub active_tool: ActiveTool,
    pub viewport: Viewport,
    pub drag: Option<DragState>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostMutationTask {
    Pack(NodeId),
    Notify(Event),
}

/// FIFO of work deferred until the current mutation has been committed.
#[derive(Debug, Default)]
pub struct PostMutationQueue {
    tasks: VecDeque<PostMutationTask>,
}

impl PostMutationQueue {
    pub fn push(&mut self, task: PostMutationTask) {
        if let PostMutationTask::Pack(id) = &task {
            if self
                .tasks
                .iter()
                .any(|t| matches!(t, PostMutationTask::Pack(queued) if queued == id))
            {
                return;
            }
        }
        self.tasks.push_back(task);
    }

    pub fn pop(&mut self) -> Option<PostMutationTask> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Committed edit waiting to be turned into follow-up tasks.
struct Applied {
    outcome: EditOutcome,
    transition: Option<(NodeId, GroupState, GroupState)>,
}

impl From<EditOutcome> for Applied {
    fn from(outcome: EditOutcome) -> Self {
        Self {
            outcome,
            transition: None,
        }
    }
}

impl Applied {
    fn from_lifecycle(group_id: &NodeId, lifecycle: LifecycleOutcome) -> Self {
        let mut outcome = EditOutcome {
            report: lifecycle.report,
            pack: Vec::new(),
        };
        if lifecycle.schedule_pack {
            outcome.pack.push(group_id.clone());
        }
        Self {
            outcome,
            transition: lifecycle
                .transition
                .map(|(from, to)| (group_id.clone(), from, to)),
        }
    }
}

/// Layout cache writes made by an edit, held back until the edit commits so
/// a rejected edit leaves the store untouched.
struct StagedCache<'a> {
    store: &'a dyn LayoutCache,
    writes: BTreeMap<NodeId, Option<GroupLayoutSnapshot>>,
}

impl<'a> StagedCache<'a> {
    fn new(store: &'a dyn LayoutCache) -> Self {
        Self {
            store,
            writes: BTreeMap::new(),
        }
    }

    fn into_writes(self) -> BTreeMap<NodeId, Option<GroupLayoutSnapshot>> {
        self.writes
    }
}

impl LayoutCache for StagedCache<'_> {
    fn store_layout(&mut self, snapshot: &GroupLayoutSnapshot) -> Result<(), LayoutCacheError> {
        self.writes
            .insert(snapshot.group_id.clone(), Some(snapshot.clone()));
        Ok(())
    }

    fn load_layout(
        &self,
        group_id: &NodeId,
    ) -> Result<Option<GroupLayoutSnapshot>, LayoutCacheError> {
        match self.writes.get(group_id) {
            Some(staged) => Ok(staged.clone()),
            None => self.store.load_layout(group_id),
        }
    }

    fn clear_layout(&mut self, group_id: &NodeId) -> Result<(), LayoutCacheError> {
        self.writes.insert(group_id.clone(), None);
        Ok(())
    }
}

fn generated_id(prefix: &str) -> NodeId {
    NodeId::new(format!("{prefix}-{}", Uuid::new_v4()))
}

pub struct EditorSession {
    table: NodeTable,
    config: LayoutConfig,
    cache: Box<dyn LayoutCache>,
    state: SessionState,
    queue: PostMutationQueue,
    bus: EventBus,
}

impl EditorSession {
    pub fn new(config: LayoutConfig) -> Self {
        Self::with_cache(config, Box::new(InMemoryLayoutCache::new()))
    }

    pub fn with_cache(config: LayoutConfig, cache: Box<dyn LayoutCache>) -> Self {
        Self {
            table: NodeTable::new(),
            config,
            cache,
            state: SessionState::default(),
            queue: PostMutationQueue::default(),
            bus: EventBus::new(),
        }
    }

    /// Replace the table wholesale, e.g. after loading a document.
    pub fn load_table(&mut self, table: NodeTable) {
        self.table = table;
        self.state.drag = None;
    }

    pub fn table(&self) -> &NodeTable {
        &self.table
    }

    pub fn into_table(self) -> NodeTable {
        self.table
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = viewport;
    }

    pub fn set_active_tool(&mut self, tool: ActiveTool) {
        self.state.active_tool = tool;
    }

    // Queries

    pub fn node(&self, id: &NodeId) -> Option<&DiagramNode> {
        self.table.get(id)
    }

    pub fn absolute_position(&self, id: &NodeId) -> Result<Vec2, EngineError> {
        transform::to_absolute(&self.table, id)
    }

    pub fn absolute_rect(&self, id: &NodeId) -> Result<Rect, EngineError> {
        transform::absolute_rect(&self.table, id)
    }

    pub fn container_at(
        &self,
        point: Vec2,
        exclude: Option<&NodeId>,
    ) -> Result<Option<NodeId>, EngineError> {
        containment::container_at(&self.table, point, exclude, self.config.containment_margin)
    }

    pub fn selection(&self) -> Vec<NodeId> {
        self.table
            .iter()
            .filter(|node| node.selected)
            .map(|node| node.id.clone())
            .collect()
    }

    // Selection

    pub fn select(&mut self, ids: &[NodeId]) -> Result<(), EngineError> {
        for id in ids {
            self.table.require(id)?;
        }
        let wanted: BTreeSet<&NodeId> = ids.iter().collect();
        for node in self.table.iter_mut() {
            node.selected = wanted.contains(&node.id);
        }
        self.bus.publish(Event::SelectionChanged {
            selected: self.selection(),
        });
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        for node in self.table.iter_mut() {
            node.selected = false;
        }
        self.bus.publish(Event::SelectionChanged {
            selected: Vec::new(),
        });
    }

    // Structural edits

    /// Insert a prepared node. A parented node is clamped into its parent,
    /// takes its visibility from the parent chain and triggers a pack.
    /// Fails with `DuplicateId` when the id is already in the table.
    pub fn insert_node(&mut self, node: DiagramNode) -> Result<OperationReport, EngineError> {
        self.commit(OP_DROP, ChangeAction::Added, |table, _, config| {
            if table.contains(&node.id) {
                return Err(EngineError::DuplicateId(node.id.clone()));
            }
            let id = node.id.clone();
            let parent = node.parent_id.clone();
            let mut node = node;
            let mut outcome = EditOutcome::default();
            if let Some(parent_id) = &parent {
                let parent_node = table.require_group(parent_id)?;
                node.position =
                    config.clamp_child_position(node.position, node.size, parent_node.size);
                let hidden = parent_node.state().hides_children()
                    || lifecycle::hidden_by_ancestor(table, parent_id)?;
                node.visibility = Visibility::from_hidden(hidden);
                outcome.pack.push(parent_id.clone());
            }
            table.insert(node);
            transform::ancestors(table, &id)?;
            outcome.report.created = Some(id);
            Ok(outcome.into())
        })
    }

    pub fn group_selection(&mut self) -> Result<OperationReport, EngineError> {
        let selection = self.selection();
        self.group_nodes(&selection)
    }

    pub fn group_nodes(&mut self, ids: &[NodeId]) -> Result<OperationReport, EngineError> {
        let group_id = generated_id("group");
        self.commit(OP_GROUP_SELECTION, ChangeAction::Grouped, |table, _, config| {
            Ok(grouping::group_nodes(table, ids, group_id, config)?.into())
        })
    }

    /// Ungroup `group_id`, or when `None`, every selected group plus the
    /// parents of selected nodes.
    pub fn ungroup(&mut self, group_id: Option<&NodeId>) -> Result<OperationReport, EngineError> {
        let targets = match group_id {
            Some(id) => vec![id.clone()],
            None => self.ungroup_targets(),
        };
        self.commit(OP_UNGROUP, ChangeAction::Ungrouped, |table, cache, _| {
            Ok(grouping::ungroup(table, cache, &targets)?.into())
        })
    }

    fn ungroup_targets(&self) -> Vec<NodeId> {
        let mut targets = Vec::new();
        for node in self.table.iter().filter(|node| node.selected) {
            let candidate = if node.is_group() {
                Some(&node.id)
            } else {
                node.parent_id.as_ref()
            };
            if let Some(id) = candidate {
                let is_group = self.table.get(id).is_some_and(|n| n.is_group());
                if is_group && !targets.contains(id) {
                    targets.push(id.clone());
                }
            }
        }
        targets
    }

    pub fn create_empty_group(
        &mut self,
        provider: Provider,
    ) -> Result<OperationReport, EngineError> {
        let group_id = generated_id("group");
        let viewport = self.state.viewport;
        self.commit(OP_CREATE_GROUP, ChangeAction::Added, |table, _, config| {
            Ok(grouping::create_empty_group(table, group_id, &viewport, provider, config).into())
        })
    }

    pub fn delete(
        &mut self,
        ids: &[NodeId],
        policy: ChildPolicy,
    ) -> Result<OperationReport, EngineError> {
        self.commit(OP_DELETE, ChangeAction::Reparented, |table, cache, _| {
            Ok(grouping::delete_nodes(table, cache, ids, policy)?.into())
        })
    }

    pub fn delete_selection(
        &mut self,
        policy: ChildPolicy,
    ) -> Result<OperationReport, EngineError> {
        let selection = self.selection();
        if selection.is_empty() {
            return Ok(self.warn(EngineWarning::InvalidSelection {
                reason: "nothing selected".to_string(),
            }));
        }
        self.delete(&selection, policy)
    }

    pub fn rename(&mut self, id: &NodeId, label: &str) -> Result<OperationReport, EngineError> {
        self.commit(OP_RENAME, ChangeAction::Renamed, |table, _, _| {
            Ok(grouping::rename_node(table, id, label)?.into())
        })
    }

    pub fn duplicate(&mut self, id: &NodeId) -> Result<OperationReport, EngineError> {
        let new_id = generated_id("node");
        self.commit(OP_DUPLICATE, ChangeAction::Added, |table, _, config| {
            Ok(grouping::duplicate_leaf(table, id, new_id, config)?.into())
        })
    }

    /// Reparent without moving on screen, then clamp into the new parent
    /// and recompute the subtree's visibility. Fails with `Cycle` when
    /// `parent` is `id` or one of its descendants.
    pub fn set_parent(
        &mut self,
        id: &NodeId,
        parent: Option<&NodeId>,
    ) -> Result<OperationReport, EngineError> {
        self.commit(OP_REPARENT, ChangeAction::Reparented, |table, _, config| {
            Ok(drag::reparent(table, id, parent, config)?.into())
        })
    }

    // Lifecycle

    pub fn toggle_collapse(&mut self, group_id: &NodeId) -> Result<OperationReport, EngineError> {
        self.commit(
            OP_TOGGLE_COLLAPSE,
            ChangeAction::VisibilityChanged,
            |table, _, config| {
                let outcome = lifecycle::toggle_collapse(table, group_id, config)?;
                Ok(Applied::from_lifecycle(group_id, outcome))
            },
        )
    }

    /// Resize an expanded group. The group and its parent are re-packed.
    pub fn resize_group(
        &mut self,
        group_id: &NodeId,
        size: Size,
    ) -> Result<OperationReport, EngineError> {
        self.commit(OP_RESIZE, ChangeAction::Resized, |table, _, config| {
            let outcome = lifecycle::resize_group(table, group_id, size, config)?;
            let resized = outcome.report.changed.contains(group_id);
            let mut applied = Applied::from_lifecycle(group_id, outcome);
            let parent = table.get(group_id).and_then(|group| group.parent_id.clone());
            if let Some(parent) = parent.filter(|_| resized) {
                applied.outcome.schedule_pack(&parent);
            }
            Ok(applied)
        })
    }

    pub fn minimize(&mut self, group_id: &NodeId) -> Result<OperationReport, EngineError> {
        self.commit(OP_MINIMIZE, ChangeAction::Resized, |table, cache, config| {
            let outcome = lifecycle::minimize(table, cache, group_id, config)?;
            Ok(Applied::from_lifecycle(group_id, outcome))
        })
    }

    pub fn restore(&mut self, group_id: &NodeId) -> Result<OperationReport, EngineError> {
        self.commit(OP_RESTORE, ChangeAction::Resized, |table, cache, config| {
            let outcome = lifecycle::restore(table, cache, group_id, config)?;
            Ok(Applied::from_lifecycle(group_id, outcome))
        })
    }

    // Drag and drop

    pub fn begin_drag(&mut self, id: &NodeId) -> Result<(), EngineError> {
        self.state.drag = Some(drag::begin_drag(&self.table, id)?);
        Ok(())
    }

    /// Update the drag preview. Returns the local position to draw, or
    /// `None` when no drag is in progress.
    pub fn drag_to(&mut self, point: Vec2) -> Result<Option<Vec2>, EngineError> {
        let Some(state) = self.state.drag.as_mut() else {
            return Ok(None);
        };
        drag::drag_to(&self.table, state, point, &self.config).map(Some)
    }

    /// Abandon the drag. Nothing is committed.
    pub fn cancel_drag(&mut self) -> Option<DragState> {
        self.state.drag.take()
    }

    pub fn drop_at(&mut self, point: Vec2) -> Result<OperationReport, EngineError> {
        let Some(state) = self.state.drag.take() else {
            return Ok(self.warn(EngineWarning::InvalidSelection {
                reason: "no drag in progress".to_string(),
            }));
        };
        self.commit(OP_DROP, ChangeAction::Moved, |table, _, config| {
            Ok(drag::drop_at(table, &state, point, config)?.into())
        })
    }

    /// Convenience for a complete drag gesture.
    pub fn move_node(&mut self, id: &NodeId, point: Vec2) -> Result<OperationReport, EngineError> {
        self.begin_drag(id)?;
        self.drop_at(point)
    }

    pub fn drop_new_resource(
        &mut self,
        template: &ResourceTemplate,
        point: Vec2,
    ) -> Result<OperationReport, EngineError> {
        let new_id = generated_id("node");
        let report = self.commit(OP_DROP, ChangeAction::Added, |table, _, config| {
            Ok(drag::drop_new_resource(table, template, new_id, point, config)?.into())
        })?;
        self.state.active_tool = ActiveTool::Select;
        Ok(report)
    }

    // Plumbing

    fn warn(&mut self, warning: EngineWarning) -> OperationReport {
        warn!(%warning, "Operation skipped");
        self.bus.publish(Event::Warning(warning.clone()));
        OperationReport::warning(warning)
    }

    /// Run `edit` against a copy of the table and swap it in only on
    /// success, then queue and flush the follow-up work.
    fn commit<F>(
        &mut self,
        operation: &'static str,
        action: ChangeAction,
        edit: F,
    ) -> Result<OperationReport, EngineError>
    where
        F: FnOnce(
            &mut NodeTable,
            &mut dyn LayoutCache,
            &LayoutConfig,
        ) -> Result<Applied, EngineError>,
    {
        let correlation_id = telemetry::new_correlation_id();
        telemetry::operation_start(operation, &correlation_id);

        let mut working = self.table.clone();
        let mut staged = StagedCache::new(self.cache.as_ref());
        let result = edit(&mut working, &mut staged, &self.config);
        let cache_writes = staged.into_writes();
        let applied = match result {
            Ok(applied) => applied,
            Err(error) => {
                telemetry::operation_rejected(operation, &correlation_id, error.to_string());
                self.bus.publish(Event::OperationRejected {
                    operation: operation.to_string(),
                    reason: error.to_string(),
                });
                return Err(error);
            }
        };
        self.table = working;
        self.write_cache(cache_writes);

        let Applied {
            outcome: EditOutcome { mut report, pack },
            transition,
        } = applied;

        for group_id in pack {
            self.queue.push(PostMutationTask::Pack(group_id));
        }
        for warning in &report.warnings {
            self.queue
                .push(PostMutationTask::Notify(Event::Warning(warning.clone())));
        }
        if let Some((group_id, from, to)) = transition {
            self.queue
                .push(PostMutationTask::Notify(Event::GroupStateChanged { group_id, from, to }));
        }
        if let Some(created) = &report.created {
            self.queue.push(PostMutationTask::Notify(Event::nodes_changed(
                ChangeAction::Added,
                vec![created.clone()],
            )));
        }
        if !report.changed.is_empty() {
            self.queue.push(PostMutationTask::Notify(Event::nodes_changed(
                action,
                report.changed.clone(),
            )));
        }
        if !report.removed.is_empty() {
            self.queue.push(PostMutationTask::Notify(Event::nodes_changed(
                ChangeAction::Removed,
                report.removed.clone(),
            )));
        }

        for id in self.flush() {
            report.mark_changed(&id);
        }
        telemetry::operation_success(operation, &correlation_id, report.changed.len());
        Ok(report)
    }

    fn write_cache(&mut self, writes: BTreeMap<NodeId, Option<GroupLayoutSnapshot>>) {
        for (group_id, write) in writes {
            let result = match &write {
                Some(snapshot) => self.cache.store_layout(snapshot),
                None => self.cache.clear_layout(&group_id),
            };
            if let Err(error) = result {
                warn!(group_id = %group_id, %error, "Failed to write group layout");
            }
        }
    }

    /// Drain the post-mutation queue. Returns every id a pack pass moved or
    /// resized.
    pub fn flush(&mut self) -> Vec<NodeId> {
        let mut packed = Vec::new();
        while let Some(task) = self.queue.pop() {
            match task {
                PostMutationTask::Pack(group_id) => {
                    match packer::pack(&mut self.table, &group_id, &self.config) {
                        Ok(changed) if changed.is_empty() => {}
                        Ok(changed) => {
                            let parent = self
                                .table
                                .get(&group_id)
                                .and_then(|group| group.parent_id.clone());
                            if let Some(parent) = parent.filter(|_| changed.contains(&group_id)) {
                                self.queue.push(PostMutationTask::Pack(parent));
                            }
                            for id in changed.iter().filter(|id| *id != &group_id) {
                                if self.table.get(id).is_some_and(|node| node.is_group()) {
                                    self.queue.push(PostMutationTask::Pack(id.clone()));
                                }
                            }
                            for id in &changed {
                                if !packed.contains(id) {
                                    packed.push(id.clone());
                                }
                            }
                            self.queue.push(PostMutationTask::Notify(Event::nodes_changed(
                                ChangeAction::Packed,
                                changed,
                            )));
                        }
                        Err(error) => {
                            debug!(group_id = %group_id, %error, "Dropping stale pack task");
                        }
                    }
                }
                PostMutationTask::Notify(event) => self.bus.publish(event),
            }
        }
        packed
    }
}
