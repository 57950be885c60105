use crossbeam_channel::{Receiver, Sender, unbounded};
use flowgroup_core::{EngineWarning, GroupState, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod telemetry;

/// What kind of table mutation a `NodesChanged` notification describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Added,
    Moved,
    Reparented,
    Resized,
    Grouped,
    Ungrouped,
    Removed,
    Renamed,
    VisibilityChanged,
    Packed,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Added => "added",
            Self::Moved => "moved",
            Self::Reparented => "reparented",
            Self::Resized => "resized",
            Self::Grouped => "grouped",
            Self::Ungrouped => "ungrouped",
            Self::Removed => "removed",
            Self::Renamed => "renamed",
            Self::VisibilityChanged => "visibility_changed",
            Self::Packed => "packed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Event {
    /// Nodes were created, moved or otherwise rewritten. The renderer
    /// re-reads these rows from the table.
    NodesChanged {
        action: ChangeAction,
        node_ids: Vec<NodeId>,
    },
    GroupStateChanged {
        group_id: NodeId,
        from: GroupState,
        to: GroupState,
    },
    SelectionChanged {
        selected: Vec<NodeId>,
    },
    /// A user-input inconsistency that did not abort anything.
    Warning(EngineWarning),
    /// A structural operation was rejected and the table left untouched.
    OperationRejected {
        operation: String,
        reason: String,
    },
}

impl Event {
    pub fn nodes_changed(action: ChangeAction, node_ids: Vec<NodeId>) -> Self {
        Self::NodesChanged { action, node_ids }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<Event> {
        self.tx.clone()
    }

    pub fn receiver(&self) -> Receiver<Event> {
        self.rx.clone()
    }

    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Dispatch all pending events to a listener.
    pub fn dispatch_to<L: EventListener>(&self, listener: &mut L) {
        while let Ok(event) = self.rx.try_recv() {
            listener.handle_event(&event);
        }
    }

    /// Take every pending event without blocking.
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }
}

/// Implement this to receive events from the EventBus.
pub trait EventListener {
    fn handle_event(&mut self, event: &Event);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        seen: Vec<Event>,
    }

    impl EventListener for Recorder {
        fn handle_event(&mut self, event: &Event) {
            self.seen.push(event.clone());
        }
    }

    #[test]
    fn test_event_bus_publish_receive() {
        let bus = EventBus::new();
        let sender = bus.sender();
        let receiver = bus.receiver();

        sender
            .send(Event::GroupStateChanged {
                group_id: NodeId::from("g"),
                from: GroupState::Expanded,
                to: GroupState::Minimized,
            })
            .unwrap();

        match receiver.recv().unwrap() {
            Event::GroupStateChanged { group_id, from, to } => {
                assert_eq!(group_id, NodeId::from("g"));
                assert_eq!(from, GroupState::Expanded);
                assert_eq!(to, GroupState::Minimized);
            }
            _ => panic!("Expected GroupStateChanged event"),
        }
    }

    #[test]
    fn test_dispatch_preserves_publish_order() {
        let bus = EventBus::new();
        bus.publish(Event::nodes_changed(
            ChangeAction::Grouped,
            vec![NodeId::from("a"), NodeId::from("b")],
        ));
        bus.publish(Event::nodes_changed(ChangeAction::Packed, vec![NodeId::from("g")]));
        bus.publish(Event::Warning(EngineWarning::InvalidSelection {
            reason: "need two nodes".into(),
        }));

        let mut recorder = Recorder { seen: Vec::new() };
        bus.dispatch_to(&mut recorder);

        assert_eq!(recorder.seen.len(), 3);
        assert!(matches!(
            recorder.seen[0],
            Event::NodesChanged {
                action: ChangeAction::Grouped,
                ..
            }
        ));
        assert!(matches!(recorder.seen[2], Event::Warning(_)));
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn test_event_serializes_with_snake_case_action() {
        let event = Event::nodes_changed(ChangeAction::VisibilityChanged, vec![NodeId::from("x")]);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["NodesChanged"]["action"], "visibility_changed");
        assert_eq!(json["NodesChanged"]["node_ids"][0], "x");
    }
}
