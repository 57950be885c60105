pub mod containment;
pub mod drag;
pub mod grouping;
pub mod lifecycle;
pub mod packer;
pub mod session;
pub mod table;
pub mod transform;

pub use containment::{ContainerCandidate, container_at, drop_candidates, resolve_container};
pub use drag::{DragState, ResourceTemplate};
pub use grouping::{ChildPolicy, EditOutcome};
pub use lifecycle::LifecycleOutcome;
pub use packer::pack;
pub use session::{ActiveTool, EditorSession, PostMutationQueue, PostMutationTask, SessionState};
pub use table::{NodeIndex, NodeTable, TableIssue};
pub use transform::{absolute_rect, to_absolute, to_relative};
