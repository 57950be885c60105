use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod config;
pub mod error;
pub mod geometry;
pub mod layout_cache;

pub use config::LayoutConfig;
pub use error::{EngineError, EngineWarning, OperationReport};
pub use geometry::{Rect, Size, Vec2};
pub use layout_cache::{GroupLayoutSnapshot, InMemoryLayoutCache, LayoutCache, LayoutCacheError};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
#[repr(i32)]
pub enum NodeKind {
    /// A single resource on the canvas.
    LEAF,
    /// A container other nodes can be parented to.
    GROUP,
}

/// Error type for enum conversion failures
#[derive(Error, Debug, Clone)]
pub enum EnumConversionError {
    #[error("Invalid NodeKind value: {0}")]
    InvalidNodeKind(i32),
    #[error("Invalid GroupState value: {0}")]
    InvalidGroupState(i32),
}

impl TryFrom<i32> for NodeKind {
    type Error = EnumConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NodeKind::LEAF),
            1 => Ok(NodeKind::GROUP),
            _ => Err(EnumConversionError::InvalidNodeKind(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(i32)]
pub enum GroupState {
    #[default]
    Expanded,
    Collapsed,
    Minimized,
}

impl GroupState {
    /// Whether descendants of a group in this state are hidden.
    pub fn hides_children(self) -> bool {
        !matches!(self, GroupState::Expanded)
    }
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expanded => write!(f, "expanded"),
            Self::Collapsed => write!(f, "collapsed"),
            Self::Minimized => write!(f, "minimized"),
        }
    }
}

impl TryFrom<i32> for GroupState {
    type Error = EnumConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GroupState::Expanded),
            1 => Ok(GroupState::Collapsed),
            2 => Ok(GroupState::Minimized),
            _ => Err(EnumConversionError::InvalidGroupState(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

impl Visibility {
    pub fn from_hidden(hidden: bool) -> Self {
        if hidden {
            Visibility::Hidden
        } else {
            Visibility::Visible
        }
    }

    pub fn is_visible(self) -> bool {
        matches!(self, Visibility::Visible)
    }
}

/// Cloud provider tag. Only used for cosmetics and defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Gcp,
    Azure,
    #[default]
    Generic,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aws => write!(f, "aws"),
            Self::Gcp => write!(f, "gcp"),
            Self::Azure => write!(f, "azure"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(Provider::Aws),
            "gcp" => Ok(Provider::Gcp),
            "azure" => Ok(Provider::Azure),
            "generic" => Ok(Provider::Generic),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// One row of the flat node table.
///
/// `position` is local: relative to the parent group when `parent_id` is set,
/// relative to the canvas origin otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramNode {
    pub id: NodeId,
    pub kind: NodeKind,
    #[serde(default)]
    pub label: String,
    pub position: Vec2,
    pub size: Size,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub visibility: Visibility,
    /// Only meaningful for groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_state: Option<GroupState>,
    /// Set only while the group is minimized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_size: Option<Size>,
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub selected: bool,
}

impl DiagramNode {
    pub fn leaf(id: impl Into<NodeId>, position: Vec2, size: Size) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::LEAF,
            label: String::new(),
            position,
            size,
            parent_id: None,
            visibility: Visibility::Visible,
            group_state: None,
            cached_size: None,
            provider: Provider::Generic,
            selected: false,
        }
    }

    pub fn group(id: impl Into<NodeId>, position: Vec2, size: Size) -> Self {
        Self {
            kind: NodeKind::GROUP,
            group_state: Some(GroupState::Expanded),
            ..Self::leaf(id, position, size)
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<NodeId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn is_group(&self) -> bool {
        self.kind == NodeKind::GROUP
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::LEAF
    }

    pub fn is_visible(&self) -> bool {
        self.visibility.is_visible()
    }

    /// Lifecycle state of a group. Leaves report `Expanded`.
    pub fn state(&self) -> GroupState {
        self.group_state.unwrap_or_default()
    }

    pub fn is_minimized(&self) -> bool {
        self.is_group() && self.state() == GroupState::Minimized
    }

    /// Local box, relative to the parent.
    pub fn local_rect(&self) -> Rect {
        Rect::from_pos_size(self.position, self.size)
    }
}

/// Visible pane of the canvas: pan offset, zoom and pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
            width: 1000.0,
            height: 800.0,
        }
    }
}

impl Viewport {
    /// Convert a pane-relative screen point into canvas coordinates.
    pub fn screen_to_canvas(&self, screen: Vec2) -> Vec2 {
        let zoom = if self.zoom.abs() < f32::EPSILON {
            1.0
        } else {
            self.zoom
        };
        Vec2::new((screen.x - self.x) / zoom, (screen.y - self.y) / zoom)
    }

    /// Canvas point under the middle of the pane.
    pub fn center(&self) -> Vec2 {
        self.screen_to_canvas(Vec2::new(self.width * 0.5, self.height * 0.5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_round_trip_through_i32() {
        assert_eq!(NodeKind::try_from(NodeKind::GROUP as i32).unwrap(), NodeKind::GROUP);
        assert!(matches!(
            NodeKind::try_from(7),
            Err(EnumConversionError::InvalidNodeKind(7))
        ));
    }

    #[test]
    fn test_group_constructor_starts_expanded() {
        let group = DiagramNode::group("g", Vec2::new(0.0, 0.0), Size::new(300.0, 200.0));
        assert!(group.is_group());
        assert_eq!(group.group_state, Some(GroupState::Expanded));
        assert!(group.cached_size.is_none());
        assert!(group.is_visible());
    }

    #[test]
    fn test_node_serializes_with_optional_fields_skipped() {
        let leaf = DiagramNode::leaf("a", Vec2::new(1.0, 2.0), Size::new(3.0, 4.0))
            .with_provider(Provider::Aws);
        let json = serde_json::to_value(&leaf).unwrap();
        assert_eq!(json["id"], "a");
        assert_eq!(json["provider"], "aws");
        assert!(json.get("parent_id").is_none());
        assert!(json.get("cached_size").is_none());

        let back: DiagramNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, leaf);
    }

    #[test]
    fn test_viewport_center_accounts_for_pan_and_zoom() {
        let viewport = Viewport {
            x: 100.0,
            y: 50.0,
            zoom: 2.0,
            width: 1000.0,
            height: 800.0,
        };
        assert_eq!(viewport.center(), Vec2::new(200.0, 175.0));
    }

    #[test]
    fn test_provider_parses_case_insensitively() {
        assert_eq!("GCP".parse::<Provider>().unwrap(), Provider::Gcp);
        assert!("oracle".parse::<Provider>().is_err());
    }
}
