use crate::geometry::{Size, Vec2};
use serde::{Deserialize, Serialize};

/// Layout constants shared by every engine operation.
///
/// Missing fields fall back to the defaults when deserialized, so a config file
/// only needs to list what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Space reserved at the top of an expanded group for its title bar
    pub group_header_height: f32,
    /// Horizontal margin between a group border and its children
    pub child_padding_x: f32,
    /// Vertical margin below the header and above the bottom border
    pub child_padding_y: f32,
    /// Height of a packed leaf row
    pub child_row_height: f32,
    /// Gap between packed rows
    pub child_row_spacing: f32,
    /// Side of the square a minimized group shrinks to
    pub minimized_side: f32,
    pub default_group_size: Size,
    pub min_expanded_group_size: Size,
    pub default_leaf_size: Size,
    /// Padding around a selection turned into a group
    pub grouping_padding_x: f32,
    pub grouping_padding_top: f32,
    pub grouping_padding_bottom: f32,
    /// Tolerance added around every group box during drop containment
    pub containment_margin: f32,
    /// Offset applied to duplicated nodes
    pub duplicate_offset: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            group_header_height: 40.0,
            child_padding_x: 10.0,
            child_padding_y: 10.0,
            child_row_height: 40.0,
            child_row_spacing: 8.0,
            minimized_side: 40.0,
            default_group_size: Size::new(300.0, 200.0),
            min_expanded_group_size: Size::new(300.0, 200.0),
            default_leaf_size: Size::new(150.0, 80.0),
            grouping_padding_x: 50.0,
            grouping_padding_top: 60.0,
            grouping_padding_bottom: 40.0,
            containment_margin: 8.0,
            duplicate_offset: 20.0,
        }
    }
}

impl LayoutConfig {
    pub fn minimized_size(&self) -> Size {
        Size::square(self.minimized_side)
    }

    /// First y coordinate available to children below the header.
    pub fn content_top(&self) -> f32 {
        self.group_header_height + self.child_padding_y
    }

    /// Width available to a packed child inside a group of `group_width`.
    pub fn inner_width(&self, group_width: f32) -> f32 {
        (group_width - 2.0 * self.child_padding_x).max(0.0)
    }

    /// Clamp a child's local position so its box stays inside the parent
    /// minus the margins. When the child is larger than the available area
    /// the top-left margin wins.
    pub fn clamp_child_position(&self, position: Vec2, child: Size, parent: Size) -> Vec2 {
        let min_x = self.child_padding_x;
        let min_y = self.content_top();
        let max_x = parent.width - child.width - self.child_padding_x;
        let max_y = parent.height - child.height - self.child_padding_y;
        Vec2::new(
            position.x.min(max_x).max(min_x),
            position.y.min(max_y).max(min_y),
        )
    }
}
