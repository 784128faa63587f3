//! Declarative description of a multi-pane arrangement.
//!
//! A layout is a tree: inner nodes are groups splitting their area between
//! children, leaves are diff panes comparing an `old` and a `new` file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Smallest relative size any pane is given.
pub const MIN_PANE_SIZE: f64 = 0.05;

/// Direction in which a group splits its area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOrientation {
    /// Children side by side (columns).
    Horizontal,
    /// Children stacked (rows).
    Vertical,
}

/// Pane the arrangement should be biased towards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zoom {
    #[default]
    Default,
    Center,
    Left,
    Right,
    Top,
    Bottom,
}

impl Zoom {
    pub const ALL: [Zoom; 6] = [
        Zoom::Default,
        Zoom::Center,
        Zoom::Left,
        Zoom::Right,
        Zoom::Top,
        Zoom::Bottom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Center => "center",
            Self::Left => "left",
            Self::Right => "right",
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|z| z.as_str() == value)
    }
}

impl std::fmt::Display for Zoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A leaf of the layout tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffPane {
    pub old: PathBuf,
    pub new: PathBuf,
    pub title: String,
    /// Saved by the layout's `save` operation.
    pub save: bool,
    /// The pane in which conflicts are edited.
    pub is_merge_editor: bool,
    pub size: f64,
}

/// A node of the layout tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayoutElement {
    Group {
        size: f64,
        groups: Vec<LayoutElement>,
    },
    Diff(DiffPane),
}

impl LayoutElement {
    pub fn size(&self) -> f64 {
        match self {
            Self::Group { size, .. } => *size,
            Self::Diff(pane) => pane.size,
        }
    }
}

/// Root of a layout tree. Nested groups alternate orientation, starting with
/// `orientation` at the top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutDescription {
    pub orientation: GroupOrientation,
    pub groups: Vec<LayoutElement>,
}

impl LayoutDescription {
    /// Diff panes in pre-order (depth-first, left to right).
    pub fn leaves(&self) -> Vec<&DiffPane> {
        fn walk<'a>(elements: &'a [LayoutElement], out: &mut Vec<&'a DiffPane>) {
            for element in elements {
                match element {
                    LayoutElement::Group { groups, .. } => walk(groups, out),
                    LayoutElement::Diff(pane) => out.push(pane),
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.groups, &mut out);
        out
    }

    /// Pre-order index of the merge editor pane, if any.
    pub fn merge_editor_index(&self) -> Option<usize> {
        self.leaves().iter().position(|p| p.is_merge_editor)
    }

    /// Check that sizes in every group sum to 1 and no pane is smaller than
    /// [`MIN_PANE_SIZE`].
    pub fn sizes_are_consistent(&self) -> bool {
        fn check(elements: &[LayoutElement]) -> bool {
            let sum: f64 = elements.iter().map(LayoutElement::size).sum();
            (sum - 1.0).abs() < 1e-9
                && elements.iter().all(|e| match e {
                    LayoutElement::Group { size, groups } => {
                        *size >= MIN_PANE_SIZE - 1e-9 && check(groups)
                    }
                    LayoutElement::Diff(pane) => pane.size >= MIN_PANE_SIZE - 1e-9,
                })
        }
        check(&self.groups)
    }
}
