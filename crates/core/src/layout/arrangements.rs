//! The fixed set of pane arrangements a merge can be displayed in.
//!
//! Each arrangement turns a [`DiffedUris`] file set and a [`Zoom`] into a
//! [`LayoutDescription`]. The merged file is shown in exactly one merge
//! editor pane, which is also the only pane that gets saved.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::description::{
    DiffPane, GroupOrientation, LayoutDescription, LayoutElement, Zoom, MIN_PANE_SIZE,
};
use crate::uris::DiffedUris;

/// Size of a zoomed pane in a two-way split.
const ZOOMED_PAIR: f64 = 1.0 - MIN_PANE_SIZE;
/// Size of a zoomed pane in a three-way split.
const ZOOMED_TRIPLE: f64 = 1.0 - 2.0 * MIN_PANE_SIZE;

/// Arrangement strategies, identified by a stable persisted key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutKind {
    /// 2x2 grid; the left column shows what each side changed relative to
    /// base, the right column shows the transfer of each side into merged.
    #[default]
    #[serde(rename = "4TransferRight")]
    FourTransferRight,
    /// [`FourTransferRight`](Self::FourTransferRight) transposed.
    #[serde(rename = "4TransferDown")]
    FourTransferDown,
    /// Three columns, every pane compared against base.
    #[serde(rename = "3DiffToBase")]
    ThreeDiffToBase,
    /// Three rows, every pane compared against base.
    #[serde(rename = "3DiffToBaseRows")]
    ThreeDiffToBaseRows,
    /// Local and remote stacked on the left, merged on the right.
    #[serde(rename = "3DiffToBaseMergedRight")]
    ThreeDiffToBaseMergedRight,
    /// Three columns, every pane compared against merged.
    #[serde(rename = "3DiffToMerged")]
    ThreeDiffToMerged,
}

impl LayoutKind {
    pub const ALL: [LayoutKind; 6] = [
        LayoutKind::FourTransferRight,
        LayoutKind::FourTransferDown,
        LayoutKind::ThreeDiffToBase,
        LayoutKind::ThreeDiffToBaseRows,
        LayoutKind::ThreeDiffToBaseMergedRight,
        LayoutKind::ThreeDiffToMerged,
    ];

    /// Key stored in persisted state and configuration.
    pub fn setting_value(self) -> &'static str {
        match self {
            Self::FourTransferRight => "4TransferRight",
            Self::FourTransferDown => "4TransferDown",
            Self::ThreeDiffToBase => "3DiffToBase",
            Self::ThreeDiffToBaseRows => "3DiffToBaseRows",
            Self::ThreeDiffToBaseMergedRight => "3DiffToBaseMergedRight",
            Self::ThreeDiffToMerged => "3DiffToMerged",
        }
    }

    pub fn from_setting_value(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.setting_value() == value)
    }

    /// Short human readable summary.
    pub fn label(self) -> &'static str {
        match self {
            Self::FourTransferRight => "4 panes, changes left, transfer to merged right",
            Self::FourTransferDown => "4 panes, changes top, transfer to merged bottom",
            Self::ThreeDiffToBase => "3 columns compared to base",
            Self::ThreeDiffToBaseRows => "3 rows compared to base",
            Self::ThreeDiffToBaseMergedRight => "3 panes compared to base, merged right",
            Self::ThreeDiffToMerged => "3 columns compared to merged",
        }
    }

    /// Zoom values this arrangement reacts to; others fall back to default.
    pub fn supported_zooms(self) -> &'static [Zoom] {
        match self {
            Self::FourTransferRight | Self::FourTransferDown | Self::ThreeDiffToBaseMergedRight => {
                &[Zoom::Default, Zoom::Left, Zoom::Right, Zoom::Top, Zoom::Bottom]
            }
            Self::ThreeDiffToBase | Self::ThreeDiffToMerged => {
                &[Zoom::Default, Zoom::Left, Zoom::Center, Zoom::Right]
            }
            Self::ThreeDiffToBaseRows => &[Zoom::Default, Zoom::Top, Zoom::Center, Zoom::Bottom],
        }
    }

    /// Build the layout tree for `uris` biased towards `zoom`.
    pub fn describe(self, uris: &DiffedUris, zoom: Zoom) -> LayoutDescription {
        let base_local = pane(&uris.base, &uris.local, "Base -> Local", false);
        let base_remote = pane(&uris.base, &uris.remote, "Base -> Remote", false);

        match self {
            Self::FourTransferRight => {
                let (left, right) = pair(zoom == Zoom::Left, zoom == Zoom::Right);
                let (top, bottom) = pair(zoom == Zoom::Top, zoom == Zoom::Bottom);
                LayoutDescription {
                    orientation: GroupOrientation::Horizontal,
                    groups: vec![
                        group(left, vec![sized(base_local, top), sized(base_remote, bottom)]),
                        group(
                            right,
                            vec![
                                sized(pane(&uris.remote, &uris.merged, "Remote -> Merged", true), top),
                                sized(pane(&uris.local, &uris.merged, "Local -> Merged", false), bottom),
                            ],
                        ),
                    ],
                }
            }
            Self::FourTransferDown => {
                let (top, bottom) = pair(zoom == Zoom::Top, zoom == Zoom::Bottom);
                let (left, right) = pair(zoom == Zoom::Left, zoom == Zoom::Right);
                LayoutDescription {
                    orientation: GroupOrientation::Vertical,
                    groups: vec![
                        group(top, vec![sized(base_local, left), sized(base_remote, right)]),
                        group(
                            bottom,
                            vec![
                                sized(pane(&uris.remote, &uris.merged, "Remote -> Merged", true), left),
                                sized(pane(&uris.local, &uris.merged, "Local -> Merged", false), right),
                            ],
                        ),
                    ],
                }
            }
            Self::ThreeDiffToBase | Self::ThreeDiffToBaseRows => {
                let (orientation, focus) = if self == Self::ThreeDiffToBase {
                    (
                        GroupOrientation::Horizontal,
                        [zoom == Zoom::Left, zoom == Zoom::Center, zoom == Zoom::Right],
                    )
                } else {
                    (
                        GroupOrientation::Vertical,
                        [zoom == Zoom::Top, zoom == Zoom::Center, zoom == Zoom::Bottom],
                    )
                };
                let sizes = triple(focus);
                LayoutDescription {
                    orientation,
                    groups: vec![
                        sized(base_local, sizes[0]),
                        sized(pane(&uris.base, &uris.merged, "Base -> Merged", true), sizes[1]),
                        sized(base_remote, sizes[2]),
                    ],
                }
            }
            Self::ThreeDiffToBaseMergedRight => {
                let (left, right) = pair(zoom == Zoom::Left, zoom == Zoom::Right);
                let (top, bottom) = pair(zoom == Zoom::Top, zoom == Zoom::Bottom);
                LayoutDescription {
                    orientation: GroupOrientation::Horizontal,
                    groups: vec![
                        group(left, vec![sized(base_local, top), sized(base_remote, bottom)]),
                        sized(pane(&uris.base, &uris.merged, "Base -> Merged", true), right),
                    ],
                }
            }
            Self::ThreeDiffToMerged => {
                let sizes = triple([zoom == Zoom::Left, zoom == Zoom::Center, zoom == Zoom::Right]);
                LayoutDescription {
                    orientation: GroupOrientation::Horizontal,
                    groups: vec![
                        sized(pane(&uris.local, &uris.merged, "Local -> Merged", false), sizes[0]),
                        sized(pane(&uris.base, &uris.merged, "Base -> Merged", true), sizes[1]),
                        sized(pane(&uris.remote, &uris.merged, "Remote -> Merged", false), sizes[2]),
                    ],
                }
            }
        }
    }
}

impl std::fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.setting_value())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

fn pane(old: &Path, new: &Path, title: &str, merge_editor: bool) -> DiffPane {
    DiffPane {
        old: old.to_path_buf(),
        new: new.to_path_buf(),
        title: title.to_string(),
        save: merge_editor,
        is_merge_editor: merge_editor,
        size: 0.0,
    }
}

fn sized(mut pane: DiffPane, size: f64) -> LayoutElement {
    pane.size = size;
    LayoutElement::Diff(pane)
}

fn group(size: f64, groups: Vec<LayoutElement>) -> LayoutElement {
    LayoutElement::Group { size, groups }
}

fn pair(first: bool, second: bool) -> (f64, f64) {
    if first {
        (ZOOMED_PAIR, MIN_PANE_SIZE)
    } else if second {
        (MIN_PANE_SIZE, ZOOMED_PAIR)
    } else {
        (0.5, 0.5)
    }
}

fn triple(focus: [bool; 3]) -> [f64; 3] {
    match focus.iter().position(|&f| f) {
        Some(i) => {
            let mut sizes = [MIN_PANE_SIZE; 3];
            sizes[i] = ZOOMED_TRIPLE;
            sizes
        }
        None => [1.0 / 3.0; 3],
    }
}
