//! Narrow interfaces to the editor hosting the merge layouts.
//!
//! Window management, settings storage, file access and UI prompts belong to
//! the host. The core only talks to them through the traits in this module,
//! which keeps every layout and scroll component testable against fakes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::HostError;
use crate::events::EventEmitter;
use crate::layout::description::LayoutDescription;

/// Host-assigned identity of one open pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaneId(pub u64);

impl std::fmt::Display for PaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pane#{}", self.0)
    }
}

/// Snapshot of a visible pane as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneInfo {
    pub id: PaneId,
    /// Document shown in the pane (the modified side for diff panes).
    pub document: PathBuf,
    /// One-based view column the pane lives in.
    pub column: u32,
}

/// Request to open a two-sided diff pane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffPaneRequest {
    pub old: PathBuf,
    pub new: PathBuf,
    pub title: String,
    pub column: u32,
}

/// A text view inside an open pane (the modified side of a diff pane).
pub trait TextPane: Send + Sync {
    fn id(&self) -> PaneId;
    /// Document currently displayed.
    fn document(&self) -> PathBuf;
    /// Full current text, including unsaved edits.
    fn text(&self) -> String;
    fn line_count(&self) -> usize;
    /// First visible line, or `None` while the pane is not laid out.
    fn visible_top_line(&self) -> Option<usize>;
    /// Scroll so that `line` becomes the first visible line.
    fn reveal_line_at_top(&self, line: usize);
    /// Line the cursor is on.
    fn cursor_line(&self) -> usize;
    /// Move the cursor to `line` and scroll it into the center of the view.
    fn select_line(&self, line: usize);
}

/// Metadata of a file as far as the core cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStats {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Fallible file access. Failures are reported as `None`/`false`, never as
/// panics or errors crossing this boundary.
#[async_trait]
pub trait ContentAccess: Send + Sync {
    async fn get_contents(&self, path: &Path) -> Option<String>;
    async fn get_stats(&self, path: &Path) -> Option<FileStats>;
    async fn write_contents(&self, path: &Path, contents: &str) -> bool;
    async fn copy(&self, from: &Path, to: &Path) -> bool;
}

/// Editor services consumed by the layout subsystem.
#[async_trait]
pub trait EditorHost: Send + Sync {
    /// Arrange the editor grid according to `layout`.
    async fn set_pane_layout(&self, layout: &LayoutDescription) -> Result<(), HostError>;

    /// Open a diff pane in the requested column and return its text view.
    async fn open_diff_pane(&self, request: DiffPaneRequest) -> Result<Arc<dyn TextPane>, HostError>;

    /// Give keyboard focus to `pane`.
    async fn focus_pane(&self, pane: PaneId) -> Result<(), HostError>;

    /// Give keyboard focus to a view column.
    async fn focus_column(&self, column: u32) -> Result<(), HostError>;

    /// Close whatever pane currently has focus.
    async fn close_active_pane(&self) -> Result<(), HostError>;

    /// Save the document, returning whether it was written.
    async fn save_document(&self, document: &Path) -> Result<bool, HostError>;

    /// Panes currently visible, in column order.
    fn visible_panes(&self) -> Vec<PaneInfo>;

    /// Current value of a host setting, `None` if unset.
    fn get_setting(&self, key: &str) -> Option<Value>;

    /// Set (`Some`) or reset (`None`) a host setting.
    async fn update_setting(&self, key: &str, value: Option<Value>) -> Result<(), HostError>;

    async fn show_info(&self, message: &str);
    async fn show_error(&self, message: &str);

    /// Ask the user to pick one of `options`; `None` when dismissed.
    async fn pick(&self, prompt: &str, options: &[&str]) -> Option<usize>;

    /// Show (`Some`) or remove (`None`) the status indicator text.
    fn set_status(&self, text: Option<&str>);
}

/// Notifications the host forwards into the core.
///
/// The host integration owns one `HostEvents` and fires the emitters from its
/// own callbacks; layout components subscribe while they are employed.
#[derive(Debug, Default)]
pub struct HostEvents {
    /// The set of visible panes changed.
    pub visible_panes_changed: EventEmitter<Vec<PaneInfo>>,
    /// The visible range of a pane changed (user or programmatic scroll).
    pub visible_range_changed: EventEmitter<PaneId>,
    /// The text of a document changed.
    pub document_changed: EventEmitter<PathBuf>,
    /// A file was deleted on disk.
    pub file_deleted: EventEmitter<PathBuf>,
}

impl HostEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

/// [`ContentAccess`] backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

#[async_trait]
impl ContentAccess for LocalFs {
    async fn get_contents(&self, path: &Path) -> Option<String> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Some(contents),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "could not read file");
                None
            }
        }
    }

    async fn get_stats(&self, path: &Path) -> Option<FileStats> {
        let metadata = tokio::fs::metadata(path).await.ok()?;
        Some(FileStats {
            size: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }

    async fn write_contents(&self, path: &Path, contents: &str) -> bool {
        match tokio::fs::write(path, contents).await {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not write file");
                false
            }
        }
    }

    async fn copy(&self, from: &Path, to: &Path) -> bool {
        match tokio::fs::copy(from, to).await {
            Ok(_) => true,
            Err(e) => {
                warn!(from = %from.display(), to = %to.display(), error = %e, "could not copy file");
                false
            }
        }
    }
}
