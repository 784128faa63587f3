//! Multi-pane merge layouts.
//!
//! - [`description`] and [`arrangements`] describe *what* is shown where.
//! - [`split_layouter::SplitDiffLayouter`] opens, tracks and tears down the
//!   panes of one arrangement for one file set.
//! - [`manager::DiffLayouterManager`] decides which layout is active and
//!   reacts to sibling files being opened.

pub mod arrangements;
pub mod description;
pub mod manager;
pub mod settings;
pub mod split_layouter;

use std::sync::Arc;

pub use arrangements::LayoutKind;
pub use description::{DiffPane, GroupOrientation, LayoutDescription, LayoutElement, Zoom};
pub use manager::DiffLayouterManager;
pub use settings::TemporarySettings;
pub use split_layouter::SplitDiffLayouter;

use crate::config::ScrollConfig;
use crate::host::{ContentAccess, EditorHost, HostEvents};

/// Collaborators shared by the manager and every layout it creates.
#[derive(Clone)]
pub struct LayoutServices {
    pub host: Arc<dyn EditorHost>,
    pub events: Arc<HostEvents>,
    pub content: Arc<dyn ContentAccess>,
    pub settings: Arc<TemporarySettings>,
    pub scroll: ScrollConfig,
}

impl std::fmt::Debug for LayoutServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutServices")
            .field("scroll", &self.scroll)
            .finish_non_exhaustive()
    }
}

/// Spawn `future` on the current tokio runtime, if there is one.
///
/// Event handlers run synchronously inside the host's callbacks; work that
/// needs to await is moved onto a task.
pub(crate) fn spawn_detached<F>(what: &'static str, future: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
        }
        Err(_) => tracing::warn!(what, "no async runtime available, dropping event"),
    }
}
