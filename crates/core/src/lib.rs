//! MergePane core library.
//!
//! This crate provides the components behind multi-pane merge conflict
//! layouts: diff-based line mapping, scroll synchronization between panes,
//! the layout state machine and its manager, plus configuration, persisted
//! state and `git merge-file` invocation. The editor itself is reached only
//! through the traits in [`host`].

pub mod config;
pub mod conflict_markers;
pub mod db;
pub mod errors;
pub mod events;
pub mod git;
pub mod host;
pub mod layout;
pub mod mapping;
pub mod merge;
pub mod monitor;
pub mod scroll_sync;
pub mod uris;

// Re-exports for convenience.
pub use config::AppConfig;
pub use db::Database;
pub use layout::{DiffLayouterManager, LayoutKind, SplitDiffLayouter, Zoom};
pub use mapping::{DiffLineMapper, IdentityLineMapper, LineMapper};
pub use monitor::Monitor;
pub use scroll_sync::ScrollSynchronizer;
pub use uris::DiffedUris;
