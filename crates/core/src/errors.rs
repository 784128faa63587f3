//! Error types for the MergePane core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Host(#[from] HostError),
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from invoking the external `git` binary.
#[derive(Debug, Error)]
pub enum GitError {
    /// The `git` binary was not found on `$PATH`.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// The process ended without an exit code (killed by a signal) or with a
    /// code outside the range `git merge-file` uses to report conflicts.
    #[error("git {command} failed (exit {exit_code:?}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The process produced output that is not valid UTF-8.
    #[error("git {command} produced non UTF-8 output")]
    InvalidOutput { command: String },

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Content errors
// ---------------------------------------------------------------------------

/// Errors from reading, writing or copying file contents.
#[derive(Debug, Error)]
pub enum ContentError {
    /// A file could not be read.
    #[error("could not read '{0}'")]
    ReadFailed(String),

    /// A file could not be written.
    #[error("could not write '{0}'")]
    WriteFailed(String),

    /// A file could not be copied.
    #[error("could not copy '{from}' to '{to}'")]
    CopyFailed { from: String, to: String },
}

// ---------------------------------------------------------------------------
// Layout errors
// ---------------------------------------------------------------------------

/// Errors from the layout state machine and layout selection.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// No arrangement strategy was registered with the manager.
    #[error("no layout arrangements registered")]
    NoLayouts,

    /// The persisted or configured arrangement key is not known.
    #[error("unknown layout arrangement '{0}'")]
    UnknownLayout(String),

    /// The layout is already employed (activating or active).
    #[error("layout is already employed")]
    AlreadyEmployed,

    /// Another request is queued on the layout monitor; activating now would
    /// be superseded immediately.
    #[error("layout activation superseded by a queued request")]
    Superseded,

    /// The layout instance was deactivated before and cannot be reused.
    #[error("layout instance was already deactivated")]
    Retired,

    /// A merge action was requested while no merge layout is active.
    #[error("there is no active merge situation")]
    NoActiveMerge,

    /// Opening a pane or arranging the grid failed on the host side.
    #[error("layout host operation failed: {0}")]
    Host(#[from] HostError),
}

// ---------------------------------------------------------------------------
// Host errors
// ---------------------------------------------------------------------------

/// Errors reported by the host editor integration.
#[derive(Debug, Error)]
pub enum HostError {
    /// A host command was rejected or failed.
    #[error("host command '{command}' failed: {detail}")]
    CommandFailed { command: String, detail: String },

    /// The referenced pane no longer exists.
    #[error("pane {0} is gone")]
    PaneGone(u64),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite persistence layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// A stored value could not be decoded.
    #[error("corrupt state value for '{key}': {detail}")]
    CorruptValue { key: String, detail: String },

    /// Generic I/O error (e.g. file permissions).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
