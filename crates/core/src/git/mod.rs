//! External `git` invocation.

pub mod client;

pub use client::{classify_merge_exit, GitClient, MergeFileOutput};
