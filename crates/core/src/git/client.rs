//! Invocation of the external `git` binary.
//!
//! Only `git merge-file` is used: it performs the three-way text merge that
//! produces a fresh merged file with conflict markers.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::config::GitConfig;
use crate::errors::GitError;

/// Highest exit code `git merge-file` uses to report remaining conflicts.
const MAX_CONFLICT_EXIT_CODE: i32 = 127;

/// Thin async wrapper around the `git` executable.
#[derive(Debug, Clone)]
pub struct GitClient {
    binary: PathBuf,
    reaction_timeout: Duration,
}

/// Result of a successful `git merge-file --stdout` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeFileOutput {
    /// Merged text, possibly containing conflict markers.
    pub contents: String,
    /// Raw exit code; the number of conflicts (capped by git).
    pub exit_code: i32,
}

impl MergeFileOutput {
    pub fn has_conflicts(&self) -> bool {
        self.exit_code > 0
    }
}

/// Map a process exit code onto success (conflict count) or failure.
///
/// `None` means the process was terminated by a signal.
pub fn classify_merge_exit(code: Option<i32>) -> Option<i32> {
    match code {
        Some(c) if (0..=MAX_CONFLICT_EXIT_CODE).contains(&c) => Some(c),
        _ => None,
    }
}

impl GitClient {
    pub fn new(binary: impl Into<PathBuf>, reaction_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            reaction_timeout,
        }
    }

    pub fn from_config(config: &GitConfig) -> Self {
        Self::new(config.binary.clone(), config.reaction_timeout())
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run `git merge-file --stdout <local> <base> <remote>`.
    ///
    /// If the process is still running after the reaction timeout, `on_slow`
    /// is awaited once while the process keeps running.
    #[instrument(skip(self, on_slow), fields(local = %local.display(), base = %base.display(), remote = %remote.display()))]
    pub async fn merge_file<F>(
        &self,
        local: &Path,
        base: &Path,
        remote: &Path,
        on_slow: F,
    ) -> Result<MergeFileOutput, GitError>
    where
        F: Future<Output = ()>,
    {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("merge-file")
            .arg("--stdout")
            .arg(local)
            .arg(base)
            .arg(remote)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(binary = %self.binary.display(), "running git merge-file");
        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GitError::BinaryNotFound(self.binary.display().to_string())
            } else {
                GitError::IoError(e)
            }
        })?;

        let output = child.wait_with_output();
        tokio::pin!(output);
        let output = tokio::select! {
            result = &mut output => result?,
            _ = tokio::time::sleep(self.reaction_timeout) => {
                info!(timeout_ms = self.reaction_timeout.as_millis() as u64, "git merge-file is slow to react");
                on_slow.await;
                output.await?
            }
        };

        let Some(exit_code) = classify_merge_exit(output.status.code()) else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(exit_code = ?output.status.code(), %stderr, "git merge-file failed");
            return Err(GitError::CommandFailed {
                command: "merge-file".into(),
                exit_code: output.status.code(),
                stderr,
            });
        };

        let contents = String::from_utf8(output.stdout).map_err(|_| GitError::InvalidOutput {
            command: "merge-file".into(),
        })?;
        debug!(exit_code, bytes = contents.len(), "git merge-file finished");
        Ok(MergeFileOutput { contents, exit_code })
    }
}
