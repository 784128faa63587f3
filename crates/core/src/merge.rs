//! Actions on the files of a merge situation.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::errors::{ContentError, CoreError};
use crate::git::{GitClient, MergeFileOutput};
use crate::host::{ContentAccess, EditorHost};
use crate::uris::DiffedUris;

/// Rewrites or restores the merged file of a [`DiffedUris`] set.
#[derive(Clone)]
pub struct MergeActions {
    git: GitClient,
    content: Arc<dyn ContentAccess>,
    host: Arc<dyn EditorHost>,
}

impl std::fmt::Debug for MergeActions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeActions")
            .field("git", &self.git)
            .finish_non_exhaustive()
    }
}

impl MergeActions {
    pub fn new(git: GitClient, content: Arc<dyn ContentAccess>, host: Arc<dyn EditorHost>) -> Self {
        Self { git, content, host }
    }

    /// Recreate the merged file from local, base and remote with
    /// `git merge-file`. Nothing is written unless git succeeded.
    #[instrument(skip(self, uris), fields(merged = %uris.merged.display()))]
    pub async fn reset_merged_file(&self, uris: &DiffedUris) -> Result<MergeFileOutput, CoreError> {
        let host = Arc::clone(&self.host);
        let on_slow = async move {
            host.show_info("Waiting for git merge-file to finish...").await;
        };
        let output = match self
            .git
            .merge_file(&uris.local, &uris.base, &uris.remote, on_slow)
            .await
        {
            Ok(output) => output,
            Err(e) => return Err(self.report(e.into()).await),
        };

        if !self.content.write_contents(&uris.merged, &output.contents).await {
            let err = ContentError::WriteFailed(uris.merged.display().to_string());
            return Err(self.report(err.into()).await);
        }
        info!(exit_code = output.exit_code, conflicts = output.has_conflicts(), "merged file reset");
        Ok(output)
    }

    /// Copy the backup sibling over the merged file.
    #[instrument(skip(self, uris), fields(merged = %uris.merged.display()))]
    pub async fn restore_backup(&self, uris: &DiffedUris) -> Result<(), CoreError> {
        let Some(backup) = uris.backup.as_deref() else {
            let err = ContentError::ReadFailed("backup file".into());
            return Err(self.report(err.into()).await);
        };
        if self.content.get_stats(backup).await.is_none() {
            let err = ContentError::ReadFailed(backup.display().to_string());
            return Err(self.report(err.into()).await);
        }
        if !self.content.copy(backup, &uris.merged).await {
            let err = ContentError::CopyFailed {
                from: backup.display().to_string(),
                to: uris.merged.display().to_string(),
            };
            return Err(self.report(err.into()).await);
        }
        info!(backup = %backup.display(), "merged file restored from backup");
        Ok(())
    }

    async fn report(&self, err: CoreError) -> CoreError {
        warn!(error = %err, "merge action failed");
        self.host.show_error(&err.to_string()).await;
        err
    }
}
