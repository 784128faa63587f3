//! Temporary host setting overrides.
//!
//! While a layout is active some host settings must differ from the user's
//! choice (side-by-side diff rendering would fight the split layout). The
//! previous value of every overridden setting is persisted before it is
//! changed, so it can be put back on deactivation or, after a crash, on the
//! next start.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::db::{Database, KEY_PREFIX};
use crate::errors::CoreError;
use crate::host::EditorHost;

/// Key prefix under which previous setting values are stored.
pub fn backup_prefix() -> String {
    format!("{KEY_PREFIX}settings_backup.")
}

/// Applies and reverts a fixed set of host setting overrides.
pub struct TemporarySettings {
    host: Arc<dyn EditorHost>,
    db: Arc<Database>,
    overrides: BTreeMap<String, Value>,
}

impl std::fmt::Debug for TemporarySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporarySettings")
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

impl TemporarySettings {
    pub fn new(host: Arc<dyn EditorHost>, db: Arc<Database>, overrides: BTreeMap<String, Value>) -> Self {
        Self { host, db, overrides }
    }

    pub fn overrides(&self) -> &BTreeMap<String, Value> {
        &self.overrides
    }

    /// Back up the current values and apply the overrides.
    ///
    /// An existing backup is kept as is: it holds the user's value from
    /// before an earlier activation that never got to restore it.
    pub async fn apply(&self) -> Result<(), CoreError> {
        let prefix = backup_prefix();
        for (key, value) in &self.overrides {
            let backup_key = format!("{prefix}{key}");
            if self.db.get_state(&backup_key)?.is_none() {
                let previous = self.host.get_setting(key).unwrap_or(Value::Null);
                self.db.set_json(&backup_key, &previous)?;
                debug!(setting = %key, %previous, "backed up setting");
            }
            self.host.update_setting(key, Some(value.clone())).await?;
        }
        Ok(())
    }

    /// Put back every backed up value and forget the backups.
    ///
    /// Restores whatever backups exist, including ones whose key is no longer
    /// among the configured overrides.
    pub async fn restore(&self) -> Result<usize, CoreError> {
        let prefix = backup_prefix();
        let backups = self.db.keys_with_prefix(&prefix)?;
        let mut restored = 0;
        for backup_key in backups {
            let key = &backup_key[prefix.len()..];
            let previous = match self.db.get_json::<Value>(&backup_key) {
                Ok(Some(Value::Null)) => None,
                Ok(Some(v)) => Some(v),
                Ok(None) => continue,
                Err(e) => {
                    warn!(setting = %key, error = %e, "discarding unreadable setting backup");
                    self.db.delete_state(&backup_key)?;
                    continue;
                }
            };
            self.host.update_setting(key, previous).await?;
            self.db.delete_state(&backup_key)?;
            restored += 1;
        }
        if restored > 0 {
            info!(restored, "restored temporarily overridden settings");
        }
        Ok(restored)
    }
}
