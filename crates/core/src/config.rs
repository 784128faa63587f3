//! TOML-based configuration for MergePane.
//!
//! Every section is optional; missing values fall back to the defaults
//! documented on each field.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::layout::arrangements::LayoutKind;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Layout selection.
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Scroll synchronization tuning.
    #[serde(default)]
    pub scroll: ScrollConfig,

    /// External `git` invocation.
    #[serde(default)]
    pub git: GitConfig,

    /// Host settings overridden while a layout is active.
    #[serde(default)]
    pub editor: EditorConfig,

    /// Persisted state location.
    #[serde(default)]
    pub state: StateConfig,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Arrangement key used when no choice has been persisted yet.
    #[serde(default = "default_layout")]
    pub default: String,
}

fn default_layout() -> String {
    LayoutKind::default().setting_value().into()
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            default: default_layout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scroll synchronization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollConfig {
    /// Keep panes scroll-synchronized while a layout is active.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lines kept visible above a revealed line (default 3).
    #[serde(default = "default_surrounding_lines")]
    pub surrounding_lines: usize,

    /// Fraction of the self-scroll ignore strength retained after one second.
    #[serde(default = "default_decay_per_sec")]
    pub decay_per_sec: f64,

    /// Documents longer than this many characters are not diffed; their
    /// panes scroll proportionally by line count instead.
    #[serde(default = "default_max_diff_chars")]
    pub max_diff_chars: usize,
}

fn default_true() -> bool {
    true
}
fn default_surrounding_lines() -> usize {
    3
}
fn default_decay_per_sec() -> f64 {
    0.05
}
fn default_max_diff_chars() -> usize {
    500_000
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            surrounding_lines: default_surrounding_lines(),
            decay_per_sec: default_decay_per_sec(),
            max_diff_chars: default_max_diff_chars(),
        }
    }
}

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Name or path of the git executable.
    #[serde(default = "default_git_binary")]
    pub binary: PathBuf,

    /// Milliseconds after which a still-running git process is reported to
    /// the user (default 1500).
    #[serde(default = "default_reaction_timeout_ms")]
    pub reaction_timeout_ms: u64,
}

fn default_git_binary() -> PathBuf {
    PathBuf::from("git")
}
fn default_reaction_timeout_ms() -> u64 {
    1500
}

impl GitConfig {
    pub fn reaction_timeout(&self) -> Duration {
        Duration::from_millis(self.reaction_timeout_ms)
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: default_git_binary(),
            reaction_timeout_ms: default_reaction_timeout_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Editor overrides
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Setting key -> value applied while a layout is active. The previous
    /// values are persisted and restored on deactivation.
    #[serde(default = "default_overrides")]
    pub overrides: BTreeMap<String, Value>,
}

fn default_overrides() -> BTreeMap<String, Value> {
    BTreeMap::from([("diffEditor.renderSideBySide".to_string(), Value::Bool(false))])
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            overrides: default_overrides(),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Directory holding the state database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mergepane"))
        .unwrap_or_else(|| PathBuf::from(".mergepane"))
}

impl StateConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("state.db")
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Default location: `<config dir>/mergepane/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("mergepane").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("mergepane.toml"))
    }

    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults. The result is
    /// validated either way.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            debug!(path = %path.display(), "no configuration file, using defaults");
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate that all values are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if LayoutKind::from_setting_value(&self.layout.default).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "layout.default".into(),
                detail: format!("unknown layout '{}'", self.layout.default),
            });
        }
        if !(self.scroll.decay_per_sec > 0.0 && self.scroll.decay_per_sec < 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "scroll.decay_per_sec".into(),
                detail: "must be between 0 and 1 (exclusive)".into(),
            });
        }
        if self.scroll.max_diff_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scroll.max_diff_chars".into(),
                detail: "must be > 0".into(),
            });
        }
        if self.git.binary.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "git.binary".into(),
                detail: "git binary must not be empty".into(),
            });
        }
        if self.git.reaction_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "git.reaction_timeout_ms".into(),
                detail: "reaction timeout must be > 0".into(),
            });
        }

        Ok(())
    }
}
