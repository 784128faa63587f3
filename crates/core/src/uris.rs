//! The set of sibling files that make up one conflict resolution session.
//!
//! `git mergetool` writes the three unmerged variants next to the conflicted
//! file as `<name>_BASE_<pid><ext>`, `<name>_LOCAL_<pid><ext>` and
//! `<name>_REMOTE_<pid><ext>` (plus an optional `<name>_BACKUP_<pid><ext>`).
//! Editors that open them through a version-control scheme may append a
//! trailing `.git`, which is ignored for identity purposes.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Trailing suffix added by version-control file schemes.
const VCS_SUFFIX: &str = ".git";

fn sibling_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.*)_(BASE|LOCAL|REMOTE)_(\d+)(.*?)(\.git)?$").expect("valid sibling regex")
    })
}

/// Which unmerged variant a sibling path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiblingKind {
    Base,
    Local,
    Remote,
}

impl SiblingKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "BASE" => Some(Self::Base),
            "LOCAL" => Some(Self::Local),
            "REMOTE" => Some(Self::Remote),
            _ => None,
        }
    }
}

/// Immutable tuple of the files taking part in one merge.
///
/// `base`, `local` and `remote` are only ever displayed; `merged` is the only
/// file a layout writes to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffedUris {
    pub base: PathBuf,
    pub local: PathBuf,
    pub remote: PathBuf,
    pub merged: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
}

impl DiffedUris {
    pub fn new(
        base: impl Into<PathBuf>,
        local: impl Into<PathBuf>,
        remote: impl Into<PathBuf>,
        merged: impl Into<PathBuf>,
        backup: Option<PathBuf>,
    ) -> Self {
        Self {
            base: base.into(),
            local: local.into(),
            remote: remote.into(),
            merged: merged.into(),
            backup,
        }
    }

    /// Derive the whole file set from the path of any BASE/LOCAL/REMOTE
    /// sibling. Returns `None` if the file name does not follow the naming
    /// convention.
    pub fn from_sibling_path(path: &Path) -> Option<Self> {
        Self::parse_sibling_path(path).map(|(_, uris)| uris)
    }

    /// Like [`from_sibling_path`](Self::from_sibling_path), also reporting
    /// which variant `path` itself is.
    pub fn parse_sibling_path(path: &Path) -> Option<(SiblingKind, Self)> {
        let file_name = path.file_name()?.to_str()?;
        let caps = sibling_regex().captures(file_name)?;
        let name = caps.get(1)?.as_str();
        let kind = SiblingKind::from_tag(caps.get(2)?.as_str())?;
        let pid = caps.get(3)?.as_str();
        let ext = caps.get(4).map_or("", |m| m.as_str());
        if name.is_empty() {
            return None;
        }

        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let sibling = |tag: &str| dir.join(format!("{name}_{tag}_{pid}{ext}"));
        let uris = Self {
            base: sibling("BASE"),
            local: sibling("LOCAL"),
            remote: sibling("REMOTE"),
            merged: dir.join(format!("{name}{ext}")),
            backup: Some(sibling("BACKUP")),
        };
        debug!(path = %path.display(), ?kind, merged = %uris.merged.display(), "parsed sibling path");
        Some((kind, uris))
    }

    /// The four mandatory files in `base, local, remote, merged` order.
    pub fn required_paths(&self) -> [&Path; 4] {
        [&self.base, &self.local, &self.remote, &self.merged]
    }

    /// All files of the set, including the backup if there is one.
    pub fn all_paths(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = self.required_paths().to_vec();
        if let Some(backup) = &self.backup {
            paths.push(backup);
        }
        paths
    }

    /// Whether `path` denotes one of the files of this set.
    pub fn contains(&self, path: &Path) -> bool {
        self.all_paths().into_iter().any(|p| paths_equal(p, path))
    }

    /// Whether `path` is the writable merge output.
    pub fn is_writable(&self, path: &Path) -> bool {
        paths_equal(&self.merged, path)
    }

    /// Compare two file sets, backup included.
    pub fn equals(&self, other: &Self) -> bool {
        self.equals_without_backup(other)
            && match (&self.backup, &other.backup) {
                (Some(a), Some(b)) => paths_equal(a, b),
                (None, None) => true,
                _ => false,
            }
    }

    /// Compare two file sets ignoring the backup file.
    pub fn equals_without_backup(&self, other: &Self) -> bool {
        self.required_paths()
            .iter()
            .zip(other.required_paths().iter())
            .all(|(a, b)| paths_equal(a, b))
    }
}

/// Normalise a path for identity comparison: drop a trailing `.git` suffix
/// and collapse `.` components and redundant separators.
pub fn normalize_path(path: &Path) -> PathBuf {
    let stripped = match path.to_str() {
        Some(s) => Path::new(s.strip_suffix(VCS_SUFFIX).unwrap_or(s)),
        None => path,
    };
    stripped
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Path equality that treats `path` and `path.git` as the same file.
pub fn paths_equal(a: &Path, b: &Path) -> bool {
    normalize_path(a) == normalize_path(b)
}
