//! Filesystem layout under the user's home directory
//!
//! ```text
//! <home>/.binc/                 alias directory (one symlink per command)
//! <home>/.binc/.binc            installed dispatcher binary
//! <home>/.binc/.cache/<fp>/     one directory per build fingerprint
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::{BincError, Result};

/// Name of the alias directory under the home directory.
pub const LINKS_DIR: &str = ".binc";

/// File name of the installed dispatcher inside the alias directory.
/// Every alias symlink points at this name.
pub const DISPATCHER_BASE: &str = ".binc";

/// Name of the cache root inside the alias directory.
pub const CACHE_DIR: &str = ".cache";

/// Resolved on-disk locations for one home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BincPaths {
    home: PathBuf,
}

impl BincPaths {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// `<home>/.binc`
    pub fn links_dir(&self) -> PathBuf {
        self.home.join(LINKS_DIR)
    }

    /// `<home>/.binc/.cache`
    pub fn cache_root(&self) -> PathBuf {
        self.links_dir().join(CACHE_DIR)
    }

    /// `<home>/.binc/.binc`
    pub fn dispatcher_path(&self) -> PathBuf {
        self.links_dir().join(DISPATCHER_BASE)
    }

    /// Create the alias directory and cache root if missing.
    pub fn ensure(&self) -> Result<()> {
        ensure_dir(&self.cache_root())
    }
}

/// Create a directory (and parents) if it does not exist yet.
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| BincError::io(path, e))
}

/// Check if a path is hidden or private (starts with '.' or '_')
pub fn is_ignored_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.') || name.starts_with('_'))
        .unwrap_or(false)
}

/// Base name of a path as a string (lossy).
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Walk up from `start` (inclusive) and return the first directory in which
/// `matches` finds a file.
pub fn find_upwards<F>(start: &Path, mut matches: F) -> Option<PathBuf>
where
    F: FnMut(&Path) -> Option<PathBuf>,
{
    let mut dir = Some(start);
    while let Some(current) = dir {
        if let Some(found) = matches(current) {
            return Some(found);
        }
        dir = current.parent();
    }
    None
}
