//! Alias symlinks in the links directory
//!
//! Every alias is a relative symlink `<links>/<command> -> .binc`, so the
//! installed dispatcher sees the command name as its `argv[0]`. Entries
//! pointing anywhere else belong to the user and are never touched.

use std::fs;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use crate::core::error::{BincError, Result};
use crate::core::paths::DISPATCHER_BASE;

/// Whether `path` is one of our alias symlinks.
pub fn is_alias(path: &Path) -> bool {
    fs::read_link(path)
        .map(|target| target == Path::new(DISPATCHER_BASE))
        .unwrap_or(false)
}

/// Remove every alias symlink from `links_dir`. Returns how many went.
pub fn remove_aliases(links_dir: &Path) -> Result<usize> {
    if !links_dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in WalkDir::new(links_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(links_dir).to_path_buf();
            match e.into_io_error() {
                Some(io) => BincError::io(path, io),
                None => BincError::NotFound { path },
            }
        })?;
        if !entry.path_is_symlink() || !is_alias(entry.path()) {
            continue;
        }
        fs::remove_file(entry.path()).map_err(|e| BincError::io(entry.path(), e))?;
        removed += 1;
    }
    debug!(removed, "removed alias links");
    Ok(removed)
}

/// Create `<links_dir>/<name> -> .binc`.
///
/// Returns `false` without touching anything when the name is already taken.
pub fn create_alias(links_dir: &Path, name: &str) -> Result<bool> {
    let link = links_dir.join(name);
    if fs::symlink_metadata(&link).is_ok() {
        return Ok(false);
    }
    symlink(Path::new(DISPATCHER_BASE), &link).map_err(|e| BincError::io(&link, e))?;
    Ok(true)
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "alias links need a unix filesystem",
    ))
}
