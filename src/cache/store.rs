//! Cache store - fingerprint-addressed build artifacts
//!
//! Layout under the cache root:
//!
//! ```text
//! <root>/<fingerprint>/<artifact>     built executable (or class file)
//! <root>/<fingerprint>/.info.json     sidecar, written last
//! <root>/.locks/<fingerprint>.lock    advisory lock held while building
//! <root>/.staging-XXXXXX/             in-flight builds
//! ```
//!
//! An entry is only a hit when both the artifact and the sidecar exist.

use fs4::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cache::fingerprint::BuildFingerprint;
use crate::cache::meta::{read_info, write_info, BuildInfo};
use crate::core::error::{BincError, Result};
use crate::core::paths::ensure_dir;

/// Directory holding one lock file per fingerprint.
pub const LOCKS_DIR: &str = ".locks";

/// Name prefix of staging directories.
pub const STAGING_PREFIX: &str = ".staging-";

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<digest>`
    pub fn entry_dir(&self, digest: &str) -> PathBuf {
        self.root.join(digest)
    }

    /// Return the cached artifact if the entry is complete.
    pub fn lookup(&self, fingerprint: &BuildFingerprint, artifact_name: &str) -> Option<PathBuf> {
        let entry = self.entry_dir(fingerprint.digest());
        let artifact = entry.join(artifact_name);
        is_complete(&entry, &artifact).then_some(artifact)
    }

    /// Return the artifact for `fingerprint`, building it on a miss.
    ///
    /// `build` receives an empty staging directory and must leave the
    /// artifact at `<staging>/<artifact_name>`. The staging directory is
    /// renamed into place as a whole, then the sidecar is written. Build
    /// errors are returned unchanged and leave no entry behind.
    ///
    /// The check-build-publish sequence runs under an exclusive advisory
    /// lock on the fingerprint, so concurrent invocations build at most once.
    pub fn get_or_build<F>(
        &self,
        fingerprint: &BuildFingerprint,
        artifact_name: &str,
        force_rebuild: bool,
        build: F,
    ) -> Result<PathBuf>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        if !force_rebuild {
            if let Some(artifact) = self.lookup(fingerprint, artifact_name) {
                debug!(fingerprint = fingerprint.short(), "cache hit");
                return Ok(artifact);
            }
        }

        ensure_dir(&self.root)?;
        let _lock = self.acquire_lock(fingerprint.digest())?;

        // Another process may have finished the same build while we waited.
        if !force_rebuild {
            if let Some(artifact) = self.lookup(fingerprint, artifact_name) {
                debug!(fingerprint = fingerprint.short(), "cache hit after lock");
                return Ok(artifact);
            }
        }

        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.root)
            .map_err(|e| BincError::io(&self.root, e))?;

        build(staging.path())?;

        let staged = staging.path().join(artifact_name);
        if !staged.is_file() {
            return Err(BincError::NotFound { path: staged });
        }

        let entry = self.entry_dir(fingerprint.digest());
        if entry.exists() {
            fs::remove_dir_all(&entry).map_err(|e| BincError::io(&entry, e))?;
        }
        fs::rename(staging.path(), &entry).map_err(|e| BincError::io(&entry, e))?;
        write_info(&entry, &BuildInfo::new(fingerprint))?;

        let artifact = entry.join(artifact_name);
        info!(
            fingerprint = fingerprint.short(),
            "built: {}",
            artifact.display()
        );
        Ok(artifact)
    }

    /// Entry directories currently in the cache (hidden names excluded).
    pub fn entries(&self) -> Result<Vec<PathBuf>> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BincError::io(&self.root, e)),
        };

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| BincError::io(&self.root, e))?;
            let name = dir_entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = dir_entry
                .file_type()
                .map_err(|e| BincError::io(dir_entry.path(), e))?;
            if file_type.is_dir() {
                entries.push(dir_entry.path());
            }
        }
        entries.sort();
        Ok(entries)
    }

    /// Block until the fingerprint's lock is ours. Released on drop.
    pub fn acquire_lock(&self, digest: &str) -> Result<File> {
        let path = self.lock_path(digest);
        loop {
            let file = self.open_lock_file(digest)?;
            file.lock_exclusive().map_err(|e| BincError::io(&path, e))?;
            if is_current_lock(&file, &path)? {
                return Ok(file);
            }
            debug!(lock = %path.display(), "lock file removed while waiting; retrying");
        }
    }

    /// Take the fingerprint's lock only if nobody holds it.
    pub fn try_lock(&self, digest: &str) -> Result<Option<File>> {
        let path = self.lock_path(digest);
        loop {
            let file = self.open_lock_file(digest)?;
            match file.try_lock_exclusive() {
                Ok(()) if is_current_lock(&file, &path)? => return Ok(Some(file)),
                Ok(()) => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(err) => return Err(BincError::io(&path, err)),
            }
        }
    }

    /// Unlink a fingerprint's lock file. Call only while holding the lock;
    /// waiters find their inode unlinked and reopen.
    pub fn remove_lock_file(&self, digest: &str) -> Result<()> {
        let path = self.lock_path(digest);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BincError::io(&path, e)),
        }
    }

    /// Fingerprints that have a lock file, sorted.
    pub fn locked_digests(&self) -> Result<Vec<String>> {
        let dir = self.root.join(LOCKS_DIR);
        let read_dir = match fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BincError::io(&dir, e)),
        };

        let mut digests = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| BincError::io(&dir, e))?;
            let name = dir_entry.file_name();
            if let Some(digest) = name.to_str().and_then(|n| n.strip_suffix(".lock")) {
                digests.push(digest.to_string());
            }
        }
        digests.sort();
        Ok(digests)
    }

    pub fn lock_path(&self, digest: &str) -> PathBuf {
        self.root.join(LOCKS_DIR).join(format!("{}.lock", digest))
    }

    fn open_lock_file(&self, digest: &str) -> Result<File> {
        let path = self.lock_path(digest);
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| BincError::io(&path, e))
    }
}

/// Whether `file` is still the lock file at `path`. A lock taken on an
/// inode the janitor has since unlinked guards nothing.
#[cfg(unix)]
fn is_current_lock(file: &File, path: &Path) -> Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata().map_err(|e| BincError::io(path, e))?;
    match fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(BincError::io(path, e)),
    }
}

#[cfg(not(unix))]
fn is_current_lock(_file: &File, _path: &Path) -> Result<bool> {
    Ok(true)
}

/// Artifact present and sidecar readable. A torn sidecar counts as absent.
fn is_complete(entry: &Path, artifact: &Path) -> bool {
    artifact.is_file() && read_info(entry).is_ok()
}
