//! Build fingerprints
//!
//! A fingerprint is a SHA-1 digest over the toolchain version, the build
//! arguments (caller order) and the content hashes of every input file.
//! Files are sorted by `(size, hash)` before they are fed to the
//! accumulator, so the digest never depends on directory traversal order.

use sha1::{Digest, Sha1};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::core::error::{BincError, Result};
use crate::core::util::sha1_hex_reader;

/// Number of hex digits shown when a fingerprint is printed for humans.
pub const SHORT_DIGITS: usize = 7;

/// Content hash and size of one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub path: PathBuf,
    /// Lowercase hex SHA-1 of the full contents.
    pub hash: String,
    pub size: u64,
}

impl FileDigest {
    /// Read and hash a file.
    ///
    /// Fails with `NotAFile` for directories and `NotFound` when the file is
    /// missing or vanishes while being read.
    pub fn compute(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).map_err(|e| BincError::io(path, e))?;
        if metadata.is_dir() {
            return Err(BincError::NotAFile {
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path).map_err(|e| BincError::io(path, e))?;
        let hash = sha1_hex_reader(file).map_err(|e| BincError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            hash,
            size: metadata.len(),
        })
    }

    /// `path:hash`, the compact form recorded in the sidecar.
    pub fn compact(&self) -> String {
        format!("{}:{}", self.path.display(), self.hash)
    }
}

/// Everything that identifies one build, plus its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFingerprint {
    version: String,
    args: Vec<String>,
    files: Vec<FileDigest>,
    digest: String,
}

impl BuildFingerprint {
    /// Hash the given files and derive the fingerprint.
    pub fn new<P: AsRef<Path>>(version: &str, args: &[String], files: &[P]) -> Result<Self> {
        let digests = files
            .iter()
            .map(|path| FileDigest::compute(path.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_digests(version, args, digests))
    }

    /// Derive the fingerprint from already computed file digests.
    pub fn from_digests(version: &str, args: &[String], mut files: Vec<FileDigest>) -> Self {
        files.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.hash.cmp(&b.hash)));

        let mut hasher = Sha1::new();
        hasher.update(version.as_bytes());
        for arg in args {
            hasher.update(arg.as_bytes());
        }
        for file in &files {
            hasher.update(file.hash.as_bytes());
        }

        Self {
            version: version.to_string(),
            args: args.to_vec(),
            files,
            digest: format!("{:x}", hasher.finalize()),
        }
    }

    /// Full hex digest. This is the cache key.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Abbreviated digest for log lines. Never used to locate an entry.
    pub fn short(&self) -> &str {
        &self.digest[..SHORT_DIGITS.min(self.digest.len())]
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Input files in fingerprint order.
    pub fn files(&self) -> &[FileDigest] {
        &self.files
    }
}
