//! Cache entry metadata (`.info.json`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::cache::fingerprint::BuildFingerprint;
use crate::core::error::{BincError, Result};

/// Sidecar file name inside every cache entry directory.
pub const INFO_FILE: &str = ".info.json";

/// Metadata written next to a built artifact.
///
/// Its presence marks the build as complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Toolchain version string
    pub version: String,

    /// Build arguments in the order they were fingerprinted
    #[serde(alias = "build_args", default)]
    pub args: Vec<String>,

    /// `path:hash` for each input file, in fingerprint order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,

    /// Full fingerprint digest
    pub hash: String,

    /// When the build finished
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl BuildInfo {
    pub fn new(fingerprint: &BuildFingerprint) -> Self {
        Self {
            version: fingerprint.version().to_string(),
            args: fingerprint.args().to_vec(),
            files: fingerprint.files().iter().map(|f| f.compact()).collect(),
            hash: fingerprint.digest().to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Write the sidecar into `entry_dir` through a temp file and rename, so a
/// reader never sees a truncated sidecar.
pub fn write_info(entry_dir: &Path, info: &BuildInfo) -> Result<()> {
    let path = entry_dir.join(INFO_FILE);
    let json = serde_json::to_string_pretty(info).map_err(|e| BincError::Sidecar {
        path: path.clone(),
        source: e,
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(entry_dir).map_err(|e| BincError::io(entry_dir, e))?;
    tmp.write_all(json.as_bytes())
        .map_err(|e| BincError::io(tmp.path(), e))?;
    tmp.persist(&path).map_err(|e| BincError::io(&path, e.error))?;
    Ok(())
}

/// Read the sidecar of an entry.
pub fn read_info(entry_dir: &Path) -> Result<BuildInfo> {
    let path = entry_dir.join(INFO_FILE);
    let content = fs::read_to_string(&path).map_err(|e| BincError::io(&path, e))?;
    serde_json::from_str(&content).map_err(|e| BincError::Sidecar { path, source: e })
}
