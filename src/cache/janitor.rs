//! Cache janitor - occasional eviction of stale cache entries
//!
//! A sweep is rolled once per catalog rebuild and fires with probability
//! `1 / cycle_length`. Entries whose sidecar is older than the retention
//! threshold are removed. Entries without a sidecar are left over from an
//! interrupted build and are purged regardless of age. Lock files of
//! removed entries, and of fingerprints that never produced an entry, are
//! unlinked as well.

use rand::Rng;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

use crate::cache::meta::INFO_FILE;
use crate::cache::store::CacheStore;
use crate::core::error::{BincError, Result};
use crate::core::paths::base_name;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Janitor {
    cycle_length: u32,
    retention: Duration,
}

/// What a sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    /// Fingerprints removed for age.
    pub evicted: Vec<String>,
    /// Fingerprints removed because their sidecar was missing.
    pub purged_incomplete: Vec<String>,
    /// Entries skipped because a build held their lock.
    pub skipped_locked: usize,
    /// Lock files removed without a matching entry.
    pub removed_locks: usize,
}

impl Janitor {
    pub fn new(cycle_length: u32, retention_days: u64) -> Self {
        Self {
            cycle_length: cycle_length.max(1),
            retention: Duration::from_secs(retention_days.saturating_mul(SECS_PER_DAY)),
        }
    }

    /// Roll the probability gate.
    pub fn should_sweep<R: Rng>(&self, rng: &mut R) -> bool {
        rng.gen_range(0..self.cycle_length) == 0
    }

    /// Sweep if the gate fires. Returns `None` when it does not.
    pub fn maybe_sweep(&self, store: &CacheStore) -> Result<Option<SweepReport>> {
        if !self.should_sweep(&mut rand::thread_rng()) {
            return Ok(None);
        }
        self.sweep(store, SystemTime::now()).map(Some)
    }

    /// Sweep unconditionally, judging age relative to `now`.
    pub fn sweep(&self, store: &CacheStore, now: SystemTime) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let cutoff = now.checked_sub(self.retention).unwrap_or(SystemTime::UNIX_EPOCH);

        for entry in store.entries()? {
            report.scanned += 1;
            let digest = base_name(&entry);

            let Some(_lock) = store.try_lock(&digest)? else {
                debug!(entry = %digest, "skipping entry locked by a running build");
                report.skipped_locked += 1;
                continue;
            };

            let info_path = entry.join(INFO_FILE);
            match fs::metadata(&info_path) {
                Ok(meta) if meta.is_file() => {
                    let modified = meta.modified().map_err(|e| BincError::io(&info_path, e))?;
                    if modified >= cutoff {
                        continue;
                    }
                    remove_entry(&entry)?;
                    store.remove_lock_file(&digest)?;
                    info!(entry = %digest, "evicted stale cache entry");
                    report.evicted.push(digest);
                }
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    remove_entry(&entry)?;
                    store.remove_lock_file(&digest)?;
                    info!(entry = %digest, "purged incomplete cache entry");
                    report.purged_incomplete.push(digest);
                }
                Err(e) => return Err(BincError::io(&info_path, e)),
            }
        }

        // locks left by builds that failed before publishing an entry
        for digest in store.locked_digests()? {
            if store.entry_dir(&digest).exists() {
                continue;
            }
            let Some(_lock) = store.try_lock(&digest)? else {
                continue;
            };
            if !store.entry_dir(&digest).exists() {
                store.remove_lock_file(&digest)?;
                report.removed_locks += 1;
            }
        }

        Ok(report)
    }
}

fn remove_entry(entry: &Path) -> Result<()> {
    fs::remove_dir_all(entry).map_err(|e| BincError::io(entry, e))
}
