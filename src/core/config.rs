//! Process configuration assembled once from the environment.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

use crate::core::error::{BincError, Result};
use crate::core::paths::BincPaths;

/// Colon-separated list of directories scanned for runnable sources.
pub const ENV_BINCPATH: &str = "BINCPATH";
/// Overrides the home directory the alias/cache tree lives under.
pub const ENV_HOME: &str = "BINC_HOME";
/// Days an unused cache entry survives before the janitor removes it.
pub const ENV_RETENTION_DAYS: &str = "BINC_CACHE_RETENTION_DAYS";
/// Average number of catalog rebuilds between janitor sweeps.
pub const ENV_CLEANUP_CYCLE: &str = "BINC_CLEANUP_CYCLE";
/// Any non-empty value of these forces a rebuild.
pub const ENV_FORCE_REBUILD: [&str; 2] = ["BUILD", "REBUILD"];

pub const DEFAULT_RETENTION_DAYS: u64 = 90;
pub const DEFAULT_CLEANUP_CYCLE: u32 = 100;

#[derive(Debug, Clone)]
pub struct Config {
    pub paths: BincPaths,
    /// Entries of `BINCPATH` in order. Existence is checked at use time.
    pub search_path: Vec<PathBuf>,
    pub force_rebuild: bool,
    pub retention_days: u64,
    pub cleanup_cycle: u32,
}

impl Config {
    /// Build the configuration from the real process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var_os(key), dirs::home_dir)
    }

    /// Build the configuration from an arbitrary variable lookup. Values
    /// need not be UTF-8; only the numeric tunables are parsed as text.
    pub fn from_lookup<F, H>(lookup: F, home_dir: H) -> Result<Self>
    where
        F: Fn(&str) -> Option<OsString>,
        H: FnOnce() -> Option<PathBuf>,
    {
        let home = match non_empty(lookup(ENV_HOME)) {
            Some(home) => PathBuf::from(home),
            None => home_dir().ok_or_else(|| BincError::NotFound {
                path: PathBuf::from("$HOME"),
            })?,
        };

        let search_path = lookup(ENV_BINCPATH)
            .map(|value| split_search_path(&value))
            .unwrap_or_default();

        let force_rebuild = ENV_FORCE_REBUILD
            .iter()
            .any(|key| non_empty(lookup(key)).is_some());

        let retention_days = parse_number(lookup(ENV_RETENTION_DAYS))
            .unwrap_or(DEFAULT_RETENTION_DAYS);

        let cleanup_cycle = parse_number(lookup(ENV_CLEANUP_CYCLE))
            .filter(|cycle: &u32| *cycle > 0)
            .unwrap_or(DEFAULT_CLEANUP_CYCLE);

        Ok(Self {
            paths: BincPaths::new(home),
            search_path,
            force_rebuild,
            retention_days,
            cleanup_cycle,
        })
    }

    /// Search directories that currently exist, in `BINCPATH` order.
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        self.search_path
            .iter()
            .filter(|dir| dir.is_dir())
            .cloned()
            .collect()
    }
}

fn non_empty(value: Option<OsString>) -> Option<OsString> {
    value.filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(value: Option<OsString>) -> Option<T> {
    non_empty(value)?.to_str()?.trim().parse().ok()
}

fn split_search_path(value: &OsStr) -> Vec<PathBuf> {
    std::env::split_paths(value)
        .filter(|segment| !segment.as_os_str().is_empty())
        .collect()
}
