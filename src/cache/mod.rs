//! Cache module - Content-addressed build cache under `~/.binc/.cache/`
//!
//! Provides:
//! - Build fingerprints over toolchain version, build args and input files
//! - Cache entries with a `.info.json` sidecar
//! - Get-or-build with per-fingerprint locking
//! - Occasional eviction of stale entries

pub mod fingerprint;
pub mod janitor;
pub mod meta;
pub mod store;
