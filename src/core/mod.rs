//! Core module - Shared building blocks
//!
//! This module provides:
//! - Error types and the crate-wide `Result` alias
//! - Environment-derived configuration
//! - On-disk layout of the alias directory and cache
//! - Common utilities (hashing, exit codes, command lookup)

pub mod config;
pub mod error;
pub mod paths;
pub mod util;
