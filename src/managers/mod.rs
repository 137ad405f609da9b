//! Managers module - Per-language build-and-run strategies
//!
//! A manager is created per search directory by its factory, and only when
//! its toolchain is discoverable and the directory holds sources it
//! recognizes. Each manager can:
//! - enumerate the command names it can satisfy in its directory
//! - tell whether it owns a given command name
//! - build (through the cache store) and run the matching source

pub mod cabal;
pub mod cargo;
pub mod casing;
pub mod golang;
pub mod jvm;
pub mod toolchain;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::cache::store::CacheStore;
use crate::core::error::{BincError, Result};
use crate::core::paths::{base_name, is_ignored_name};
use toolchain::Toolchains;

/// A command name a manager can satisfy, and the source behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSource {
    pub name: String,
    pub source: PathBuf,
}

impl CommandSource {
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

pub trait Manager {
    /// Display name, e.g. "Go Main File Manager".
    fn name(&self) -> &'static str;

    /// Command names this manager can satisfy in its directory.
    fn enumerate_commands(&self) -> Vec<CommandSource>;

    /// Whether some owned source maps to `command`.
    fn can_run(&self, command: &str) -> bool {
        self.enumerate_commands().iter().any(|c| c.name == command)
    }

    /// Build `args[0]` (via `cache` where the manager caches) and run it
    /// with `args[1..]`. Returns the child's exit code.
    fn run(&self, cache: &CacheStore, args: &[OsString], force_rebuild: bool) -> Result<i32>;
}

/// Creates a manager for one directory; `Ok(None)` when the toolchain is
/// missing or there is nothing to manage there.
pub type ManagerFactory = Box<dyn Fn(&Path, &Toolchains) -> Result<Option<Box<dyn Manager>>>>;

pub struct ManagerDescriptor {
    pub name: &'static str,
    pub priority: i32,
    factory: ManagerFactory,
}

impl ManagerDescriptor {
    pub fn instantiate(&self, dir: &Path, toolchains: &Toolchains) -> Result<Option<Box<dyn Manager>>> {
        (self.factory)(dir, toolchains)
    }
}

impl std::fmt::Debug for ManagerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Ordered set of manager factories.
///
/// Built once at process entry and passed to the dispatcher. Iteration is by
/// descending priority; equal priorities keep registration order.
#[derive(Debug, Default)]
pub struct Registry {
    descriptors: Vec<ManagerDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in language manager.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        golang::register(&mut registry);
        jvm::register(&mut registry);
        cargo::register(&mut registry);
        cabal::register(&mut registry);
        registry
    }

    pub fn register<F>(&mut self, name: &'static str, priority: i32, factory: F)
    where
        F: Fn(&Path, &Toolchains) -> Result<Option<Box<dyn Manager>>> + 'static,
    {
        self.descriptors.push(ManagerDescriptor {
            name,
            priority,
            factory: Box::new(factory),
        });
        // stable: ties stay in registration order
        self.descriptors.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Descriptors in dispatch order.
    pub fn descriptors(&self) -> &[ManagerDescriptor] {
        &self.descriptors
    }

    /// Instantiate every manager that applies to `dir`, in dispatch order.
    pub fn managers_for(&self, dir: &Path, toolchains: &Toolchains) -> Result<Vec<Box<dyn Manager>>> {
        let mut managers = Vec::new();
        for descriptor in &self.descriptors {
            if let Some(manager) = descriptor.instantiate(dir, toolchains)? {
                managers.push(manager);
            }
        }
        Ok(managers)
    }
}

/// Base name of `args[0]`, the command being dispatched.
pub fn command_name(args: &[OsString]) -> String {
    args.first()
        .map(|arg0| base_name(Path::new(arg0)))
        .unwrap_or_default()
}

/// Immediate children of a search directory, split into files and
/// subdirectories, sorted by name. Hidden and `_`-prefixed names are skipped.
#[derive(Debug, Default)]
pub struct DirListing {
    pub files: Vec<PathBuf>,
    pub dirs: Vec<PathBuf>,
}

impl DirListing {
    pub fn read(dir: &Path) -> Result<Self> {
        let mut listing = Self::default();
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name();
        for entry in walker {
            let Some(entry) = child_entry(dir, entry)? else {
                continue;
            };
            let path = entry.path();
            if is_ignored_name(path) {
                continue;
            }
            if entry.file_type().is_dir() {
                listing.dirs.push(path.to_path_buf());
            } else if entry.file_type().is_file() {
                listing.files.push(path.to_path_buf());
            }
        }
        Ok(listing)
    }

    /// Files whose name ends with one of `extensions`.
    pub fn files_with(&self, extensions: &[&str]) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter(|path| strip_extension(&base_name(path), extensions).is_some())
            .cloned()
            .collect()
    }

    /// Subdirectories holding at least one file ending with `extension`.
    pub fn dirs_containing(&self, extension: &str) -> Result<Vec<PathBuf>> {
        let mut matched = Vec::new();
        for dir in &self.dirs {
            if !files_in(dir, extension)?.is_empty() {
                matched.push(dir.clone());
            }
        }
        Ok(matched)
    }
}

/// Regular files directly inside `dir` ending with `extension`, sorted.
pub fn files_in(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();
    for entry in walker {
        let Some(entry) = child_entry(dir, entry)? else {
            continue;
        };
        if entry.file_type().is_file() && base_name(entry.path()).ends_with(extension) {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}

/// An unreadable child (a dangling symlink, a link loop) is skipped; only a
/// failure to read `dir` itself is an error.
fn child_entry(dir: &Path, entry: walkdir::Result<DirEntry>) -> Result<Option<DirEntry>> {
    match entry {
        Ok(entry) => Ok(Some(entry)),
        Err(err) if err.depth() == 0 => Err(walk_error(dir, err)),
        Err(err) => {
            debug!(path = ?err.path(), "skipping unreadable entry: {}", err);
            Ok(None)
        }
    }
}

fn walk_error(dir: &Path, err: walkdir::Error) -> BincError {
    let path = err.path().unwrap_or(dir).to_path_buf();
    match err.into_io_error() {
        Some(io) => BincError::io(path, io),
        None => BincError::NotFound { path },
    }
}

/// Strip the first matching extension from a file name.
pub fn strip_extension<'a>(file_name: &'a str, extensions: &[&str]) -> Option<&'a str> {
    extensions
        .iter()
        .find_map(|ext| file_name.strip_suffix(ext))
        .filter(|stem| !stem.is_empty())
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory managers for registry and dispatcher tests.

    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every `run` call; returns a fixed exit code or error.
    pub struct FakeManager {
        pub label: &'static str,
        pub commands: Vec<CommandSource>,
        pub outcome: fn() -> Result<i32>,
        pub runs: Rc<RefCell<Vec<String>>>,
    }

    impl Manager for FakeManager {
        fn name(&self) -> &'static str {
            self.label
        }

        fn enumerate_commands(&self) -> Vec<CommandSource> {
            self.commands.clone()
        }

        fn run(&self, _cache: &CacheStore, args: &[OsString], _force: bool) -> Result<i32> {
            self.runs
                .borrow_mut()
                .push(format!("{}:{}", self.label, command_name(args)));
            (self.outcome)()
        }
    }
}
