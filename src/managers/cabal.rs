//! Cabal manager
//!
//! Haskell sources are built by cabal, which keeps its own build cache.
//! A file carrying a `{- cabal:` block is a cabal script and runs through
//! `cabal run`. Anything else must belong to a package (a `*.cabal` file at
//! or above it): the executable is built there and located with
//! `cabal list-bin`.

use std::ffi::OsString;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::cache::store::CacheStore;
use crate::core::error::{BincError, Result};
use crate::core::paths::{base_name, find_upwards};
use crate::managers::casing::command_for_identifier;
use crate::managers::toolchain::{exec_program, Toolchain};
use crate::managers::{
    command_name, files_in, strip_extension, CommandSource, DirListing, Manager, Registry,
};

pub const CABAL_MANAGER: &str = "Cabal Executable-likes Manager";

const PRIORITY: i32 = 50;
/// Longest first.
const HS_EXTS: &[&str] = &[".cabal.lhs", ".cabal.hs", ".lhs", ".hs"];
const SCRIPT_MARKER: &str = "{- cabal:";
/// How far into a file the script marker is looked for.
const MARKER_WINDOW: u64 = 1024;
const BUILD_NOISE: &[&str] = &["Up to date"];

pub fn register(registry: &mut Registry) {
    registry.register(CABAL_MANAGER, PRIORITY, |dir, toolchains| {
        let Some(cabal) = toolchains.cabal() else {
            return Ok(None);
        };
        CabalManager::for_dir(cabal.clone(), dir)
    });
}

pub struct CabalManager {
    cabal: Toolchain,
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

impl CabalManager {
    fn for_dir(cabal: Toolchain, dir: &Path) -> Result<Option<Box<dyn Manager>>> {
        let listing = DirListing::read(dir)?;
        let files = listing.files_with(HS_EXTS);
        let dirs = listing.dirs_containing(".hs")?;
        if files.is_empty() && dirs.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(Self { cabal, files, dirs })))
    }

    /// `HelloWorld.hs` is `hello-world`; a stem not in upper camel case is
    /// used as is.
    fn file_command(file: &Path) -> Option<String> {
        let name = base_name(file);
        let stem = strip_extension(&name, HS_EXTS)?;
        Some(command_for_identifier(stem).unwrap_or_else(|| stem.to_string()))
    }

    fn find_dir(&self, command: &str) -> Option<&PathBuf> {
        self.dirs.iter().find(|d| base_name(d) == command)
    }

    fn find_file(&self, command: &str) -> Option<&PathBuf> {
        self.files
            .iter()
            .find(|f| Self::file_command(f).as_deref() == Some(command))
    }

    /// `cabal build <command>` in the package dir, then `cabal list-bin`.
    fn build_executable(&self, package_dir: &Path, command: &str) -> Result<PathBuf> {
        let mut build = self.cabal.command();
        build.current_dir(package_dir).arg("build").arg(command);
        self.cabal.build(build, BUILD_NOISE)?;

        let mut list_bin = self.cabal.command();
        list_bin.current_dir(package_dir).arg("list-bin").arg(command);
        let exe = PathBuf::from(self.cabal.capture(list_bin, false)?.trim());
        debug!(exe = %exe.display(), "cabal executable");
        Ok(exe)
    }

    fn run_in_package(&self, start: &Path, command: &str, args: &[OsString]) -> Result<i32> {
        let package_dir = find_package_dir(start).ok_or_else(|| BincError::NotFound {
            path: start.join("*.cabal"),
        })?;
        let exe = self.build_executable(&package_dir, command)?;
        let mut cmd = Command::new(exe);
        cmd.args(args.iter().skip(1));
        exec_program(cmd)
    }
}

/// Directory of the nearest `*.cabal` file at or above `start`.
fn find_package_dir(start: &Path) -> Option<PathBuf> {
    find_upwards(start, |dir| {
        files_in(dir, ".cabal")
            .ok()
            .filter(|found| !found.is_empty())
            .map(|_| dir.to_path_buf())
    })
}

/// Whether the head of `file` opens a cabal script block.
fn is_cabal_script(file: &Path) -> Result<bool> {
    let mut head = Vec::new();
    File::open(file)
        .and_then(|f| f.take(MARKER_WINDOW).read_to_end(&mut head))
        .map_err(|e| BincError::io(file, e))?;
    Ok(String::from_utf8_lossy(&head).contains(SCRIPT_MARKER))
}

impl Manager for CabalManager {
    fn name(&self) -> &'static str {
        CABAL_MANAGER
    }

    fn enumerate_commands(&self) -> Vec<CommandSource> {
        let dirs = self
            .dirs
            .iter()
            .map(|dir| CommandSource::new(base_name(dir), dir.clone()));
        let files = self.files.iter().filter_map(|file| {
            Self::file_command(file).map(|name| CommandSource::new(name, file.clone()))
        });
        dirs.chain(files).collect()
    }

    fn can_run(&self, command: &str) -> bool {
        self.find_dir(command).is_some() || self.find_file(command).is_some()
    }

    fn run(&self, _cache: &CacheStore, args: &[OsString], _force_rebuild: bool) -> Result<i32> {
        let command = command_name(args);

        if let Some(dir) = self.find_dir(&command) {
            return self.run_in_package(dir, &command, args);
        }

        let file = self
            .find_file(&command)
            .ok_or_else(|| BincError::NoMatchingCommand {
                name: command.clone(),
            })?;
        if is_cabal_script(file)? {
            let mut cmd = self.cabal.command();
            cmd.arg("run").arg(file).args(args.iter().skip(1));
            return exec_program(cmd);
        }
        let parent = file.parent().map(Path::to_path_buf).unwrap_or_default();
        self.run_in_package(&parent, &command, args)
    }
}
