//! Cargo manager
//!
//! Rust sources are handed to cargo, which keeps its own build cache:
//! - inside a package (a `Cargo.toml` at or above the source), the command
//!   is run as a binary target of that package
//! - a lone `*.rs` file is run as a cargo script on the nightly toolchain

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::cache::store::CacheStore;
use crate::core::error::{BincError, Result};
use crate::core::paths::{base_name, find_upwards};
use crate::managers::toolchain::{exec_program, Toolchain};
use crate::managers::{command_name, strip_extension, CommandSource, DirListing, Manager, Registry};

pub const CARGO_MANAGER: &str = "Cargo Project Manager";

const PRIORITY: i32 = 50;
/// Longest first, so `x.cargo.rs` is the command `x`.
const RS_EXTS: &[&str] = &[".cargo.rs", ".rs"];
const MANIFEST: &str = "Cargo.toml";

pub fn register(registry: &mut Registry) {
    registry.register(CARGO_MANAGER, PRIORITY, |dir, toolchains| {
        let Some(cargo) = toolchains.cargo() else {
            return Ok(None);
        };
        CargoManager::for_dir(cargo.clone(), dir)
    });
}

pub struct CargoManager {
    cargo: Toolchain,
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

enum Target<'a> {
    Script(&'a Path),
    Crate(&'a Path),
}

impl CargoManager {
    fn for_dir(cargo: Toolchain, dir: &Path) -> Result<Option<Box<dyn Manager>>> {
        let listing = DirListing::read(dir)?;
        let files = listing.files_with(RS_EXTS);
        let dirs = listing.dirs_containing(".rs")?;
        if files.is_empty() && dirs.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(Self { cargo, files, dirs })))
    }

    fn find(&self, command: &str) -> Option<Target<'_>> {
        if let Some(dir) = self.dirs.iter().find(|d| base_name(d) == command) {
            return Some(Target::Crate(dir));
        }
        self.files
            .iter()
            .find(|f| strip_extension(&base_name(f), RS_EXTS) == Some(command))
            .map(|f| Target::Script(f))
    }
}

/// Directory of the nearest `Cargo.toml` at or above `start`.
fn find_package_dir(start: &Path) -> Option<PathBuf> {
    find_upwards(start, |dir| dir.join(MANIFEST).is_file().then(|| dir.to_path_buf()))
}

impl Manager for CargoManager {
    fn name(&self) -> &'static str {
        CARGO_MANAGER
    }

    fn enumerate_commands(&self) -> Vec<CommandSource> {
        let dirs = self
            .dirs
            .iter()
            .map(|dir| CommandSource::new(base_name(dir), dir.clone()));
        let files = self.files.iter().filter_map(|file| {
            strip_extension(&base_name(file), RS_EXTS)
                .map(|stem| CommandSource::new(stem, file.clone()))
        });
        dirs.chain(files).collect()
    }

    fn can_run(&self, command: &str) -> bool {
        self.find(command).is_some()
    }

    fn run(&self, _cache: &CacheStore, args: &[OsString], _force_rebuild: bool) -> Result<i32> {
        let command = command_name(args);
        let target = self
            .find(&command)
            .ok_or_else(|| BincError::NoMatchingCommand {
                name: command.clone(),
            })?;

        let (start, script) = match target {
            Target::Crate(dir) => (dir.to_path_buf(), None),
            Target::Script(file) => (
                file.parent().map(Path::to_path_buf).unwrap_or_default(),
                Some(file),
            ),
        };

        let mut cmd = self.cargo.command();
        match (find_package_dir(&start), script) {
            (Some(package_dir), _) => {
                cmd.args(["-Z", "unstable-options", "-C"])
                    .arg(package_dir)
                    .args(["run", "--quiet", "--bin", command.as_str(), "--"]);
            }
            (None, Some(file)) => {
                cmd.args(["+nightly", "-Zscript", "--quiet"]).arg(file);
            }
            (None, None) => {
                return Err(BincError::NotFound {
                    path: start.join(MANIFEST),
                });
            }
        }
        cmd.args(args.iter().skip(1));
        exec_program(cmd)
    }
}
