//! Go managers
//!
//! Two flavours share one build path:
//! - main files: `dir/say_hello.go` is the command `say_hello`
//! - main packages: `dir/tool/*.go` is the command `tool`
//!
//! Both are compiled with `go build -o` into the cache store, keyed on the
//! Go version, the build flags, the sources and the nearest `go.mod`.

use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::cache::fingerprint::BuildFingerprint;
use crate::cache::store::CacheStore;
use crate::core::error::{BincError, Result};
use crate::core::paths::{base_name, find_upwards};
use crate::managers::toolchain::{exec_program, Toolchain};
use crate::managers::{
    command_name, files_in, strip_extension, CommandSource, DirListing, Manager, Registry,
};

pub const FILE_MANAGER: &str = "Go Main File Manager";
pub const PACKAGE_MANAGER: &str = "Go Main Package Manager";

const PRIORITY: i32 = 100;
const GO_EXT: &str = ".go";
const BUILD_ARGS: &[&str] = &["-trimpath"];

pub fn register(registry: &mut Registry) {
    registry.register(FILE_MANAGER, PRIORITY, |dir, toolchains| {
        let Some(go) = toolchains.go() else {
            return Ok(None);
        };
        let files = DirListing::read(dir)?.files_with(&[GO_EXT]);
        if files.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(GoFileManager {
            go: go.clone(),
            files,
        }) as Box<dyn Manager>))
    });

    registry.register(PACKAGE_MANAGER, PRIORITY, |dir, toolchains| {
        let Some(go) = toolchains.go() else {
            return Ok(None);
        };
        let packages = DirListing::read(dir)?.dirs_containing(GO_EXT)?;
        if packages.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(GoPackageManager {
            go: go.clone(),
            packages,
        }) as Box<dyn Manager>))
    });
}

pub struct GoFileManager {
    go: Toolchain,
    files: Vec<PathBuf>,
}

impl Manager for GoFileManager {
    fn name(&self) -> &'static str {
        FILE_MANAGER
    }

    fn enumerate_commands(&self) -> Vec<CommandSource> {
        self.files
            .iter()
            .filter_map(|path| {
                let file_name = base_name(path);
                strip_extension(&file_name, &[GO_EXT])
                    .map(|stem| CommandSource::new(stem, path.clone()))
            })
            .collect()
    }

    fn can_run(&self, command: &str) -> bool {
        self.find(command).is_some()
    }

    fn run(&self, cache: &CacheStore, args: &[OsString], force_rebuild: bool) -> Result<i32> {
        let command = command_name(args);
        let file = self
            .find(&command)
            .ok_or_else(|| BincError::NoMatchingCommand {
                name: command.clone(),
            })?;
        let exe = build(&self.go, cache, &GoTarget::File(file.clone()), force_rebuild)?;
        run_artifact(&exe, args)
    }
}

impl GoFileManager {
    fn find(&self, command: &str) -> Option<&PathBuf> {
        let wanted = format!("{}{}", command, GO_EXT);
        self.files.iter().find(|path| base_name(path) == wanted)
    }
}

pub struct GoPackageManager {
    go: Toolchain,
    packages: Vec<PathBuf>,
}

impl Manager for GoPackageManager {
    fn name(&self) -> &'static str {
        PACKAGE_MANAGER
    }

    fn enumerate_commands(&self) -> Vec<CommandSource> {
        self.packages
            .iter()
            .map(|dir| CommandSource::new(base_name(dir), dir.clone()))
            .collect()
    }

    fn can_run(&self, command: &str) -> bool {
        self.find(command).is_some()
    }

    fn run(&self, cache: &CacheStore, args: &[OsString], force_rebuild: bool) -> Result<i32> {
        let command = command_name(args);
        let dir = self
            .find(&command)
            .ok_or_else(|| BincError::NoMatchingCommand {
                name: command.clone(),
            })?;
        let exe = build(&self.go, cache, &GoTarget::Package(dir.clone()), force_rebuild)?;
        run_artifact(&exe, args)
    }
}

impl GoPackageManager {
    fn find(&self, command: &str) -> Option<&PathBuf> {
        self.packages.iter().find(|dir| base_name(dir) == command)
    }
}

enum GoTarget {
    File(PathBuf),
    Package(PathBuf),
}

impl GoTarget {
    fn path(&self) -> &Path {
        match self {
            GoTarget::File(path) | GoTarget::Package(path) => path,
        }
    }

    /// Base name without `.go`; also the artifact name.
    fn command(&self) -> String {
        let name = base_name(self.path());
        match self {
            GoTarget::File(_) => strip_extension(&name, &[GO_EXT])
                .map(str::to_string)
                .unwrap_or(name),
            GoTarget::Package(_) => name,
        }
    }

    fn sources(&self) -> Result<Vec<PathBuf>> {
        match self {
            GoTarget::File(path) => Ok(vec![path.clone()]),
            GoTarget::Package(dir) => files_in(dir, GO_EXT),
        }
    }
}

#[derive(Deserialize)]
struct GoEnv {
    #[serde(rename = "GOVERSION")]
    version: String,
}

/// Version reported by `go env -json`.
fn go_version(go: &Toolchain) -> Result<String> {
    let output = go.query(["env", "-json"], false)?;
    let env: GoEnv = serde_json::from_str(&output).map_err(|e| BincError::ToolchainOutput {
        toolchain: go.name.to_string(),
        message: e.to_string(),
    })?;
    Ok(env.version)
}

/// Nearest `go.mod` at or above `dir`.
fn find_go_mod(dir: &Path) -> Option<PathBuf> {
    find_upwards(dir, |candidate_dir| {
        let candidate = candidate_dir.join("go.mod");
        candidate.is_file().then_some(candidate)
    })
}

fn build(go: &Toolchain, cache: &CacheStore, target: &GoTarget, force_rebuild: bool) -> Result<PathBuf> {
    let work_dir = target
        .path()
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut inputs = target.sources()?;
    if let Some(go_mod) = find_go_mod(&work_dir) {
        inputs.push(go_mod);
    }

    let build_args: Vec<String> = BUILD_ARGS.iter().map(|s| s.to_string()).collect();
    let fingerprint = BuildFingerprint::new(&go_version(go)?, &build_args, &inputs)?;
    let artifact_name = target.command();

    cache.get_or_build(&fingerprint, &artifact_name, force_rebuild, |staging| {
        let mut cmd = go.command();
        cmd.current_dir(&work_dir)
            .arg("build")
            .arg("-o")
            .arg(staging.join(&artifact_name))
            .args(&build_args)
            // `./name` so go treats it as a path, not an import path
            .arg(format!("./{}", base_name(target.path())));
        go.build(cmd, &[])
    })
}

fn run_artifact(exe: &Path, args: &[OsString]) -> Result<i32> {
    let mut cmd = Command::new(exe);
    cmd.args(args.iter().skip(1));
    exec_program(cmd)
}
