//! External toolchain invocation
//!
//! Thin wrappers over `std::process::Command` for the three things managers
//! do with a compiler: ask it a question, run a build, and execute the
//! resulting program with the terminal handed over.

use once_cell::sync::OnceCell;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, warn};

use crate::core::error::{BincError, Result};
use crate::core::util::{exit_code_of, find_command};

/// A discovered external program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub name: &'static str,
    pub program: PathBuf,
}

impl Toolchain {
    pub fn new(name: &'static str, program: impl Into<PathBuf>) -> Self {
        Self {
            name,
            program: program.into(),
        }
    }

    /// Look the program up on `PATH`.
    pub fn on_path(name: &'static str) -> Option<Self> {
        find_command(name).map(|program| Self::new(name, program))
    }

    /// Use `path` if it is an existing regular file.
    pub fn at(name: &'static str, path: PathBuf) -> Option<Self> {
        path.is_file().then(|| Self::new(name, path))
    }

    pub fn command(&self) -> Command {
        Command::new(&self.program)
    }

    /// Run a query (e.g. `go env -json`) and return its stdout.
    ///
    /// Stderr is captured too and appended when `merge_stderr` is set, for
    /// tools such as old `javac` that print their version there.
    pub fn query<I, S>(&self, args: I, merge_stderr: bool) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command();
        cmd.args(args);
        self.capture(cmd, merge_stderr)
    }

    /// Copy a failed query's diagnostics to `out`. A failed copy is
    /// logged; the query's own status is what gets reported.
    fn relay<W: Write>(&self, out: &mut W, bytes: &[u8]) -> bool {
        match out.write_all(bytes).and_then(|()| out.flush()) {
            Ok(()) => true,
            Err(e) => {
                warn!(program = self.name, "stderr relay failed: {}", e);
                false
            }
        }
    }

    /// Like [`Toolchain::query`], for a command the caller prepared
    /// (working directory, environment).
    pub fn capture(&self, mut cmd: Command, merge_stderr: bool) -> Result<String> {
        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            self.relay(&mut std::io::stderr(), &output.stderr);
            return Err(BincError::BuildFailed {
                program: self.name.to_string(),
                code: Some(exit_code_of(output.status)),
            });
        }
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if merge_stderr {
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        Ok(text)
    }

    /// A program that vanished after discovery is unavailable, not missing input.
    fn spawn_error(&self, err: std::io::Error) -> BincError {
        if err.kind() == std::io::ErrorKind::NotFound {
            BincError::ToolchainUnavailable {
                toolchain: self.name.to_string(),
            }
        } else {
            BincError::io(&self.program, err)
        }
    }

    /// Run a build step. Its stdout is relayed line by line to our stderr,
    /// dropping lines that contain any of `noise`, so the dispatched
    /// program's stdout stays clean. Stderr is inherited.
    pub fn build(&self, mut cmd: Command, noise: &[&str]) -> Result<()> {
        debug!(program = %self.program.display(), "running build");
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let drain = child.stdout.take().map(|stdout| {
            let noise: Vec<String> = noise.iter().map(|s| s.to_string()).collect();
            thread::spawn(move || -> std::io::Result<()> {
                let mut stderr = std::io::stderr();
                for line in BufReader::new(stdout).lines() {
                    let line = line?;
                    if noise.iter().any(|n| line.contains(n.as_str())) {
                        continue;
                    }
                    writeln!(stderr, "{}", line)?;
                }
                Ok(())
            })
        });

        let status = child.wait().map_err(|e| BincError::io(&self.program, e))?;

        // The drain must finish before the build counts as done, but its
        // failure never replaces the compiler's own status.
        if let Some(handle) = drain {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(program = self.name, "build output relay failed: {}", e),
                Err(_) => warn!(program = self.name, "build output relay panicked"),
            }
        }

        if status.success() {
            Ok(())
        } else {
            Err(BincError::BuildFailed {
                program: self.name.to_string(),
                code: Some(exit_code_of(status)),
            })
        }
    }
}

/// Run a program with stdio connected 1:1 to ours and return its exit code.
pub fn exec_program(mut cmd: Command) -> Result<i32> {
    let program = PathBuf::from(cmd.get_program());
    let status = cmd
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| BincError::io(&program, e))?;
    Ok(exit_code_of(status))
}

/// Toolchains discovered lazily, at most once per process.
///
/// Built once at process entry and shared by every manager factory.
#[derive(Debug, Default)]
pub struct Toolchains {
    go: OnceCell<Option<Toolchain>>,
    javac: OnceCell<Option<Toolchain>>,
    java: OnceCell<Option<Toolchain>>,
    scalac: OnceCell<Option<Toolchain>>,
    cargo: OnceCell<Option<Toolchain>>,
    cabal: OnceCell<Option<Toolchain>>,
    go_root: Option<PathBuf>,
    scala_home: Option<PathBuf>,
}

impl Toolchains {
    /// Discovery rooted in the current environment (`GOROOT`, `SCALA_HOME`, `PATH`).
    pub fn from_env() -> Self {
        Self::with_roots(
            std::env::var_os("GOROOT").filter(|v| !v.is_empty()).map(PathBuf::from),
            std::env::var_os("SCALA_HOME").filter(|v| !v.is_empty()).map(PathBuf::from),
        )
    }

    pub fn with_roots(go_root: Option<PathBuf>, scala_home: Option<PathBuf>) -> Self {
        Self {
            go_root,
            scala_home,
            ..Default::default()
        }
    }

    /// `$GOROOT/bin/go`, else `go` on `PATH`.
    pub fn go(&self) -> Option<&Toolchain> {
        self.go
            .get_or_init(|| {
                self.go_root
                    .as_deref()
                    .and_then(|root| Toolchain::at("go", root.join("bin").join("go")))
                    .or_else(|| Toolchain::on_path("go"))
            })
            .as_ref()
    }

    pub fn javac(&self) -> Option<&Toolchain> {
        self.javac.get_or_init(|| Toolchain::on_path("javac")).as_ref()
    }

    pub fn java(&self) -> Option<&Toolchain> {
        self.java.get_or_init(|| Toolchain::on_path("java")).as_ref()
    }

    /// `$SCALA_HOME/bin/scalac`; Scala is unavailable without `SCALA_HOME`.
    pub fn scalac(&self) -> Option<&Toolchain> {
        self.scalac
            .get_or_init(|| {
                self.scala_home
                    .as_deref()
                    .and_then(|home| Toolchain::at("scalac", home.join("bin").join("scalac")))
            })
            .as_ref()
    }

    pub fn scala_home(&self) -> Option<&Path> {
        self.scala_home.as_deref()
    }

    pub fn cargo(&self) -> Option<&Toolchain> {
        self.cargo.get_or_init(|| Toolchain::on_path("cargo")).as_ref()
    }

    pub fn cabal(&self) -> Option<&Toolchain> {
        self.cabal.get_or_init(|| Toolchain::on_path("cabal")).as_ref()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_query_returns_stdout() {
        let temp = tempdir().unwrap();
        let tool = Toolchain::new("fake", script(temp.path(), "fake", "echo \"v$1\"; echo err >&2"));
        assert_eq!(tool.query(["1.2"], false).unwrap(), "v1.2\n");
        assert_eq!(tool.query(["1.2"], true).unwrap(), "v1.2\nerr\n");
    }

    #[test]
    fn test_build_failure_carries_exit_code() {
        let temp = tempdir().unwrap();
        let tool = Toolchain::new("fake", script(temp.path(), "fake", "echo compiling; exit 3"));
        let err = tool.build(tool.command(), &[]).unwrap_err();
        assert!(matches!(err, BincError::BuildFailed { code: Some(3), .. }));
    }

    #[test]
    fn test_build_success_with_noise_filter() {
        let temp = tempdir().unwrap();
        let marker = temp.path().join("ran");
        let tool = Toolchain::new(
            "fake",
            script(
                temp.path(),
                "fake",
                &format!("echo 'Up to date'; echo built; touch '{}'", marker.display()),
            ),
        );
        tool.build(tool.command(), &["Up to date"]).unwrap();
        assert!(marker.exists());
    }

    #[test]
    fn test_failed_query_keeps_status_when_relay_fails() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let temp = tempdir().unwrap();
        let tool = Toolchain::new("fake", script(temp.path(), "fake", "echo bad >&2; exit 4"));
        assert!(!tool.relay(&mut Closed, b"bad\n"));

        let mut copied = Vec::new();
        assert!(tool.relay(&mut copied, b"bad\n"));
        assert_eq!(copied, b"bad\n");

        assert!(matches!(
            tool.query(["x"], false),
            Err(BincError::BuildFailed { code: Some(4), .. })
        ));
    }

    #[test]
    fn test_vanished_program_is_unavailable() {
        let temp = tempdir().unwrap();
        let tool = Toolchain::new("gone", temp.path().join("gone"));
        assert!(matches!(
            tool.query(["-version"], false),
            Err(BincError::ToolchainUnavailable { .. })
        ));
    }

    #[test]
    fn test_exec_program_returns_child_code() {
        let temp = tempdir().unwrap();
        let program = script(temp.path(), "prog", "exit \"$1\"");
        let mut cmd = Command::new(&program);
        cmd.arg("5");
        assert_eq!(exec_program(cmd).unwrap(), 5);
    }

    #[test]
    fn test_go_root_takes_precedence() {
        let temp = tempdir().unwrap();
        let bin = temp.path().join("bin");
        fs::create_dir_all(&bin).unwrap();
        let go = script(&bin, "go", "exit 0");

        let toolchains = Toolchains::with_roots(Some(temp.path().to_path_buf()), None);
        assert_eq!(toolchains.go().map(|t| t.program.clone()), Some(go));
        assert!(toolchains.scalac().is_none());
    }
}
