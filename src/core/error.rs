//! Error types shared by the cache, managers and dispatcher.

use std::path::{Path, PathBuf};

/// Result alias used below the CLI layer.
pub type Result<T> = std::result::Result<T, BincError>;

/// Errors raised while fingerprinting, building or dispatching a command.
///
/// Child-process failures are kept apart from tool-internal ones: a failed
/// compiler run carries its exit code so the entry point can forward it
/// instead of printing a message.
#[derive(Debug, thiserror::Error)]
pub enum BincError {
    /// A source, toolchain or cache file is missing.
    #[error("not found: {path}")]
    NotFound { path: PathBuf },

    /// A directory was given where a regular file was expected.
    #[error("not a file: {path}")]
    NotAFile { path: PathBuf },

    /// The external compiler/interpreter could not be discovered.
    #[error("toolchain unavailable: {toolchain}")]
    ToolchainUnavailable { toolchain: String },

    /// A toolchain query produced output we could not interpret.
    #[error("unexpected output from {toolchain}: {message}")]
    ToolchainOutput { toolchain: String, message: String },

    /// The external toolchain exited unsuccessfully.
    #[error("build failed: {program} exited with {}", display_code(*code))]
    BuildFailed { program: String, code: Option<i32> },

    /// No manager in any search directory claims the command name.
    #[error("no matching command found: {name}")]
    NoMatchingCommand { name: String },

    /// Two sources resolve to the same command name. Reported, never fatal.
    #[error(
        "conflicting source for `{name}`: {} (kept: {})",
        discarded.display(),
        kept.display()
    )]
    ConflictingBinding {
        name: String,
        kept: PathBuf,
        discarded: PathBuf,
    },

    /// `install` was pointed at something that cannot be executed.
    #[error("not an executable binary: {path}")]
    NotExecutable { path: PathBuf },

    /// The metadata sidecar could not be written or parsed.
    #[error("invalid build sidecar at {path}: {source}")]
    Sidecar {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Any other filesystem failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn display_code(code: Option<i32>) -> String {
    code.map(|c| format!("status {}", c))
        .unwrap_or_else(|| "no status".to_string())
}

impl BincError {
    /// Wraps an I/O error, mapping `ErrorKind::NotFound` onto [`BincError::NotFound`].
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        if source.kind() == std::io::ErrorKind::NotFound {
            BincError::NotFound { path }
        } else {
            BincError::Io { path, source }
        }
    }

    /// The exit code the process should terminate with, if this error
    /// stands for a failed child process.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            BincError::BuildFailed { code, .. } => Some(code.unwrap_or(1)),
            _ => None,
        }
    }
}
