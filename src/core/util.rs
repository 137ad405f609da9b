//! Common utilities

use sha1::{Digest, Sha1};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitStatus;

/// Compute the SHA-1 of everything readable from `reader`, as lowercase hex.
pub fn sha1_hex_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha1::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Locate an executable on `PATH`.
pub fn find_command(cmd: &str) -> Option<PathBuf> {
    which::which(cmd).ok()
}

/// Translate a child's exit status into the code this process should exit
/// with. Signal deaths follow the shell convention of `128 + signal`.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
