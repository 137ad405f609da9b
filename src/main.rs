//! binc - run source files as commands
//!
//! binc provides:
//! - A content-addressed build cache keyed on toolchain, flags and sources
//! - Language managers for Go, Java, Scala, Rust and Haskell sources
//! - A dispatcher reached through per-command symlinks in `~/.binc`
//! - An occasional janitor sweep of stale cache entries

mod cache;
mod cli;
mod core;
mod dispatch;
mod managers;

use crate::core::error::BincError;

fn main() {
    // Check for unsupported platforms
    #[cfg(windows)]
    {
        eprintln!("Error: Windows is not supported. Please use WSL (not guaranteed to work).");
        std::process::exit(1);
    }

    let code = match cli::main(std::env::args_os().collect()) {
        Ok(code) => code,
        Err(err) => match err.downcast_ref::<BincError>().and_then(BincError::exit_code) {
            // the toolchain has already reported the failure
            Some(code) => code,
            None => {
                eprintln!("Error: {:#}", err);
                1
            }
        },
    };
    std::process::exit(code);
}
