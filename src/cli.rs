//! CLI module - Command-line interface definitions and handlers
//!
//! The binary is entered two ways:
//! - as `binc` (or the installed `.binc`), with the subcommands below
//! - through an alias symlink, whose name is the command to dispatch

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::core::config::Config;
use crate::core::paths::{base_name, DISPATCHER_BASE};
use crate::dispatch::{doctor, install, Dispatcher};
use crate::managers::toolchain::Toolchains;
use crate::managers::Registry;

const APP_NAME: &str = "binc";

/// Environment variable holding a tracing filter (e.g. `binc=debug`).
pub const ENV_LOG: &str = "BINC_LOG";

/// binc - run source files as commands, compiled on first use and cached.
#[derive(Parser, Debug)]
#[command(name = "binc")]
#[command(
    author,
    version,
    about,
    long_about = r#"binc turns source files into commands.

Every directory listed in BINCPATH is scanned for sources a language manager
recognizes (Go, Java, Scala, Rust, Haskell). Each one becomes a symlink in
~/.binc pointing at the installed dispatcher; running the symlink builds the
source on first use, caches the executable by a fingerprint of its inputs, and
runs it.

Without a subcommand, the alias links are rebuilt.

Environment:
    BINCPATH                    colon-separated source directories
    BUILD / REBUILD             any non-empty value forces a rebuild
    BINC_HOME                   home directory holding .binc (default: $HOME)
    BINC_CACHE_RETENTION_DAYS   days before an unused build is evicted (90)
    BINC_CLEANUP_CYCLE          rebuilds between cache sweeps, on average (100)
    BINC_LOG                    log filter, e.g. debug

Examples:
    binc install
    binc exec say_hello --name world
    binc which say_hello
"#
)]
pub struct Cli {
    /// Verbose mode (more diagnostics on stderr).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build (if needed) and run a command with the given arguments.
    #[command(visible_alias = "execute")]
    Exec {
        /// Command name, as it would appear in the links directory.
        #[arg(value_name = "COMMAND")]
        command: OsString,

        /// Arguments passed through to the command.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<OsString>,
    },

    /// Install a dispatcher binary (default: this one) and rebuild the links.
    Install {
        /// Executable to install.
        path: Option<PathBuf>,
    },

    /// Print the source file a command resolves to.
    Which {
        #[arg(value_name = "COMMAND")]
        command: String,
    },

    /// Check toolchains, layout and search path.
    Doctor,

    /// Evict stale and incomplete cache entries now.
    Clean,
}

/// Set up tracing on stderr; stdout belongs to the dispatched programs.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Whether `arg0` names a command rather than binc itself.
pub fn is_alias_invocation(arg0: &Path) -> bool {
    let base = base_name(arg0);
    // `*_binc` covers IDE run configurations that rename the binary
    base != APP_NAME && base != DISPATCHER_BASE && !base.ends_with(&format!("_{}", APP_NAME))
}

/// Entry point; returns the process exit code.
pub fn main(args: Vec<OsString>) -> Result<i32> {
    let config = Config::from_env().context("failed to read configuration")?;
    let registry = Registry::builtin();
    let toolchains = Toolchains::from_env();
    let dispatcher = Dispatcher::new(&registry, &config, &toolchains);

    if args.first().is_some_and(|arg0| is_alias_invocation(Path::new(arg0))) {
        init_logging(false);
        return Ok(dispatcher.execute(&args, config.force_rebuild)?);
    }

    let cli = Cli::parse_from(&args);
    init_logging(cli.verbose);
    run(cli, &config, &toolchains, &dispatcher)
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli, config: &Config, toolchains: &Toolchains, dispatcher: &Dispatcher<'_>) -> Result<i32> {
    match cli.command {
        None => {
            dispatcher.rebuild_catalog()?;
            Ok(0)
        }

        Some(Commands::Exec { command, args }) => {
            let mut argv = Vec::with_capacity(args.len() + 1);
            argv.push(command);
            argv.extend(args);
            Ok(dispatcher.execute(&argv, config.force_rebuild)?)
        }

        Some(Commands::Install { path }) => {
            let source = match path {
                Some(path) => path,
                None => std::env::current_exe().context("cannot locate the running binary")?,
            };
            let dest = install::install_dispatcher(&source, &config.paths)?;
            eprintln!("Installed {}", dest.display());
            dispatcher.rebuild_catalog()?;
            Ok(0)
        }

        Some(Commands::Which { command }) => {
            println!("{}", dispatcher.which(&command)?.display());
            Ok(0)
        }

        Some(Commands::Doctor) => {
            doctor::run_doctor(config, dispatcher.registry(), toolchains);
            Ok(0)
        }

        Some(Commands::Clean) => {
            let report = dispatcher.clean()?;
            eprintln!(
                "Scanned {} cache entries: {} evicted, {} incomplete removed, {} in use, {} stale locks removed",
                report.scanned,
                report.evicted.len(),
                report.purged_incomplete.len(),
                report.skipped_locked,
                report.removed_locks
            );
            Ok(0)
        }
    }
}
