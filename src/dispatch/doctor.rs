//! Doctor - toolchain and layout checks

use colored::Colorize;
use std::path::PathBuf;

use crate::core::config::Config;
use crate::managers::toolchain::{Toolchain, Toolchains};
use crate::managers::Registry;

/// Availability of one external toolchain.
#[derive(Debug, Clone)]
pub struct ToolchainStatus {
    pub name: &'static str,
    pub program: Option<PathBuf>,
    /// Managers that stay inactive without it.
    pub needed_by: &'static str,
    pub notes: Option<&'static str>,
}

impl ToolchainStatus {
    fn new(name: &'static str, found: Option<&Toolchain>, needed_by: &'static str) -> Self {
        Self {
            name,
            program: found.map(|t| t.program.clone()),
            needed_by,
            notes: None,
        }
    }

    pub fn available(&self) -> bool {
        self.program.is_some()
    }

    pub fn render(&self) -> String {
        let mark = if self.available() {
            "✓".green()
        } else {
            "✗".red()
        };
        let found = self
            .program
            .as_ref()
            .map(|p| format!("found: {}", p.display()))
            .unwrap_or_else(|| "not found".to_string());
        let mut line = format!("{} {} ({}) - {}", mark, self.name.bold(), self.needed_by, found);
        if let Some(notes) = self.notes {
            line.push_str(&format!("\n  Note: {}", notes));
        }
        line
    }
}

/// Probe every toolchain a built-in manager can use.
pub fn check_toolchains(toolchains: &Toolchains) -> Vec<ToolchainStatus> {
    let mut scalac = ToolchainStatus::new("scalac", toolchains.scalac(), "Scala");
    if toolchains.scala_home().is_none() {
        scalac.notes = Some("set SCALA_HOME to enable Scala sources");
    }

    let mut go = ToolchainStatus::new("go", toolchains.go(), "Go files and packages");
    if go.program.is_none() {
        go.notes = Some("looked in $GOROOT/bin, then PATH");
    }

    vec![
        go,
        ToolchainStatus::new("javac", toolchains.javac(), "Java"),
        ToolchainStatus::new("java", toolchains.java(), "Java, Scala"),
        scalac,
        ToolchainStatus::new("cargo", toolchains.cargo(), "Rust"),
        ToolchainStatus::new("cabal", toolchains.cabal(), "Haskell"),
    ]
}

/// Print the report. Missing toolchains only disable their managers, so
/// this never fails.
pub fn run_doctor(config: &Config, registry: &Registry, toolchains: &Toolchains) {
    println!("{}", "Toolchains".bold());
    for status in check_toolchains(toolchains) {
        println!("{}", status.render());
    }

    println!();
    println!("{}", "Managers (dispatch order)".bold());
    for descriptor in registry.descriptors() {
        println!("  {:<8} priority {}", descriptor.name, descriptor.priority);
    }

    println!();
    println!("{}", "Layout".bold());
    println!("  links dir:  {}", config.paths.links_dir().display());
    println!("  cache root: {}", config.paths.cache_root().display());
    let dispatcher = config.paths.dispatcher_path();
    if dispatcher.is_file() {
        println!("  {} dispatcher installed", "✓".green());
    } else {
        println!("  {} dispatcher not installed (run `binc install`)", "✗".red());
    }

    println!();
    println!("{}", "Search path (BINCPATH)".bold());
    if config.search_path.is_empty() {
        eprintln!("\n⚠️  BINCPATH is empty; no sources will be found.");
    }
    for dir in &config.search_path {
        let mark = if dir.is_dir() { "✓".green() } else { "✗".red() };
        println!("  {} {}", mark, dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_toolchains_lists_every_toolchain() {
        let toolchains = Toolchains::with_roots(None, None);
        let statuses = check_toolchains(&toolchains);
        let names: Vec<_> = statuses.iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["go", "javac", "java", "scalac", "cargo", "cabal"]);

        // no SCALA_HOME, no scalac
        let scalac = &statuses[3];
        assert!(!scalac.available());
        assert!(scalac.notes.is_some());
    }

    #[test]
    fn test_render_marks_availability() {
        colored::control::set_override(false);
        let status = ToolchainStatus {
            name: "go",
            program: Some(PathBuf::from("/usr/bin/go")),
            needed_by: "Go",
            notes: None,
        };
        assert_eq!(status.render(), "✓ go (Go) - found: /usr/bin/go");

        let missing = ToolchainStatus {
            program: None,
            notes: Some("install it"),
            ..status
        };
        assert_eq!(missing.render(), "✗ go (Go) - not found\n  Note: install it");
    }
}
