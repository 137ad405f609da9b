//! Dispatch module - resolve command names to sources and run them
//!
//! Search directories are visited in `BINCPATH` order and, within each
//! directory, managers in registry order. The first manager to claim a name
//! owns it, both for the alias catalog and for execution.

pub mod doctor;
pub mod install;
pub mod links;

use std::collections::HashMap;
use std::ffi::OsString;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::cache::janitor::{Janitor, SweepReport};
use crate::cache::store::CacheStore;
use crate::core::config::Config;
use crate::core::error::{BincError, Result};
use crate::managers::toolchain::Toolchains;
use crate::managers::{command_name, CommandSource, Manager, Registry};

/// A command name bound to the source that will serve it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBinding {
    pub name: String,
    pub source: PathBuf,
    pub manager: &'static str,
}

/// Result of resolving every claimable name across the search path.
#[derive(Debug, Default)]
pub struct Catalog {
    /// First claims, in discovery order.
    pub bindings: Vec<CommandBinding>,
    /// Later claims on an already bound name.
    pub conflicts: Vec<BincError>,
}

pub struct Dispatcher<'a> {
    registry: &'a Registry,
    config: &'a Config,
    toolchains: &'a Toolchains,
    store: CacheStore,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a Registry, config: &'a Config, toolchains: &'a Toolchains) -> Self {
        Self {
            registry,
            config,
            toolchains,
            store: CacheStore::new(config.paths.cache_root()),
        }
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    fn janitor(&self) -> Janitor {
        Janitor::new(self.config.cleanup_cycle, self.config.retention_days)
    }

    /// Visit managers directory-major, manager-minor, until `visit` breaks.
    fn visit_managers<T, F>(&self, mut visit: F) -> Result<Option<T>>
    where
        F: FnMut(&dyn Manager) -> Result<ControlFlow<T>>,
    {
        for dir in self.config.search_dirs() {
            for manager in self.registry.managers_for(&dir, self.toolchains)? {
                if let ControlFlow::Break(value) = visit(manager.as_ref())? {
                    return Ok(Some(value));
                }
            }
        }
        Ok(None)
    }

    /// Resolve every command name; later claims on a bound name are
    /// recorded as conflicts and logged.
    pub fn catalog(&self) -> Result<Catalog> {
        let mut catalog = Catalog::default();
        let mut bound: HashMap<String, usize> = HashMap::new();

        self.visit_managers(|manager| {
            for CommandSource { name, source } in manager.enumerate_commands() {
                let existing = bound.get(&name).copied();
                if let Some(index) = existing {
                    let conflict = BincError::ConflictingBinding {
                        name,
                        kept: catalog.bindings[index].source.clone(),
                        discarded: source,
                    };
                    warn!("{}", conflict);
                    catalog.conflicts.push(conflict);
                    continue;
                }
                bound.insert(name.clone(), catalog.bindings.len());
                catalog.bindings.push(CommandBinding {
                    name,
                    source,
                    manager: manager.name(),
                });
            }
            Ok(ControlFlow::<()>::Continue(()))
        })?;

        Ok(catalog)
    }

    /// Refresh the alias links: maybe sweep the cache, drop every alias,
    /// then link each bound name to the dispatcher.
    pub fn rebuild_catalog(&self) -> Result<Catalog> {
        self.config.paths.ensure()?;

        match self.janitor().maybe_sweep(&self.store) {
            Ok(Some(report)) => self.log_sweep(&report),
            Ok(None) => {}
            Err(e) => warn!("cache cleanup failed: {}", e),
        }

        let catalog = self.catalog()?;
        let links_dir = self.config.paths.links_dir();
        links::remove_aliases(&links_dir)?;
        for binding in &catalog.bindings {
            if !links::create_alias(&links_dir, &binding.name)? {
                warn!(
                    name = %binding.name,
                    "{} is occupied by a file binc does not own; not linking",
                    links_dir.join(&binding.name).display()
                );
            }
        }
        info!(
            commands = catalog.bindings.len(),
            conflicts = catalog.conflicts.len(),
            "catalog rebuilt"
        );
        Ok(catalog)
    }

    /// Build (if needed) and run `args[0]` with `args[1..]`; returns the
    /// child's exit code. Only the first claiming manager is tried.
    pub fn execute(&self, args: &[OsString], force_rebuild: bool) -> Result<i32> {
        let name = command_name(args);
        let found = self.visit_managers(|manager| {
            if !manager.can_run(&name) {
                return Ok(ControlFlow::Continue(()));
            }
            debug!(command = %name, manager = manager.name(), "dispatching");
            manager
                .run(&self.store, args, force_rebuild)
                .map(ControlFlow::Break)
        })?;
        found.ok_or_else(|| BincError::NoMatchingCommand { name: name.clone() })
    }

    /// Source that `name` resolves to.
    pub fn which(&self, name: &str) -> Result<PathBuf> {
        let found = self.visit_managers(|manager| {
            Ok(match manager.enumerate_commands().into_iter().find(|c| c.name == name) {
                Some(command) => ControlFlow::Break(command.source),
                None => ControlFlow::Continue(()),
            })
        })?;
        found.ok_or_else(|| BincError::NoMatchingCommand {
            name: name.to_string(),
        })
    }

    /// Sweep the cache now, regardless of the cleanup cycle.
    pub fn clean(&self) -> Result<SweepReport> {
        let report = self.janitor().sweep(&self.store, SystemTime::now())?;
        self.log_sweep(&report);
        Ok(report)
    }

    fn log_sweep(&self, report: &SweepReport) {
        info!(
            root = %self.store.root().display(),
            scanned = report.scanned,
            evicted = report.evicted.len(),
            incomplete = report.purged_incomplete.len(),
            locked = report.skipped_locked,
            stale_locks = report.removed_locks,
            "cache sweep"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::managers::testing::FakeManager;
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;
    use std::rc::Rc;
    use tempfile::{tempdir, TempDir};

    type Runs = Rc<RefCell<Vec<String>>>;

    fn bound<'c>(catalog: &'c Catalog, name: &str) -> &'c CommandBinding {
        catalog.bindings.iter().find(|b| b.name == name).unwrap()
    }

    struct Fixture {
        temp: TempDir,
        config: Config,
        registry: Registry,
        toolchains: Toolchains,
        runs: Runs,
    }

    /// A fake manager registered under `label` that only appears in
    /// search dir `dir`.
    struct FakeSpec {
        label: &'static str,
        priority: i32,
        dir: &'static str,
        commands: Vec<CommandSource>,
        outcome: fn() -> Result<i32>,
    }

    fn fake(
        label: &'static str,
        priority: i32,
        dir: &'static str,
        commands: &[&str],
        outcome: fn() -> Result<i32>,
    ) -> FakeSpec {
        FakeSpec {
            label,
            priority,
            dir,
            commands: commands
                .iter()
                .map(|c| CommandSource::new(*c, format!("{}/{}/{}", label, dir, c)))
                .collect(),
            outcome,
        }
    }

    impl Fixture {
        /// Two search dirs, `a` then `b`.
        fn new(specs: Vec<FakeSpec>) -> Self {
            let temp = tempdir().unwrap();
            for dir in ["a", "b"] {
                fs::create_dir_all(temp.path().join(dir)).unwrap();
            }
            let home = temp.path().join("home");
            let bincpath = format!(
                "{}:{}",
                temp.path().join("a").display(),
                temp.path().join("b").display()
            );
            let config = Config::from_lookup(
                |key| match key {
                    "BINCPATH" => Some(bincpath.clone().into()),
                    "BINC_CLEANUP_CYCLE" => Some("1000000".into()),
                    _ => None,
                },
                || Some(home.clone()),
            )
            .unwrap();

            let runs: Runs = Rc::default();
            let mut registry = Registry::new();
            for spec in specs {
                let runs = runs.clone();
                let FakeSpec {
                    label,
                    priority,
                    dir,
                    commands,
                    outcome,
                } = spec;
                registry.register(label, priority, move |path: &Path, _: &Toolchains| {
                    if path.file_name().and_then(|n| n.to_str()) != Some(dir) {
                        return Ok(None);
                    }
                    Ok(Some(Box::new(FakeManager {
                        label,
                        commands: commands.clone(),
                        outcome,
                        runs: runs.clone(),
                    }) as Box<dyn Manager>))
                });
            }

            Self {
                temp,
                config,
                registry,
                toolchains: Toolchains::with_roots(None, None),
                runs,
            }
        }

        fn dispatcher(&self) -> Dispatcher<'_> {
            Dispatcher::new(&self.registry, &self.config, &self.toolchains)
        }

        fn links_dir(&self) -> PathBuf {
            self.temp.path().join("home").join(".binc")
        }
    }

    fn ok_zero() -> Result<i32> {
        Ok(0)
    }

    fn ok_seven() -> Result<i32> {
        Ok(7)
    }

    fn build_failed() -> Result<i32> {
        Err(BincError::BuildFailed {
            program: "fake".to_string(),
            code: Some(2),
        })
    }

    fn args(name: &str) -> Vec<OsString> {
        vec![OsString::from(name)]
    }

    #[test]
    fn test_first_claim_wins_and_conflicts_are_reported() {
        let fixture = Fixture::new(vec![
            fake("high", 100, "a", &["foo"], ok_zero),
            fake("low", 50, "a", &["foo", "bar"], ok_zero),
            fake("high", 100, "b", &["bar", "baz"], ok_zero),
        ]);
        let catalog = fixture.dispatcher().catalog().unwrap();

        let names: Vec<_> = catalog.bindings.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["foo", "bar", "baz"]);
        assert_eq!(bound(&catalog, "foo").manager, "high");
        // directory-major: dir a's low-priority claim beats dir b's high one
        assert_eq!(bound(&catalog, "bar").manager, "low");
        assert_eq!(catalog.conflicts.len(), 2);
        assert!(matches!(
            &catalog.conflicts[0],
            BincError::ConflictingBinding { name, .. } if name == "foo"
        ));
    }

    #[test]
    fn test_execute_uses_first_claim_only() {
        let fixture = Fixture::new(vec![
            fake("first", 100, "a", &["foo"], build_failed),
            fake("second", 50, "a", &["foo"], ok_seven),
        ]);
        let err = fixture.dispatcher().execute(&args("foo"), false).unwrap_err();
        assert_eq!(err.exit_code(), Some(2));
        assert_eq!(*fixture.runs.borrow(), vec!["first:foo".to_string()]);
    }

    #[test]
    fn test_execute_returns_child_exit_code() {
        let fixture = Fixture::new(vec![fake("only", 50, "b", &["tool"], ok_seven)]);
        let code = fixture
            .dispatcher()
            .execute(&args("/home/me/.binc/tool"), false)
            .unwrap();
        assert_eq!(code, 7);
    }

    #[test]
    fn test_unknown_command() {
        let fixture = Fixture::new(vec![fake("only", 50, "a", &["tool"], ok_zero)]);
        let err = fixture.dispatcher().execute(&args("nope"), false).unwrap_err();
        assert!(matches!(err, BincError::NoMatchingCommand { name } if name == "nope"));
        assert!(fixture.runs.borrow().is_empty());
    }

    #[test]
    fn test_which_follows_search_order() {
        let fixture = Fixture::new(vec![
            fake("m", 50, "b", &["tool"], ok_zero),
            fake("n", 10, "a", &["tool"], ok_zero),
        ]);
        let dispatcher = fixture.dispatcher();
        assert_eq!(dispatcher.which("tool").unwrap(), PathBuf::from("n/a/tool"));
        assert!(matches!(
            dispatcher.which("nope"),
            Err(BincError::NoMatchingCommand { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_rebuild_catalog_links_bound_names() {
        let fixture = Fixture::new(vec![fake("only", 50, "a", &["one", "two"], ok_zero)]);
        let links = fixture.links_dir();
        fs::create_dir_all(&links).unwrap();
        std::os::unix::fs::symlink(".binc", links.join("stale")).unwrap();
        fs::write(links.join("two"), "user file").unwrap();

        let catalog = fixture.dispatcher().rebuild_catalog().unwrap();
        assert_eq!(catalog.bindings.len(), 2);

        assert!(links::is_alias(&links.join("one")));
        assert!(fs::symlink_metadata(links.join("stale")).is_err());
        assert_eq!(fs::read_to_string(links.join("two")).unwrap(), "user file");
        assert!(fixture.config.paths.cache_root().is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_sweep_does_not_abort_rebuild() {
        let mut fixture = Fixture::new(vec![fake("only", 50, "a", &["tool"], ok_zero)]);
        fixture.config.cleanup_cycle = 1;
        let cache = fixture.config.paths.cache_root();
        fs::create_dir_all(cache.join("deadbeef")).unwrap();
        // lock files cannot be created under a regular file
        fs::write(cache.join(".locks"), "").unwrap();

        let dispatcher = fixture.dispatcher();
        assert!(dispatcher.clean().is_err());

        let catalog = dispatcher.rebuild_catalog().unwrap();
        assert_eq!(catalog.bindings.len(), 1);
        assert!(links::is_alias(&fixture.links_dir().join("tool")));
        assert!(cache.join("deadbeef").exists());
    }

    #[test]
    fn test_clean_sweeps_incomplete_entries() {
        let fixture = Fixture::new(vec![]);
        let dispatcher = fixture.dispatcher();
        let entry = dispatcher.store.entry_dir("deadbeef");
        fs::create_dir_all(&entry).unwrap();

        let report = dispatcher.clean().unwrap();
        assert_eq!(report.purged_incomplete, vec!["deadbeef".to_string()]);
        assert!(!entry.exists());
    }
}
