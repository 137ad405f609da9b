//! JVM class managers (Java and Scala)
//!
//! `SayHello.java` is the command `say-hello`. The source is compiled with
//! `-d` into a cache entry and run as `java -cp <entry> SayHello`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::cache::fingerprint::BuildFingerprint;
use crate::cache::store::CacheStore;
use crate::core::error::{BincError, Result};
use crate::core::paths::base_name;
use crate::managers::casing::{command_for_identifier, identifier_for_command};
use crate::managers::toolchain::{exec_program, Toolchain};
use crate::managers::{command_name, strip_extension, CommandSource, DirListing, Manager, Registry};

pub const JAVA_MANAGER: &str = "Java Class Manager";
pub const SCALA_MANAGER: &str = "Scala Class Manager";

const PRIORITY: i32 = 50;
const JAVA_EXTS: &[&str] = &[".java"];
const SCALA_EXTS: &[&str] = &[".scala", ".sc"];

pub fn register(registry: &mut Registry) {
    registry.register(JAVA_MANAGER, PRIORITY, |dir, toolchains| {
        let (Some(javac), Some(java)) = (toolchains.javac(), toolchains.java()) else {
            return Ok(None);
        };
        JvmClassManager::for_dir(
            JAVA_MANAGER,
            JAVA_EXTS,
            javac.clone(),
            java.clone(),
            None,
            dir,
        )
    });

    registry.register(SCALA_MANAGER, PRIORITY, |dir, toolchains| {
        let (Some(scalac), Some(java), Some(home)) =
            (toolchains.scalac(), toolchains.java(), toolchains.scala_home())
        else {
            return Ok(None);
        };
        JvmClassManager::for_dir(
            SCALA_MANAGER,
            SCALA_EXTS,
            scalac.clone(),
            java.clone(),
            Some(home.join("lib").join("*")),
            dir,
        )
    });
}

pub struct JvmClassManager {
    name: &'static str,
    extensions: &'static [&'static str],
    compiler: Toolchain,
    java: Toolchain,
    /// Appended to the entry dir on the runtime classpath (Scala's runtime jars).
    runtime_classpath: Option<PathBuf>,
    files: Vec<PathBuf>,
}

impl JvmClassManager {
    fn for_dir(
        name: &'static str,
        extensions: &'static [&'static str],
        compiler: Toolchain,
        java: Toolchain,
        runtime_classpath: Option<PathBuf>,
        dir: &Path,
    ) -> Result<Option<Box<dyn Manager>>> {
        let files = DirListing::read(dir)?.files_with(extensions);
        if files.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(Self {
            name,
            extensions,
            compiler,
            java,
            runtime_classpath,
            files,
        })))
    }

    /// Class name (file stem) of a source.
    fn class_name(&self, path: &Path) -> Option<String> {
        strip_extension(&base_name(path), self.extensions).map(str::to_string)
    }

    /// Source and class name for `command`.
    fn find(&self, command: &str) -> Option<(&PathBuf, String)> {
        let class = identifier_for_command(command)?;
        let path = self
            .files
            .iter()
            .find(|path| self.class_name(path).as_deref() == Some(class.as_str()))?;
        Some((path, class))
    }

    /// Compile `source` into the store; returns the entry dir holding the class.
    fn compile(&self, cache: &CacheStore, source: &Path, class: &str, force_rebuild: bool) -> Result<PathBuf> {
        let version = self.compiler.query(["-version"], true)?;
        let fingerprint = BuildFingerprint::new(version.trim(), &[], &[source])?;
        let class_file = cache.get_or_build(
            &fingerprint,
            &format!("{}.class", class),
            force_rebuild,
            |staging| {
                let mut cmd = self.compiler.command();
                cmd.arg("-d").arg(staging).arg(source);
                self.compiler.build(cmd, &[])
            },
        )?;
        Ok(class_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cache.entry_dir(fingerprint.digest())))
    }

    fn classpath(&self, entry_dir: &Path) -> Result<OsString> {
        let mut parts = vec![entry_dir.to_path_buf()];
        parts.extend(self.runtime_classpath.iter().cloned());
        std::env::join_paths(&parts).map_err(|e| BincError::Io {
            path: entry_dir.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
        })
    }
}

impl Manager for JvmClassManager {
    fn name(&self) -> &'static str {
        self.name
    }

    fn enumerate_commands(&self) -> Vec<CommandSource> {
        self.files
            .iter()
            .filter_map(|path| {
                self.class_name(path)
                    .and_then(|class| command_for_identifier(&class))
                    .map(|command| CommandSource::new(command, path.clone()))
            })
            .collect()
    }

    fn can_run(&self, command: &str) -> bool {
        self.find(command).is_some()
    }

    fn run(&self, cache: &CacheStore, args: &[OsString], force_rebuild: bool) -> Result<i32> {
        let command = command_name(args);
        let (source, class) = self
            .find(&command)
            .ok_or_else(|| BincError::NoMatchingCommand {
                name: command.clone(),
            })?;
        let entry_dir = self.compile(cache, source, &class, force_rebuild)?;

        let mut cmd = self.java.command();
        cmd.arg("-cp")
            .arg(self.classpath(&entry_dir)?)
            .arg(&class)
            .args(args.iter().skip(1));
        exec_program(cmd)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::{tempdir, TempDir};

    // "compiles" the `//sh:` lines of a source into `<dir>/<Class>.class`
    const FAKE_JAVAC: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "javac 21-fake" >&2; exit 0; fi
echo "javac $*" >> "$(dirname "$0")/calls.log"
out="$2"; src="$3"
name=$(basename "$src"); name="${name%.*}"
{ echo '#!/bin/sh'; sed -n 's#^//sh: ##p' "$src"; } > "$out/$name.class"
"#;

    // runs the fake class from the first classpath element
    const FAKE_JAVA: &str = r#"#!/bin/sh
[ "$1" = "-cp" ] || exit 90
cp="${2%%:*}"; class="$3"; shift 3
exec sh "$cp/$class.class" "$@"
"#;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn fixture(sources: &[(&str, &str)], runtime_classpath: Option<PathBuf>) -> (TempDir, Box<dyn Manager>) {
        let temp = tempdir().unwrap();
        let bin = temp.path().join("bin");
        let src = temp.path().join("src");
        fs::create_dir_all(&bin).unwrap();
        fs::create_dir_all(&src).unwrap();
        for (name, body) in sources {
            fs::write(src.join(name), body).unwrap();
        }
        let javac = Toolchain::new("javac", script(&bin, "javac", FAKE_JAVAC));
        let java = Toolchain::new("java", script(&bin, "java", FAKE_JAVA));
        let manager = JvmClassManager::for_dir(
            JAVA_MANAGER,
            JAVA_EXTS,
            javac,
            java,
            runtime_classpath,
            &src,
        )
        .unwrap()
        .unwrap();
        (temp, manager)
    }

    fn compile_count(temp: &TempDir) -> usize {
        fs::read_to_string(temp.path().join("bin").join("calls.log"))
            .unwrap_or_default()
            .lines()
            .count()
    }

    #[test]
    fn test_no_manager_without_sources() {
        let temp = tempdir().unwrap();
        let tool = Toolchain::new("javac", temp.path().join("javac"));
        let manager = JvmClassManager::for_dir(
            JAVA_MANAGER,
            JAVA_EXTS,
            tool.clone(),
            tool,
            None,
            temp.path(),
        )
        .unwrap();
        assert!(manager.is_none());
    }

    #[test]
    fn test_commands_are_kebab_case() {
        let (temp, manager) = fixture(
            &[
                ("SayHello.java", ""),
                ("Main.java", ""),
                ("lowercase.java", ""),
                ("README.md", ""),
            ],
            None,
        );
        let src = temp.path().join("src");
        assert_eq!(
            manager.enumerate_commands(),
            vec![
                CommandSource::new("main", src.join("Main.java")),
                CommandSource::new("say-hello", src.join("SayHello.java")),
            ]
        );
        assert!(manager.can_run("say-hello"));
        assert!(!manager.can_run("SayHello"));
        assert!(!manager.can_run("sayhello"));
        assert!(!manager.can_run("lowercase"));
    }

    #[test]
    fn test_compile_once_and_forward_exit_code() {
        let (temp, manager) = fixture(&[("ExitSeven.java", "//sh: exit 7\n")], None);
        let cache = CacheStore::new(temp.path().join("cache"));
        let args = vec![OsString::from("exit-seven")];

        assert_eq!(manager.run(&cache, &args, false).unwrap(), 7);
        assert_eq!(manager.run(&cache, &args, false).unwrap(), 7);
        assert_eq!(compile_count(&temp), 1);

        let entries = cache.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].join("ExitSeven.class").is_file());
    }

    #[test]
    fn test_runtime_classpath_is_appended() {
        let (temp, manager) = fixture(
            &[("Echo.java", "//sh: echo \"$@\" > \"$OUT\"\n")],
            Some(PathBuf::from("/opt/scala/lib/*")),
        );
        let cache = CacheStore::new(temp.path().join("cache"));
        let out = temp.path().join("out.txt");
        std::env::set_var("OUT", &out);
        let args = vec![OsString::from("echo"), OsString::from("a b")];
        assert_eq!(manager.run(&cache, &args, false).unwrap(), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "a b\n");
    }
}
