//! Self-install: copy an executable into the links directory as the
//! dispatcher every alias points at.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

use crate::core::error::{BincError, Result};
use crate::core::paths::{ensure_dir, BincPaths};

/// Install `source` as `<links>/.binc` with mode 0755.
///
/// The copy goes through a temp file in the links directory and is renamed
/// into place, so reinstalling over the running dispatcher is safe.
pub fn install_dispatcher(source: &Path, paths: &BincPaths) -> Result<PathBuf> {
    let source = fs::canonicalize(source).map_err(|e| BincError::io(source, e))?;
    let meta = fs::metadata(&source).map_err(|e| BincError::io(&source, e))?;
    if !meta.is_file() {
        return Err(BincError::NotAFile { path: source });
    }
    if !is_executable(&meta) {
        return Err(BincError::NotExecutable { path: source });
    }

    let links_dir = paths.links_dir();
    ensure_dir(&links_dir)?;
    let dest = paths.dispatcher_path();

    let mut tmp = NamedTempFile::new_in(&links_dir).map_err(|e| BincError::io(&links_dir, e))?;
    let mut input = File::open(&source).map_err(|e| BincError::io(&source, e))?;
    io::copy(&mut input, tmp.as_file_mut()).map_err(|e| BincError::io(tmp.path(), e))?;
    set_mode(tmp.path())?;
    tmp.persist(&dest)
        .map_err(|e| BincError::io(&dest, e.error))?;

    info!(from = %source.display(), to = %dest.display(), "installed dispatcher");
    Ok(dest)
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    true
}

#[cfg(unix)]
fn set_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| BincError::io(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[test]
    fn test_install_copies_with_exec_mode() {
        let temp = tempdir().unwrap();
        let exe = temp.path().join("binc");
        fs::write(&exe, b"\x7fELF fake").unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o700)).unwrap();

        let paths = BincPaths::new(temp.path().join("home"));
        let dest = install_dispatcher(&exe, &paths).unwrap();

        assert_eq!(dest, paths.dispatcher_path());
        assert_eq!(fs::read(&dest).unwrap(), b"\x7fELF fake");
        assert_eq!(fs::metadata(&dest).unwrap().permissions().mode() & 0o777, 0o755);
    }

    #[test]
    fn test_reinstall_over_existing() {
        let temp = tempdir().unwrap();
        let exe = temp.path().join("binc");
        fs::write(&exe, b"v1").unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
        let paths = BincPaths::new(temp.path().join("home"));

        install_dispatcher(&exe, &paths).unwrap();
        fs::write(&exe, b"v2").unwrap();
        let dest = install_dispatcher(&exe, &paths).unwrap();
        assert_eq!(fs::read(dest).unwrap(), b"v2");
    }

    #[test]
    fn test_rejects_non_executables() {
        let temp = tempdir().unwrap();
        let paths = BincPaths::new(temp.path().join("home"));

        let plain = temp.path().join("plain");
        fs::write(&plain, "x").unwrap();
        fs::set_permissions(&plain, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(matches!(
            install_dispatcher(&plain, &paths),
            Err(BincError::NotExecutable { .. })
        ));

        assert!(matches!(
            install_dispatcher(temp.path(), &paths),
            Err(BincError::NotAFile { .. })
        ));

        assert!(matches!(
            install_dispatcher(&temp.path().join("missing"), &paths),
            Err(BincError::NotFound { .. })
        ));
    }
}
