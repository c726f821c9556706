//! Crash-safe file replacement helpers shared by the sidecars and the
//! container repack.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes `bytes` to `path` atomically.
///
/// The data goes to `tmp_path` first, is fsynced, and is then renamed over
/// `path`. On failure the temp file is removed and `path` is untouched.
pub fn write_atomic(path: &Path, tmp_path: &Path, bytes: &[u8]) -> io::Result<()> {
    let result = (|| {
        {
            let mut file = File::create(tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        replace(tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(tmp_path);
    }
    result
}

/// Renames `from` over `to`, then fsyncs the parent directory on Unix.
pub fn replace(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)?;

    #[cfg(unix)]
    {
        if let Some(parent) = to.parent() {
            if let Ok(dir_file) = File::open(parent) {
                let _ = dir_file.sync_all();
            }
        }
    }

    Ok(())
}

/// Creates `path` exclusively with `bytes` as its content.
///
/// Fails with `AlreadyExists` instead of overwriting. The content is staged
/// in a temp file and hard-linked into place, so readers never observe a
/// half-written file. Filesystems without hard links fall back to
/// `create_new`.
pub fn create_exclusive(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp_path = sibling_temp_path(path);
    let staged = (|| {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()
    })();
    if let Err(e) = staged {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    let linked = fs::hard_link(&tmp_path, path);
    let _ = fs::remove_file(&tmp_path);
    match linked {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(e) => {
            debug!(error = %e, "hard link unavailable, using create_new");
            create_new(path, bytes)
        }
    }
}

fn create_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let written = file.write_all(bytes).and_then(|_| file.sync_all());
    if let Err(e) = written {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

/// Removes a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Unique temp path next to `path`, so concurrent writers never share a
/// temp file.
pub fn sibling_temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(
        ".{}-{}.tmp",
        std::process::id(),
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    ));
    PathBuf::from(name)
}
