//! Zip packing and extraction of scratch workspaces.

use crate::atomic;
use crate::error::{PackError, Result};
use crate::paths::{self, entries};
use std::fs::{self, File};
use std::io::{self, Cursor, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644)
}

/// Collects workspace files and directories as archive names, sorted so the
/// content-type descriptor comes first and the rest is deterministic.
fn collect(root: &Path, dir: &Path, files: &mut Vec<(String, PathBuf)>, dirs: &mut Vec<String>) -> io::Result<()> {
    let mut children: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<io::Result<_>>()?;
    children.sort();

    for path in children {
        let name = archive_name(root, &path);
        // Follows symlinks so a dangling one fails the pack instead of being skipped
        let meta = fs::metadata(&path)?;
        if meta.is_dir() {
            dirs.push(format!("{}/", name));
            collect(root, &path, files, dirs)?;
        } else {
            files.push((name, path));
        }
    }
    Ok(())
}

fn archive_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Writes every file of `workspace` into a zip archive on `writer`.
pub(crate) fn write_archive<W: Write + Seek>(workspace: &Path, writer: W) -> Result<W> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    collect(workspace, workspace, &mut files, &mut dirs)?;
    files.sort_by_key(|(name, _)| name != entries::CONTENT_TYPES);

    let mut zip = ZipWriter::new(writer);
    let options = file_options();
    let dir_options = options.unix_permissions(0o755);
    for dir in &dirs {
        zip.add_directory(dir.as_str(), dir_options)?;
    }
    for (name, path) in &files {
        zip.start_file(name.as_str(), options)?;
        let mut source = File::open(path)?;
        io::copy(&mut source, &mut zip)?;
    }
    let writer = zip.finish()?;
    debug!(files = files.len(), dirs = dirs.len(), "Packed workspace");
    Ok(writer)
}

/// Packs `workspace` into a brand-new container at `target`.
///
/// Never overwrites an existing file; the archive is built in memory and
/// created exclusively.
pub(crate) fn pack_new(workspace: &Path, target: &Path) -> Result<()> {
    let cursor = write_archive(workspace, Cursor::new(Vec::new()))?;
    atomic::create_exclusive(target, cursor.get_ref()).map_err(|e| {
        if e.kind() == io::ErrorKind::AlreadyExists {
            PackError::AlreadyExists {
                path: target.to_path_buf(),
            }
        } else {
            PackError::Io(e)
        }
    })
}

/// Repacks `workspace` over the container at `target`.
///
/// The archive is built at `target.tmp` and renamed over `target` only once
/// complete. On failure the temp file is removed and `target` is untouched.
pub(crate) fn repack(workspace: &Path, target: &Path) -> Result<()> {
    let tmp = paths::temp_path(target);
    atomic::remove_if_exists(&tmp)?;

    let result = (|| -> Result<()> {
        let file = File::create(&tmp)?;
        let file = write_archive(workspace, file)?;
        file.sync_all()?;
        drop(file);
        atomic::replace(&tmp, target)?;
        Ok(())
    })();

    if result.is_err() {
        if let Err(e) = atomic::remove_if_exists(&tmp) {
            warn!(path = %tmp.display(), error = %e, "Failed to remove temp archive");
        }
    }
    result
}

/// Extracts the container at `source` into `dest`.
pub(crate) fn extract(source: &Path, dest: &Path) -> Result<()> {
    let file = File::open(source)?;
    let mut archive = ZipArchive::new(file).map_err(|e| PackError::Format {
        path: source.to_path_buf(),
        reason: e.to_string(),
    })?;
    archive.extract(dest)?;
    debug!(path = %source.display(), entries = archive.len(), "Extracted container");
    Ok(())
}

/// Cheap structural check: the file is a zip archive with a metadata entry.
///
/// Does not extract anything.
pub fn is_valid_container(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    match ZipArchive::new(file) {
        Ok(mut archive) => {
            let found = archive.by_name(entries::METADATA).is_ok();
            found
        }
        Err(_) => false,
    }
}
