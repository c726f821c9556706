//! Archive container lifecycle: create, open, save and export.
//!
//! An open container is materialized into a scratch workspace. All entry
//! reads and writes go to the workspace; only `save` repacks it into the
//! container file.

use crate::archive;
use crate::atomic;
use crate::config::WorkspaceConfig;
use crate::error::{PackError, Result};
use crate::paths::{self, entries, Product};
use crate::types::{
    CollaborationRecord, ContainerMetadata, EntryIndex, HistoryIndex, ReferenceIndex, ScriptIndex,
};
use crate::TimeProvider;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Hex SHA-256 of a file's bytes.
pub(crate) fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn content_types_xml(product: Product) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="json" ContentType="application/json"/>
  <Default Extension="{ext}" ContentType="{mime}"/>
  <Override PartName="/{inner}" ContentType="{mime}"/>
  <Override PartName="/{metadata}" ContentType="application/vnd.projpack.metadata+json"/>
</Types>
"#,
        ext = product.inner_document_extension(),
        mime = product.inner_content_type(),
        inner = product.inner_document_name(),
        metadata = entries::METADATA,
    )
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

/// A container extracted into its scratch workspace.
struct OpenContainer {
    path: PathBuf,
    metadata: ContainerMetadata,
    workspace: TempDir,
}

impl OpenContainer {
    fn inner_document_path(&self) -> PathBuf {
        self.workspace
            .path()
            .join(self.metadata.product_code.inner_document_name())
    }

    fn index_len<T: DeserializeOwned>(&self, entry: &str) -> Result<usize> {
        let path = self.workspace.path().join(paths::entry_relative_path(entry)?);
        Ok(read_json::<EntryIndex<T>>(&path)?.map_or(0, |index| index.entries.len()))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| PackError::Format {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Owns the scratch workspace of at most one open container.
///
/// Entry mutations take `&mut self`; the manager does no internal locking.
pub struct ContainerManager {
    scratch_root: Option<PathBuf>,
    time_provider: Option<Arc<dyn TimeProvider>>,
    current: Option<OpenContainer>,
}

impl Default for ContainerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerManager {
    /// Creates a manager using the system temp directory for workspaces.
    pub fn new() -> Self {
        Self {
            scratch_root: None,
            time_provider: None,
            current: None,
        }
    }

    /// Creates a manager with a configured scratch root.
    pub fn with_config(config: &WorkspaceConfig) -> Self {
        Self {
            scratch_root: config.scratch_dir.clone(),
            time_provider: None,
            current: None,
        }
    }

    /// Sets a custom time provider for testing.
    pub fn with_time_provider(mut self, provider: impl TimeProvider + 'static) -> Self {
        self.time_provider = Some(Arc::new(provider));
        self
    }

    /// Builds a new container at `container` from the document at `source`.
    ///
    /// The new container stays open afterwards.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `source` does not exist
    /// - `AlreadyExists` if `container` exists and is not empty
    pub fn create_from_source(
        &mut self,
        source: &Path,
        container: &Path,
        product: Product,
        author: &str,
        app_version: &str,
    ) -> Result<ContainerMetadata> {
        if !source.is_file() {
            return Err(PackError::NotFound {
                path: source.to_path_buf(),
            });
        }
        if !product.accepts_source(source) {
            warn!(source = %source.display(), product = %product, "Source extension does not match product");
        }
        match fs::metadata(container) {
            Ok(meta) if meta.len() > 0 || meta.is_dir() => {
                return Err(PackError::AlreadyExists {
                    path: container.to_path_buf(),
                })
            }
            Ok(_) => {
                debug!(path = %container.display(), "Replacing empty placeholder file");
                fs::remove_file(container)?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.close();
        let workspace = self.new_workspace()?;
        let ws = workspace.path();
        for dir in entries::WORKSPACE_DIRS {
            fs::create_dir_all(ws.join(paths::entry_relative_path(dir)?))?;
        }

        let inner = ws.join(product.inner_document_name());
        fs::copy(source, &inner)?;
        let hash = sha256_file(&inner)?;

        let original_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let metadata =
            ContainerMetadata::new(product, author, app_version, &original_name, hash, self.now());

        fs::write(ws.join(entries::CONTENT_TYPES), content_types_xml(product))?;
        write_json(&ws.join(entries::METADATA), &metadata)?;
        write_json(&ws.join(entries::STICKY_NOTES), &CollaborationRecord::default())?;
        write_json(&ws.join(entries::AI_CHAT_HISTORY), &serde_json::json!([]))?;
        write_json(
            &ws.join(paths::entry_relative_path(entries::HISTORY_INDEX)?),
            &HistoryIndex::default(),
        )?;
        write_json(
            &ws.join(paths::entry_relative_path(entries::REFERENCES_INDEX)?),
            &ReferenceIndex::default(),
        )?;
        write_json(
            &ws.join(paths::entry_relative_path(entries::SCRIPTS_INDEX)?),
            &ScriptIndex::default(),
        )?;

        archive::pack_new(ws, container)?;
        info!(path = %container.display(), product = %product, "Created container");

        self.current = Some(OpenContainer {
            path: container.to_path_buf(),
            metadata: metadata.clone(),
            workspace,
        });
        Ok(metadata)
    }

    /// Opens `container` into a fresh scratch workspace.
    ///
    /// A missing metadata entry is tolerated and rebuilt from the inner
    /// document. A metadata entry that fails to parse aborts the open.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the container does not exist
    /// - `Format` if the archive or its metadata cannot be parsed
    pub fn open(&mut self, container: &Path) -> Result<ContainerMetadata> {
        if !container.is_file() {
            return Err(PackError::NotFound {
                path: container.to_path_buf(),
            });
        }
        self.close();

        let workspace = self.new_workspace()?;
        archive::extract(container, workspace.path())?;

        let metadata_path = workspace.path().join(entries::METADATA);
        let metadata = match read_json::<ContainerMetadata>(&metadata_path) {
            Ok(Some(metadata)) => metadata,
            Ok(None) => self.rebuild_metadata(container, workspace.path())?,
            Err(PackError::Format { reason, .. }) => {
                return Err(PackError::Format {
                    path: container.to_path_buf(),
                    reason: format!("{}: {}", entries::METADATA, reason),
                })
            }
            Err(e) => return Err(e),
        };

        info!(path = %container.display(), product = %metadata.product_code, "Opened container");
        self.current = Some(OpenContainer {
            path: container.to_path_buf(),
            metadata: metadata.clone(),
            workspace,
        });
        Ok(metadata)
    }

    /// Opens `container` for a caller that holds its lock.
    ///
    /// Same as [`ContainerManager::open`], but first removes a temp archive
    /// left by an interrupted save. Only the lock holder may do this, since
    /// a temp archive next to a locked container can belong to a save in
    /// progress.
    pub fn open_for_edit(&mut self, container: &Path) -> Result<ContainerMetadata> {
        let stray = paths::temp_path(container);
        if container.is_file() && stray.exists() {
            warn!(path = %stray.display(), "Removing temp archive left by an interrupted save");
            if let Err(e) = atomic::remove_if_exists(&stray) {
                warn!(path = %stray.display(), error = %e, "Failed to remove stray temp archive");
            }
        }
        self.open(container)
    }

    fn rebuild_metadata(&self, container: &Path, ws: &Path) -> Result<ContainerMetadata> {
        let product = Product::from_container_path(container)
            .or_else(|| {
                Product::ALL
                    .into_iter()
                    .find(|p| ws.join(p.inner_document_name()).is_file())
            })
            .ok_or_else(|| PackError::Format {
                path: container.to_path_buf(),
                reason: "no metadata entry and no recognizable inner document".to_string(),
            })?;
        warn!(path = %container.display(), "Container has no metadata entry, rebuilding it");

        let inner = ws.join(product.inner_document_name());
        let hash = if inner.is_file() {
            sha256_file(&inner)?
        } else {
            String::new()
        };
        Ok(ContainerMetadata::new(
            product,
            "",
            "",
            product.inner_document_name(),
            hash,
            self.now(),
        ))
    }

    /// Recomputes the metadata and repacks the workspace over the container.
    ///
    /// Not retried on failure; the original container is left untouched.
    pub fn save(&mut self, updated_by: &str) -> Result<()> {
        let now = self.now();
        let current = self.current.as_mut().ok_or(PackError::NoDocumentLoaded)?;

        current.metadata.document_hash = sha256_file(&current.inner_document_path())?;
        current.metadata.history_count =
            current.index_len::<crate::types::HistoryEntry>(entries::HISTORY_INDEX)?;
        current.metadata.reference_count =
            current.index_len::<crate::types::ReferenceEntry>(entries::REFERENCES_INDEX)?;
        current.metadata.script_count =
            current.index_len::<crate::types::ScriptEntry>(entries::SCRIPTS_INDEX)?;
        current.metadata.updated_at = now;
        current.metadata.last_modified_by = updated_by.to_string();

        let ws = current.workspace.path();
        write_json(&ws.join(entries::METADATA), &current.metadata)?;
        archive::repack(ws, &current.path)?;
        info!(path = %current.path.display(), by = updated_by, "Saved container");
        Ok(())
    }

    /// Retargets the open container to `new_path` and saves it there.
    ///
    /// The previous target is kept if the save fails.
    pub fn save_as(&mut self, new_path: &Path, updated_by: &str) -> Result<()> {
        let current = self.current.as_mut().ok_or(PackError::NoDocumentLoaded)?;
        let previous = std::mem::replace(&mut current.path, new_path.to_path_buf());

        let result = self.save(updated_by);
        if result.is_err() {
            if let Some(current) = self.current.as_mut() {
                current.path = previous;
            }
        }
        result
    }

    /// Copies the inner document out of the workspace to `output`.
    pub fn export_inner_document(&self, output: &Path) -> Result<()> {
        let inner = self.open_container()?.inner_document_path();
        if !inner.is_file() {
            return Err(PackError::NotFound { path: inner });
        }
        fs::copy(&inner, output)?;
        debug!(output = %output.display(), "Exported inner document");
        Ok(())
    }

    /// Copies `source` over the inner document. The hash is recomputed on
    /// the next save.
    pub fn replace_inner_document(&mut self, source: &Path) -> Result<()> {
        if !source.is_file() {
            return Err(PackError::NotFound {
                path: source.to_path_buf(),
            });
        }
        let inner = self.open_container()?.inner_document_path();
        fs::copy(source, inner)?;
        Ok(())
    }

    /// Returns true if the inner document still matches `documentHash`.
    pub fn verify_document_hash(&self) -> Result<bool> {
        let current = self.open_container()?;
        let actual = sha256_file(&current.inner_document_path())?;
        Ok(actual.eq_ignore_ascii_case(&current.metadata.document_hash))
    }

    /// Reads and parses a JSON entry. `Ok(None)` if the entry is absent.
    pub fn read_entry<T: DeserializeOwned>(&self, entry: &str) -> Result<Option<T>> {
        read_json(&self.entry_path(entry)?)
    }

    /// Writes a JSON entry, creating parent directories as needed.
    pub fn write_entry<T: Serialize>(&mut self, entry: &str, value: &T) -> Result<()> {
        write_json(&self.entry_path(entry)?, value)
    }

    /// Writes raw bytes to an entry, creating parent directories as needed.
    pub fn add_binary_entry(&mut self, entry: &str, bytes: &[u8]) -> Result<()> {
        let path = self.entry_path(entry)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Reads raw bytes of an entry.
    pub fn read_binary_entry(&self, entry: &str) -> Result<Vec<u8>> {
        let path = self.entry_path(entry)?;
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PackError::NotFound { path },
            _ => PackError::Io(e),
        })
    }

    /// Removes a file or directory entry. Returns false if it was absent.
    pub fn remove_entry(&mut self, entry: &str) -> Result<bool> {
        let path = self.entry_path(entry)?;
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path)?,
            Ok(_) => fs::remove_file(&path)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        Ok(true)
    }

    /// Returns true if the entry exists in the workspace.
    pub fn entry_exists(&self, entry: &str) -> bool {
        self.entry_path(entry).map(|p| p.exists()).unwrap_or(false)
    }

    /// Returns true while a container is open.
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Path of the open container.
    pub fn path(&self) -> Option<&Path> {
        self.current.as_ref().map(|c| c.path.as_path())
    }

    /// Metadata of the open container.
    pub fn metadata(&self) -> Option<&ContainerMetadata> {
        self.current.as_ref().map(|c| &c.metadata)
    }

    /// Mutable metadata of the open container (title, tags, ...).
    pub fn metadata_mut(&mut self) -> Result<&mut ContainerMetadata> {
        Ok(&mut self
            .current
            .as_mut()
            .ok_or(PackError::NoDocumentLoaded)?
            .metadata)
    }

    /// Scratch workspace of the open container.
    pub fn workspace_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|c| c.workspace.path())
    }

    /// Drops the open container and deletes its scratch workspace.
    ///
    /// Cleanup failures are logged, never returned.
    pub fn close(&mut self) {
        if let Some(current) = self.current.take() {
            let ws = current.workspace.path().to_path_buf();
            if let Err(e) = current.workspace.close() {
                warn!(workspace = %ws.display(), error = %e, "Failed to remove scratch workspace");
            } else {
                debug!(path = %current.path.display(), "Closed container");
            }
        }
    }

    fn open_container(&self) -> Result<&OpenContainer> {
        self.current.as_ref().ok_or(PackError::NoDocumentLoaded)
    }

    pub(crate) fn product(&self) -> Result<Product> {
        Ok(self.open_container()?.metadata.product_code)
    }

    pub(crate) fn inner_document_path(&self) -> Result<PathBuf> {
        Ok(self.open_container()?.inner_document_path())
    }

    pub(crate) fn entry_path(&self, entry: &str) -> Result<PathBuf> {
        let ws = self.open_container()?.workspace.path();
        Ok(ws.join(paths::entry_relative_path(entry)?))
    }

    fn new_workspace(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("projpack-");
        let dir = match &self.scratch_root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        match &self.time_provider {
            Some(provider) => provider.now(),
            None => Utc::now(),
        }
    }
}

impl Drop for ContainerManager {
    fn drop(&mut self) {
        self.close();
    }
}
