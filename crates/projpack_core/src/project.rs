//! Application-facing handle that ties the lock, the container and the
//! collaboration sidecar together for one open project file.

use crate::collab::{CollabStore, NotesSaveOutcome};
use crate::config::Config;
use crate::container::ContainerManager;
use crate::error::{PackError, Result};
use crate::lock::{HolderIdentity, LockManager};
use crate::paths::entries;
use crate::types::{CollaborationRecord, ContainerMetadata, LockRecord};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// How a project was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenMode {
    /// This process holds the exclusive lock.
    ReadWrite,
    /// Someone else holds the lock; saving the container is refused.
    ReadOnly {
        /// The current lock holder.
        holder: LockRecord,
    },
}

/// An open project file.
///
/// Dropping the handle releases the lock and removes the scratch workspace.
pub struct Project {
    path: PathBuf,
    mode: OpenMode,
    locks: LockManager,
    collab: CollabStore,
    container: ContainerManager,
    note_attempts: u32,
    closed: bool,
}

impl Project {
    /// Opens `path` for `identity` using managers built from `config`.
    pub fn open(path: &Path, identity: HolderIdentity, config: &Config) -> Result<Self> {
        Self::open_with(
            path,
            LockManager::with_config(identity, &config.lock),
            CollabStore::with_config(config.collab.clone()),
            ContainerManager::with_config(&config.workspace),
            config.collab.max_retries + 1,
        )
    }

    /// Opens `path` with preconfigured managers.
    ///
    /// Acquires the lock, falling back to read-only when another holder has
    /// it, then extracts the container and imports embedded collaboration
    /// data into an empty sidecar. `note_attempts` bounds the
    /// reload-merge-retry cycle of [`Project::save_notes`].
    pub fn open_with(
        path: &Path,
        locks: LockManager,
        collab: CollabStore,
        mut container: ContainerManager,
        note_attempts: u32,
    ) -> Result<Self> {
        if !path.is_file() {
            return Err(PackError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let mode = match locks.try_acquire(path, None) {
            None => OpenMode::ReadWrite,
            Some(holder) => {
                info!(
                    path = %path.display(),
                    holder = %holder.locked_by,
                    machine = %holder.machine_name,
                    "Project is locked, opening read-only"
                );
                OpenMode::ReadOnly { holder }
            }
        };

        let opened = match mode {
            OpenMode::ReadWrite => container.open_for_edit(path),
            OpenMode::ReadOnly { .. } => container.open(path),
        };
        if let Err(e) = opened {
            if mode == OpenMode::ReadWrite {
                if let Err(release_err) = locks.release(path) {
                    warn!(path = %path.display(), error = %release_err, "Failed to release lock");
                }
            }
            return Err(e);
        }

        let mut project = Self {
            path: path.to_path_buf(),
            mode,
            locks,
            collab,
            container,
            note_attempts: note_attempts.max(1),
            closed: false,
        };
        project.import_embedded_notes();
        Ok(project)
    }

    fn import_embedded_notes(&mut self) {
        let embedded = match self.container.read_binary_entry(entries::STICKY_NOTES) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => return,
        };
        if let Err(e) = self.collab.export_from_archive_snapshot(&self.path, &embedded) {
            warn!(path = %self.path.display(), error = %e, "Failed to import embedded notes");
        }
    }

    /// Container path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How the project was opened.
    pub fn mode(&self) -> &OpenMode {
        &self.mode
    }

    /// Returns true if another holder had the lock at open time.
    pub fn is_read_only(&self) -> bool {
        matches!(self.mode, OpenMode::ReadOnly { .. })
    }

    /// Container metadata.
    pub fn metadata(&self) -> Option<&ContainerMetadata> {
        self.container.metadata()
    }

    /// The underlying container.
    pub fn container(&self) -> &ContainerManager {
        &self.container
    }

    /// The underlying container, for entry edits before a save.
    pub fn container_mut(&mut self) -> &mut ContainerManager {
        &mut self.container
    }

    /// Refreshes the lock heartbeat. `Ok(false)` when read-only or when the
    /// lock is no longer ours.
    pub fn heartbeat(&self) -> Result<bool> {
        if self.is_read_only() {
            return Ok(false);
        }
        self.locks.heartbeat(&self.path)
    }

    /// Embeds the collaboration sidecar into the archive and saves.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` when opened read-only or when the lock was lost
    /// to another holder since opening.
    pub fn save(&mut self, updated_by: &str) -> Result<()> {
        self.ensure_writable()?;

        let snapshot = self.collab.to_archive_snapshot(&self.path)?;
        self.container
            .add_binary_entry(entries::STICKY_NOTES, snapshot.as_bytes())?;
        self.container.save(updated_by)?;

        if let Err(e) = self.locks.heartbeat(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Heartbeat after save failed");
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if let OpenMode::ReadOnly { holder } = &self.mode {
            return Err(PackError::ReadOnly {
                holder: holder.locked_by.clone(),
            });
        }
        if !self.locks.is_locked_by_me(&self.path) {
            let holder = self
                .locks
                .current_lock(&self.path)
                .map(|r| r.locked_by)
                .unwrap_or_else(|| LockRecord::UNKNOWN_HOLDER.to_string());
            warn!(path = %self.path.display(), holder = %holder, "Lock lost since open");
            return Err(PackError::ReadOnly { holder });
        }
        Ok(())
    }

    /// Current collaboration record. Also resets the conflict watermark.
    pub fn notes(&mut self) -> CollaborationRecord {
        self.collab.load(&self.path)
    }

    /// Returns true if another writer changed the notes since the last read.
    pub fn notes_changed(&self) -> bool {
        self.collab.has_changes(&self.path)
    }

    /// Applies `edit` to the latest notes and saves them.
    ///
    /// On conflict the sidecar is reloaded and `edit` is applied again, up
    /// to the configured number of attempts. Works in read-only mode too.
    pub fn save_notes<F>(&mut self, edit: F) -> Result<NotesSaveOutcome>
    where
        F: FnMut(&mut CollaborationRecord),
    {
        self.collab.apply_edit(&self.path, self.note_attempts, edit)
    }

    /// Releases the lock (when held) and removes the scratch workspace.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if !self.is_read_only() {
            match self.locks.release(&self.path) {
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Failed to release lock, it will go stale")
                }
            }
        }
        self.container.close();
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        self.shutdown();
    }
}
