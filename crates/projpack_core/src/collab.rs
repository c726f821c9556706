//! Collaboration sidecar (`P.collab.json`) with optimistic concurrency.
//!
//! Any process may read and write shared annotations at any time, with or
//! without the exclusive lock. Each load remembers a read watermark; a save
//! only goes through if the file on disk still matches that watermark,
//! otherwise the caller must reload, merge its pending edits and retry.

use crate::atomic;
use crate::config::CollabConfig;
use crate::error::{is_transient_io, PackError, Result};
use crate::paths;
use crate::types::CollaborationRecord;
use crate::TimeProvider;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// State of the sidecar file observed at the last read or write.
///
/// The modification time is the primary signal. Length and a content
/// digest catch writes that land within the filesystem's timestamp
/// granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Watermark {
    modified: Option<SystemTime>,
    len: u64,
    digest: [u8; 32],
}

impl Watermark {
    fn from_bytes(modified: Option<SystemTime>, bytes: &[u8]) -> Self {
        Self {
            modified,
            len: bytes.len() as u64,
            digest: Sha256::digest(bytes).into(),
        }
    }
}

/// File access used by the collaboration store.
///
/// The default goes straight to the filesystem. Set a custom one with
/// `CollabStore::with_io` to route sidecar traffic elsewhere or to simulate
/// a flaky share.
pub trait SidecarIo: Send + Sync {
    /// Reads the whole file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replaces the file, never exposing partial content to readers.
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
}

impl<T: SidecarIo + ?Sized> SidecarIo for Arc<T> {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        (**self).read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        (**self).write(path, bytes)
    }
}

struct FileSystemIo;

impl SidecarIo for FileSystemIo {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        atomic::write_atomic(path, &atomic::sibling_temp_path(path), bytes)
    }
}

fn parse_record(path: &Path, bytes: &[u8]) -> CollaborationRecord {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return CollaborationRecord::default();
    }
    match serde_json::from_slice(bytes) {
        Ok(record) => record,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Collaboration sidecar is corrupt, using empty record");
            CollaborationRecord::default()
        }
    }
}

/// Result of [`CollabStore::apply_edit`].
#[derive(Debug, Clone, PartialEq)]
pub enum NotesSaveOutcome {
    /// The edit was written. Holds the record as saved.
    Saved(CollaborationRecord),
    /// Every attempt conflicted with another writer. Holds the record with
    /// the pending edit applied so it is not lost.
    Unsaved(CollaborationRecord),
}

/// Reads and writes collaboration sidecars for one process.
///
/// Watermarks are tracked per sidecar path, so one store can serve several
/// open containers.
pub struct CollabStore {
    config: CollabConfig,
    watermarks: HashMap<PathBuf, Option<Watermark>>,
    time_provider: Option<Arc<dyn TimeProvider>>,
    io: Arc<dyn SidecarIo>,
}

impl Default for CollabStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CollabStore {
    /// Creates a store with the default retry policy.
    pub fn new() -> Self {
        Self::with_config(CollabConfig::default())
    }

    /// Creates a store with a custom retry policy.
    pub fn with_config(config: CollabConfig) -> Self {
        Self {
            config,
            watermarks: HashMap::new(),
            time_provider: None,
            io: Arc::new(FileSystemIo),
        }
    }

    /// Sets a custom time provider for testing.
    pub fn with_time_provider(mut self, provider: impl TimeProvider + 'static) -> Self {
        self.time_provider = Some(Arc::new(provider));
        self
    }

    /// Sets the file access used for the sidecar.
    pub fn with_io(mut self, io: impl SidecarIo + 'static) -> Self {
        self.io = Arc::new(io);
        self
    }

    /// Loads the collaboration record for `container`.
    ///
    /// Never fails: an absent sidecar yields an empty record, and a corrupt
    /// or unreadable one yields an empty record with a warning. The on-disk
    /// state is remembered as the read watermark for the next `save`.
    pub fn load(&mut self, container: &Path) -> CollaborationRecord {
        let path = paths::collab_path(container);
        match self.read_sidecar(&path) {
            Ok(Some((bytes, mark))) => {
                self.watermarks.insert(path.clone(), Some(mark));
                parse_record(&path, &bytes)
            }
            Ok(None) => {
                self.watermarks.insert(path, None);
                CollaborationRecord::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read collaboration sidecar");
                self.watermarks.remove(&path);
                CollaborationRecord::default()
            }
        }
    }

    /// Re-reads the latest state after a conflict.
    pub fn reload(&mut self, container: &Path) -> CollaborationRecord {
        debug!(container = %container.display(), "Reloading collaboration sidecar");
        self.load(container)
    }

    /// Saves `record` unless the sidecar changed since the last load.
    ///
    /// Stamps `updated_at` first. Returns `Ok(false)` on conflict without
    /// writing. Transient failures while checking or writing the sidecar
    /// are retried with exponential backoff; `TransientIo` is returned once
    /// the retries are spent.
    pub fn save(&mut self, container: &Path, record: &mut CollaborationRecord) -> Result<bool> {
        let path = paths::collab_path(container);
        record.updated_at = Some(self.now());
        let bytes = serde_json::to_vec_pretty(record)?;
        let remembered = self.watermarks.get(&path).copied().flatten();

        let written = self.with_retry(&path, |store: &Self| {
            store.check_and_write(&path, remembered, &bytes)
        })?;
        if !written {
            info!(path = %path.display(), "Collaboration sidecar changed since last read, save rejected");
            return Ok(false);
        }

        let modified = fs::metadata(&path).ok().and_then(|m| m.modified().ok());
        self.watermarks
            .insert(path.clone(), Some(Watermark::from_bytes(modified, &bytes)));
        debug!(path = %path.display(), notes = record.sticky_notes.len(), "Saved collaboration sidecar");
        Ok(true)
    }

    /// Applies `edit` to the latest record and saves it.
    ///
    /// On conflict the sidecar is reloaded and `edit` is applied again, up
    /// to `attempts` saves in total. Needs no lock.
    pub fn apply_edit<F>(
        &mut self,
        container: &Path,
        attempts: u32,
        mut edit: F,
    ) -> Result<NotesSaveOutcome>
    where
        F: FnMut(&mut CollaborationRecord),
    {
        let attempts = attempts.max(1);
        let mut record = self.load(container);
        edit(&mut record);

        for attempt in 1..=attempts {
            if self.save(container, &mut record)? {
                return Ok(NotesSaveOutcome::Saved(record));
            }
            info!(attempt, "Notes changed concurrently, merging and retrying");
            if attempt < attempts {
                record = self.reload(container);
                edit(&mut record);
            }
        }

        warn!(container = %container.display(), "Notes could not be saved, keeping edit locally");
        Ok(NotesSaveOutcome::Unsaved(record))
    }

    /// Returns true if the sidecar changed since the last load or save.
    pub fn has_changes(&self, container: &Path) -> bool {
        let path = paths::collab_path(container);
        let remembered = self.watermarks.get(&path).copied().flatten();
        match self.read_sidecar(&path) {
            Ok(current) => current.map(|(_, mark)| mark) != remembered,
            Err(_) => false,
        }
    }

    /// Imports collaboration data embedded in an archive.
    ///
    /// Only applies while the sidecar is still empty, so notes deleted
    /// through the sidecar are not resurrected from an older archive. Data
    /// is merged, never overwritten. Returns the number of notes imported.
    /// Corrupt embedded JSON imports nothing.
    pub fn export_from_archive_snapshot(&mut self, container: &Path, embedded: &str) -> Result<usize> {
        let snapshot: CollaborationRecord = match serde_json::from_str(embedded) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Embedded collaboration snapshot is corrupt, skipping import");
                return Ok(0);
            }
        };
        if snapshot.is_empty() {
            return Ok(0);
        }

        let mut record = self.load(container);
        if !record.is_empty() {
            debug!("Collaboration sidecar already populated, skipping import");
            return Ok(0);
        }

        let added = record.merge_missing(snapshot);
        if !self.save(container, &mut record)? {
            warn!("Collaboration sidecar written concurrently, skipping import");
            return Ok(0);
        }
        info!(notes = added, "Imported embedded collaboration data");
        Ok(added)
    }

    /// Serializes the current sidecar content for embedding in the archive.
    ///
    /// Does not move the read watermark.
    pub fn to_archive_snapshot(&self, container: &Path) -> Result<String> {
        let path = paths::collab_path(container);
        let record = match self.read_sidecar(&path) {
            Ok(Some((bytes, _))) => parse_record(&path, &bytes),
            Ok(None) => CollaborationRecord::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read collaboration sidecar for snapshot");
                CollaborationRecord::default()
            }
        };
        Ok(serde_json::to_string_pretty(&record)?)
    }

    /// Reads the sidecar and its watermark; `None` when the file is absent.
    fn read_sidecar(&self, path: &Path) -> io::Result<Option<(Vec<u8>, Watermark)>> {
        let bytes = match self.io.read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let modified = fs::metadata(path).ok().and_then(|m| m.modified().ok());
        let mark = Watermark::from_bytes(modified, &bytes);
        Ok(Some((bytes, mark)))
    }

    /// Writes `bytes` if the sidecar still matches `remembered`.
    fn check_and_write(
        &self,
        path: &Path,
        remembered: Option<Watermark>,
        bytes: &[u8],
    ) -> io::Result<bool> {
        let current = self.read_sidecar(path)?.map(|(_, mark)| mark);
        if current != remembered {
            return Ok(false);
        }
        self.io.write(path, bytes)?;
        Ok(true)
    }

    fn with_retry<T>(
        &self,
        path: &Path,
        mut op: impl FnMut(&Self) -> io::Result<T>,
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            match op(self) {
                Ok(value) => return Ok(value),
                Err(e) if is_transient_io(&e) => {
                    if attempt >= self.config.max_retries {
                        return Err(PackError::TransientIo {
                            path: path.to_path_buf(),
                            attempts: attempt + 1,
                            source: e,
                        });
                    }
                    let delay = self.config.backoff(attempt);
                    warn!(
                        path = %path.display(),
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Transient failure on collaboration sidecar"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn now(&self) -> DateTime<Utc> {
        match &self.time_provider {
            Some(provider) => provider.now(),
            None => Utc::now(),
        }
    }
}
