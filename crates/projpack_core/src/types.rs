//! Records persisted inside the archive and in its sidecar files.
//!
//! All JSON uses camelCase field names so that files written by other
//! clients of the format round-trip unchanged.

use crate::paths::{Product, SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Container metadata stored as `metadata.json` inside the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerMetadata {
    /// Format schema version.
    pub schema_version: String,
    /// Product that owns the inner document.
    pub product_code: Product,
    /// Version of the application that created the container.
    pub app_version: String,
    /// Build identifier of the creating application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_build: Option<String>,
    /// Document title.
    #[serde(default)]
    pub title: String,
    /// Document description.
    #[serde(default)]
    pub description: String,
    /// Creating author.
    #[serde(default)]
    pub author: String,
    /// Creating author's email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    /// When the container was created.
    pub created_at: DateTime<Utc>,
    /// When the container was last saved.
    pub updated_at: DateTime<Utc>,
    /// Who saved the container last.
    #[serde(default)]
    pub last_modified_by: String,
    /// File name of the document the container was created from.
    #[serde(default)]
    pub original_file_name: String,
    /// Hex SHA-256 of the inner document at the last successful save.
    #[serde(default)]
    pub document_hash: String,
    /// Number of history snapshots.
    #[serde(default)]
    pub history_count: usize,
    /// Number of attached references.
    #[serde(default)]
    pub reference_count: usize,
    /// Number of stored scripts.
    #[serde(default)]
    pub script_count: usize,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-form custom properties.
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
}

impl ContainerMetadata {
    /// Creates metadata for a freshly built container.
    pub fn new(
        product: Product,
        author: &str,
        app_version: &str,
        original_file_name: &str,
        document_hash: String,
        now: DateTime<Utc>,
    ) -> Self {
        let title = original_file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(original_file_name)
            .to_string();

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            product_code: product,
            app_version: app_version.to_string(),
            app_build: None,
            title,
            description: String::new(),
            author: author.to_string(),
            author_email: None,
            created_at: now,
            updated_at: now,
            last_modified_by: author.to_string(),
            original_file_name: original_file_name.to_string(),
            document_hash,
            history_count: 0,
            reference_count: 0,
            script_count: 0,
            tags: Vec::new(),
            custom_properties: BTreeMap::new(),
        }
    }
}

/// One history snapshot of the inner document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Snapshot id.
    pub id: String,
    /// Entry path of the snapshot file.
    pub file: String,
    /// Who took the snapshot.
    pub author: String,
    /// Free-form comment.
    #[serde(default)]
    pub comment: String,
    /// Hex SHA-256 of the snapshot bytes.
    pub document_hash: String,
    /// Snapshot size in bytes.
    pub size: u64,
    /// When the snapshot was taken.
    pub created_at: DateTime<Utc>,
}

/// A file attached to the container as reference material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceEntry {
    /// Reference id.
    pub id: String,
    /// Original file name.
    pub name: String,
    /// Entry path of the stored copy.
    pub file: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Size in bytes.
    pub size: u64,
    /// When the reference was attached.
    pub added_at: DateTime<Utc>,
}

/// A script stored alongside the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptEntry {
    /// Script id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Script language (e.g. "python").
    pub language: String,
    /// Entry path of the script body.
    pub file: String,
    /// When the script was created.
    pub created_at: DateTime<Utc>,
    /// When the script body was last written.
    pub updated_at: DateTime<Utc>,
}

/// Index file listing entries of one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryIndex<T> {
    /// Indexed entries, oldest first.
    #[serde(default = "Vec::new")]
    pub entries: Vec<T>,
}

impl<T> Default for EntryIndex<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

/// Index stored at `history/index.json`.
pub type HistoryIndex = EntryIndex<HistoryEntry>;
/// Index stored at `references/index.json`.
pub type ReferenceIndex = EntryIndex<ReferenceEntry>;
/// Index stored at `scripts/index.json`.
pub type ScriptIndex = EntryIndex<ScriptEntry>;

/// Contents of the lock sidecar (`P.lock`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    /// Display name of the holder.
    pub locked_by: String,
    /// Machine the holder runs on.
    pub machine_name: String,
    /// Holder process id.
    pub process_id: u32,
    /// When the lock was acquired.
    pub locked_at: DateTime<Utc>,
    /// Last heartbeat.
    pub heartbeat: DateTime<Utc>,
    /// Application that holds the lock.
    pub application: String,
}

impl LockRecord {
    /// Holder name used when the lock state could not be determined.
    pub const UNKNOWN_HOLDER: &'static str = "(unknown)";

    /// Synthetic record returned when the lock file could not be written.
    pub fn unknown(now: DateTime<Utc>) -> Self {
        Self {
            locked_by: Self::UNKNOWN_HOLDER.to_string(),
            machine_name: Self::UNKNOWN_HOLDER.to_string(),
            process_id: 0,
            locked_at: now,
            heartbeat: now,
            application: Self::UNKNOWN_HOLDER.to_string(),
        }
    }

    /// Returns true for the synthetic record produced by [`LockRecord::unknown`].
    pub fn is_unknown(&self) -> bool {
        self.locked_by == Self::UNKNOWN_HOLDER && self.process_id == 0
    }
}

/// Position and size of a sticky note on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NotePosition {
    /// Horizontal offset.
    pub x: f64,
    /// Vertical offset.
    pub y: f64,
    /// Width, if resized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Height, if resized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

/// A shared sticky note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickyNote {
    /// Note id.
    pub id: String,
    /// Author display name.
    pub author: String,
    /// Note text.
    #[serde(default)]
    pub text: String,
    /// Where the note sits.
    #[serde(default)]
    pub position: NotePosition,
    /// Optional color name or hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// When the note was created.
    pub created_at: DateTime<Utc>,
    /// When the note was last edited.
    pub updated_at: DateTime<Utc>,
}

impl StickyNote {
    /// Creates a note with a fresh id.
    pub fn new(author: &str, text: &str, position: NotePosition, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            author: author.to_string(),
            text: text.to_string(),
            position,
            color: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Contents of the collaboration sidecar (`P.collab.json`).
///
/// Fields written by other clients are kept in `extra` and written back.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationRecord {
    /// Shared sticky notes.
    #[serde(default)]
    pub sticky_notes: Vec<StickyNote>,
    /// Stamped on every successful save.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Unrecognized shared entities.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CollaborationRecord {
    /// Returns true when the record holds no shared data.
    pub fn is_empty(&self) -> bool {
        self.sticky_notes.is_empty() && self.extra.is_empty()
    }

    /// Looks up a note by id.
    pub fn note(&self, id: &str) -> Option<&StickyNote> {
        self.sticky_notes.iter().find(|n| n.id == id)
    }

    /// Inserts or replaces a note by id.
    pub fn upsert_note(&mut self, note: StickyNote) {
        match self.sticky_notes.iter_mut().find(|n| n.id == note.id) {
            Some(existing) => *existing = note,
            None => self.sticky_notes.push(note),
        }
    }

    /// Removes a note by id, returning it.
    pub fn remove_note(&mut self, id: &str) -> Option<StickyNote> {
        let pos = self.sticky_notes.iter().position(|n| n.id == id)?;
        Some(self.sticky_notes.remove(pos))
    }

    /// Merges `other` into `self` without overwriting.
    ///
    /// Notes and extra keys already present in `self` win; missing ones are
    /// added. Returns the number of notes added.
    pub fn merge_missing(&mut self, other: CollaborationRecord) -> usize {
        let mut added = 0;
        for note in other.sticky_notes {
            if self.note(&note.id).is_none() {
                self.sticky_notes.push(note);
                added += 1;
            }
        }
        for (key, value) in other.extra {
            self.extra.entry(key).or_insert(value);
        }
        added
    }
}
