//! History snapshots, attached references and scripts stored in the
//! workspace of an open container.

use crate::container::ContainerManager;
use crate::error::{PackError, Result};
use crate::paths::entries;
use crate::types::{
    HistoryEntry, HistoryIndex, ReferenceEntry, ReferenceIndex, ScriptEntry, ScriptIndex,
};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// Keeps a file name usable as a single archive path component.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "file".to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn script_extension(language: &str) -> &'static str {
    match language.to_ascii_lowercase().as_str() {
        "python" | "py" => "py",
        "javascript" | "js" => "js",
        "typescript" | "ts" => "ts",
        "lua" => "lua",
        "vba" | "vb" | "basic" => "bas",
        "powershell" | "ps1" => "ps1",
        "sql" => "sql",
        "r" => "r",
        _ => "txt",
    }
}

impl ContainerManager {
    /// Copies the current inner document into `history/snapshots/`.
    pub fn add_history_snapshot(&mut self, author: &str, comment: &str) -> Result<HistoryEntry> {
        let product = self.product()?;
        let inner = self.inner_document_path()?;
        let bytes = fs::read(&inner).map_err(|_| PackError::NotFound { path: inner })?;

        let id = new_id();
        let file = format!(
            "{}/{}.{}",
            entries::HISTORY_SNAPSHOTS,
            id,
            product.inner_document_extension()
        );
        self.add_binary_entry(&file, &bytes)?;

        let entry = HistoryEntry {
            id,
            file,
            author: author.to_string(),
            comment: comment.to_string(),
            document_hash: hex::encode(Sha256::digest(&bytes)),
            size: bytes.len() as u64,
            created_at: self.now(),
        };
        let mut index: HistoryIndex = self.read_entry(entries::HISTORY_INDEX)?.unwrap_or_default();
        index.entries.push(entry.clone());
        self.write_entry(entries::HISTORY_INDEX, &index)?;
        self.metadata_mut()?.history_count = index.entries.len();

        info!(id = %entry.id, size = entry.size, "Added history snapshot");
        Ok(entry)
    }

    /// History snapshots, oldest first.
    pub fn list_history(&self) -> Result<Vec<HistoryEntry>> {
        let index: HistoryIndex = self.read_entry(entries::HISTORY_INDEX)?.unwrap_or_default();
        Ok(index.entries)
    }

    /// Copies a history snapshot back over the inner document.
    pub fn restore_history_snapshot(&mut self, id: &str) -> Result<HistoryEntry> {
        let entry = self
            .list_history()?
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| PackError::NotFound {
                path: PathBuf::from(entries::HISTORY_SNAPSHOTS).join(id),
            })?;
        let bytes = self.read_binary_entry(&entry.file)?;
        fs::write(self.inner_document_path()?, bytes)?;
        info!(id, "Restored history snapshot");
        Ok(entry)
    }

    /// Copies `source` into `references/files/` and records it.
    pub fn add_reference(&mut self, source: &Path, description: &str) -> Result<ReferenceEntry> {
        let bytes = fs::read(source).map_err(|_| PackError::NotFound {
            path: source.to_path_buf(),
        })?;
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let id = new_id();
        let file = format!(
            "{}/{}_{}",
            entries::REFERENCES_FILES,
            id,
            sanitize_file_name(&name)
        );
        self.add_binary_entry(&file, &bytes)?;

        let entry = ReferenceEntry {
            id,
            name,
            file,
            description: description.to_string(),
            size: bytes.len() as u64,
            added_at: self.now(),
        };
        let mut index: ReferenceIndex = self
            .read_entry(entries::REFERENCES_INDEX)?
            .unwrap_or_default();
        index.entries.push(entry.clone());
        self.write_entry(entries::REFERENCES_INDEX, &index)?;
        self.metadata_mut()?.reference_count = index.entries.len();

        info!(id = %entry.id, name = %entry.name, "Added reference");
        Ok(entry)
    }

    /// Attached references, oldest first.
    pub fn list_references(&self) -> Result<Vec<ReferenceEntry>> {
        let index: ReferenceIndex = self
            .read_entry(entries::REFERENCES_INDEX)?
            .unwrap_or_default();
        Ok(index.entries)
    }

    /// Removes a reference and its stored copy. Returns false if unknown.
    pub fn remove_reference(&mut self, id: &str) -> Result<bool> {
        let mut index: ReferenceIndex = self
            .read_entry(entries::REFERENCES_INDEX)?
            .unwrap_or_default();
        let Some(pos) = index.entries.iter().position(|e| e.id == id) else {
            return Ok(false);
        };
        let entry = index.entries.remove(pos);
        self.remove_entry(&entry.file)?;
        self.write_entry(entries::REFERENCES_INDEX, &index)?;
        self.metadata_mut()?.reference_count = index.entries.len();
        Ok(true)
    }

    /// Stores a script body under `scripts/files/` and indexes it.
    pub fn add_script(&mut self, name: &str, language: &str, source: &str) -> Result<ScriptEntry> {
        let id = new_id();
        let file = format!(
            "{}/{}.{}",
            entries::SCRIPTS_FILES,
            id,
            script_extension(language)
        );
        self.add_binary_entry(&file, source.as_bytes())?;

        let now = self.now();
        let entry = ScriptEntry {
            id,
            name: name.to_string(),
            language: language.to_string(),
            file,
            created_at: now,
            updated_at: now,
        };
        let mut index: ScriptIndex = self.read_entry(entries::SCRIPTS_INDEX)?.unwrap_or_default();
        index.entries.push(entry.clone());
        self.write_entry(entries::SCRIPTS_INDEX, &index)?;
        self.metadata_mut()?.script_count = index.entries.len();

        info!(id = %entry.id, name, language, "Added script");
        Ok(entry)
    }

    /// Stored scripts, oldest first.
    pub fn list_scripts(&self) -> Result<Vec<ScriptEntry>> {
        let index: ScriptIndex = self.read_entry(entries::SCRIPTS_INDEX)?.unwrap_or_default();
        Ok(index.entries)
    }

    /// Reads a script body by id.
    pub fn read_script(&self, id: &str) -> Result<String> {
        let entry = self
            .list_scripts()?
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| PackError::NotFound {
                path: PathBuf::from(entries::SCRIPTS_FILES).join(id),
            })?;
        let bytes = self.read_binary_entry(&entry.file)?;
        String::from_utf8(bytes).map_err(|e| PackError::Format {
            path: PathBuf::from(entry.file),
            reason: e.to_string(),
        })
    }
}
