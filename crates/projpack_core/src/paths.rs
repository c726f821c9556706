//! Product codes, fixed archive entry names and the sidecar file family.
//!
//! A container at path `P` comes with two sidecars, `P.lock` and
//! `P.collab.json`, and uses `P.tmp` while being repacked.

use crate::error::{PackError, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// Fixed in-archive entry paths.
pub mod entries {
    /// Content-type descriptor at the archive root.
    pub const CONTENT_TYPES: &str = "[Content_Types].xml";
    /// Container metadata.
    pub const METADATA: &str = "metadata.json";
    /// Archive snapshot of the collaboration sidecar.
    pub const STICKY_NOTES: &str = "sticky_notes.json";
    /// Opaque assistant conversation log.
    pub const AI_CHAT_HISTORY: &str = "ai_chat_history.json";
    /// History index.
    pub const HISTORY_INDEX: &str = "history/index.json";
    /// Directory holding history snapshots.
    pub const HISTORY_SNAPSHOTS: &str = "history/snapshots";
    /// References index.
    pub const REFERENCES_INDEX: &str = "references/index.json";
    /// Directory holding referenced files.
    pub const REFERENCES_FILES: &str = "references/files";
    /// Scripts index.
    pub const SCRIPTS_INDEX: &str = "scripts/index.json";
    /// Directory holding script bodies.
    pub const SCRIPTS_FILES: &str = "scripts/files";

    /// Directories created in every new workspace.
    pub const WORKSPACE_DIRS: [&str; 3] = [HISTORY_SNAPSHOTS, REFERENCES_FILES, SCRIPTS_FILES];
}

/// Container schema version written into metadata.
pub const SCHEMA_VERSION: &str = "1.0";

/// Registered products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Product {
    /// Spreadsheet workbooks.
    #[serde(rename = "XLPJ")]
    Spreadsheet,
    /// Slide decks.
    #[serde(rename = "PPPJ")]
    Presentation,
    /// Word-processing documents.
    #[serde(rename = "DCPJ")]
    WordDocument,
}

impl Product {
    /// All registered products.
    pub const ALL: [Product; 3] = [
        Product::Spreadsheet,
        Product::Presentation,
        Product::WordDocument,
    ];

    /// Resolves a product code (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `UnknownProductCode` if the code is not registered.
    pub fn from_code(code: &str) -> Result<Self> {
        let wanted = code.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.code().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| PackError::UnknownProductCode(code.to_string()))
    }

    /// Resolves the product whose container extension matches `path`.
    pub fn from_container_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|p| p.container_extension().eq_ignore_ascii_case(ext))
    }

    /// The four-letter product code.
    pub fn code(self) -> &'static str {
        match self {
            Product::Spreadsheet => "XLPJ",
            Product::Presentation => "PPPJ",
            Product::WordDocument => "DCPJ",
        }
    }

    /// Entry name of the inner document inside the archive.
    pub fn inner_document_name(self) -> &'static str {
        match self {
            Product::Spreadsheet => "document.xlsx",
            Product::Presentation => "document.pptx",
            Product::WordDocument => "document.docx",
        }
    }

    /// File extension of the container, without the dot.
    pub fn container_extension(self) -> &'static str {
        match self {
            Product::Spreadsheet => "xlpj",
            Product::Presentation => "pppj",
            Product::WordDocument => "dcpj",
        }
    }

    /// Source document extensions that can be imported, without the dot.
    pub fn source_extensions(self) -> &'static [&'static str] {
        match self {
            Product::Spreadsheet => &["xlsx", "xlsm"],
            Product::Presentation => &["pptx", "pptm"],
            Product::WordDocument => &["docx", "docm"],
        }
    }

    /// Extension of the inner document, without the dot.
    pub fn inner_document_extension(self) -> &'static str {
        self.inner_document_name()
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .unwrap_or_default()
    }

    /// Returns true if `path` has one of the importable extensions.
    pub fn accepts_source(self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.source_extensions()
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// MIME type of the inner document.
    pub fn inner_content_type(self) -> &'static str {
        match self {
            Product::Spreadsheet => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            Product::Presentation => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            Product::WordDocument => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Product {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_code(s)
    }
}

/// Appends `suffix` to the full file name of `path` (`a.xlpj` -> `a.xlpj.lock`).
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Path of the lock sidecar for a container.
pub fn lock_path(container: &Path) -> PathBuf {
    with_suffix(container, ".lock")
}

/// Path of the collaboration sidecar for a container.
pub fn collab_path(container: &Path) -> PathBuf {
    with_suffix(container, ".collab.json")
}

/// Path used while repacking a container.
pub fn temp_path(container: &Path) -> PathBuf {
    with_suffix(container, ".tmp")
}

/// Validates a workspace-relative entry path and converts it to a relative
/// filesystem path.
///
/// # Errors
///
/// Returns `InvalidEntryPath` for empty, absolute or parent-escaping paths.
pub fn entry_relative_path(entry: &str) -> Result<PathBuf> {
    let trimmed = entry.trim_start_matches("./");
    if trimmed.is_empty() || trimmed.starts_with('/') || trimmed.starts_with('\\') {
        return Err(PackError::InvalidEntryPath(entry.to_string()));
    }

    let mut rel = PathBuf::new();
    for part in trimmed.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => return Err(PackError::InvalidEntryPath(entry.to_string())),
            p if p.contains(':') => return Err(PackError::InvalidEntryPath(entry.to_string())),
            p => rel.push(p),
        }
    }

    if rel.as_os_str().is_empty() {
        return Err(PackError::InvalidEntryPath(entry.to_string()));
    }
    Ok(rel)
}
