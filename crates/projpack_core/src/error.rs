//! Error types for projpack_core operations.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for projpack_core operations.
///
/// Lock contention and collaboration conflicts are not errors: they are
/// reported as values by the lock manager and the collaboration store.
#[derive(Error, Debug)]
pub enum PackError {
    /// Container, source document or entry does not exist.
    #[error("not found: {}", path.display())]
    NotFound {
        /// Path that was looked up
        path: PathBuf,
    },

    /// The archive or one of its JSON entries failed to parse.
    #[error("format error in {}: {}", path.display(), reason)]
    Format {
        /// Path of the archive or entry that failed to parse
        path: PathBuf,
        /// Description of the parse failure
        reason: String,
    },

    /// A retryable I/O failure persisted after all retry attempts.
    #[error("transient I/O failure on {} after {attempts} attempt(s): {source}", path.display())]
    TransientIo {
        /// File being written
        path: PathBuf,
        /// Number of attempts made
        attempts: u32,
        /// The last underlying error
        #[source]
        source: std::io::Error,
    },

    /// The product code is not registered.
    #[error("unknown product code: {0}")]
    UnknownProductCode(String),

    /// The operation requires an open container.
    #[error("no document loaded")]
    NoDocumentLoaded,

    /// The target of a create already holds data.
    #[error("refusing to overwrite existing file: {}", path.display())]
    AlreadyExists {
        /// The existing file
        path: PathBuf,
    },

    /// The container is open read-only because another holder has the lock.
    #[error("container is locked by {holder}")]
    ReadOnly {
        /// Display name of the lock holder
        holder: String,
    },

    /// An entry path is absolute or escapes the workspace.
    #[error("invalid entry path: {0}")]
    InvalidEntryPath(String),

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive read or write failed.
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PackError {
    /// Returns a user-friendly recovery suggestion for the error, if available.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Format { .. } => Some(
                "The project file is damaged. Restore it from a backup, or export the inner document from a previous copy.",
            ),
            Self::TransientIo { .. } => {
                Some("The file share may be busy or unreachable. Wait a moment and try again.")
            }
            Self::UnknownProductCode(_) => Some("Use one of the registered product codes: XLPJ, PPPJ, DCPJ."),
            Self::NoDocumentLoaded => Some("Open or create a project file first."),
            Self::ReadOnly { .. } => Some(
                "Another user is editing this project. Save a copy elsewhere, or wait until they close it.",
            ),
            Self::AlreadyExists { .. } => {
                Some("Choose a different target path or remove the existing file first.")
            }
            _ => None,
        }
    }

    /// Returns true when the error is worth retrying (sharing violations,
    /// interrupted or timed-out I/O on network paths).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(e) => is_transient_io(e),
            Self::TransientIo { .. } => true,
            _ => false,
        }
    }
}

/// Classifies an I/O error as retryable.
pub(crate) fn is_transient_io(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;

    // ERROR_SHARING_VIOLATION and ERROR_LOCK_VIOLATION on Windows shares
    if matches!(err.raw_os_error(), Some(32) | Some(33)) && cfg!(windows) {
        return true;
    }

    matches!(
        err.kind(),
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
    )
}

/// Convenience Result type for projpack_core operations.
pub type Result<T> = std::result::Result<T, PackError>;
