//! Projpack Core Library
//!
//! Single-file project containers that bundle an office document with its
//! metadata, version history, references, scripts and collaboration data:
//! - Zip-backed archive with atomic repack
//! - Advisory exclusive lock sidecar with heartbeat and staleness detection
//! - Collaboration sidecar with optimistic concurrency
//!
//! # Quick Start
//!
//! ```
//! use projpack_core::{ContainerManager, Product};
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! let source = tmp.path().join("budget.xlsx");
//! std::fs::write(&source, b"workbook bytes").unwrap();
//! let container = tmp.path().join("budget.xlpj");
//!
//! let mut manager = ContainerManager::new();
//! let meta = manager
//!     .create_from_source(&source, &container, Product::Spreadsheet, "alice", "1.0.0")
//!     .unwrap();
//! assert_eq!(meta.title, "budget");
//! assert!(projpack_core::is_valid_container(&container));
//! ```
//!
//! # Locking
//!
//! Only one process edits a container at a time. Others get the holder's
//! record back and can fall back to read-only:
//!
//! ```
//! use projpack_core::{HolderIdentity, LockManager};
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! let container = tmp.path().join("plan.xlpj");
//!
//! let alice = LockManager::new(HolderIdentity::new("alice", "ws-1", 100));
//! let bob = LockManager::new(HolderIdentity::new("bob", "ws-2", 200));
//!
//! assert!(alice.try_acquire(&container, None).is_none());
//! let holder = bob.try_acquire(&container, None).unwrap();
//! assert_eq!(holder.locked_by, "alice");
//! ```
//!
//! # Collaboration
//!
//! Sticky notes live next to the container and can be written by anyone,
//! lock or no lock. A save that raced with another writer returns `false`:
//!
//! ```
//! use projpack_core::{CollabStore, NotePosition, StickyNote};
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! let container = tmp.path().join("plan.xlpj");
//!
//! let mut store = CollabStore::new();
//! let mut record = store.load(&container);
//! record.upsert_note(StickyNote::new("alice", "check Q3", NotePosition::default(), chrono::Utc::now()));
//! assert!(store.save(&container, &mut record).unwrap());
//! ```

mod archive;
mod atomic;
mod attachments;
mod collab;
mod config;
mod container;
mod error;
mod lock;
mod paths;
mod project;
mod types;

pub use archive::is_valid_container;
pub use collab::{CollabStore, NotesSaveOutcome, SidecarIo};
pub use config::{CollabConfig, Config, LockConfig, WorkspaceConfig, CONFIG_FILE_NAME};
pub use container::ContainerManager;
pub use error::{PackError, Result};
pub use lock::{is_process_alive, machine_name, HolderIdentity, LockManager};
pub use paths::{
    collab_path, entries, entry_relative_path, lock_path, temp_path, Product, SCHEMA_VERSION,
};
pub use project::{OpenMode, Project};
pub use types::*;

use chrono::{DateTime, Utc};

/// Time provider trait for testing.
///
/// Allows injecting controlled time into the lock manager and stores so
/// staleness and timestamps can be tested without waiting.
/// Only used when explicitly set via `with_time_provider()`.
pub trait TimeProvider: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

impl<F> TimeProvider for F
where
    F: Fn() -> DateTime<Utc> + Send + Sync,
{
    fn now(&self) -> DateTime<Utc> {
        self()
    }
}
