//! Advisory exclusive editing lock kept in a `P.lock` sidecar.
//!
//! The lock is cooperative: it is created with exclusive-create semantics,
//! refreshed by heartbeats while the holder keeps the container open, and
//! reclaimed by others once it is judged stale. No OS-level file locks are
//! used, so a crashed holder never wedges the container.

use crate::atomic;
use crate::config::LockConfig;
use crate::error::Result;
use crate::paths;
use crate::types::LockRecord;
use crate::TimeProvider;
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attempts made by `try_acquire` before giving up on a contended lock file.
const MAX_ACQUIRE_ATTEMPTS: u32 = 3;

/// Identity of a potential lock holder, supplied by the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderIdentity {
    /// Display name shown to other users.
    pub user: String,
    /// Machine name.
    pub machine: String,
    /// Process id.
    pub pid: u32,
}

impl HolderIdentity {
    /// Creates an identity from explicit parts.
    pub fn new(user: impl Into<String>, machine: impl Into<String>, pid: u32) -> Self {
        Self {
            user: user.into(),
            machine: machine.into(),
            pid,
        }
    }

    /// Identity of the current process on this machine.
    pub fn current(user: impl Into<String>) -> Self {
        Self::new(user, machine_name(), std::process::id())
    }

    /// Returns true if `record` was written by this machine and process.
    pub fn owns(&self, record: &LockRecord) -> bool {
        self.same_machine(record) && record.process_id == self.pid
    }

    fn same_machine(&self, record: &LockRecord) -> bool {
        record.machine_name.eq_ignore_ascii_case(&self.machine)
    }
}

/// Observed state of a lock sidecar.
#[derive(Debug)]
enum LockFileState {
    Missing,
    Malformed,
    Held(LockRecord),
    Unreadable(io::Error),
}

/// Manages lock sidecars on behalf of one holder identity.
pub struct LockManager {
    identity: HolderIdentity,
    stale_after: chrono::Duration,
    application: String,
    time_provider: Option<Arc<dyn TimeProvider>>,
}

impl LockManager {
    /// Creates a lock manager with the default configuration.
    pub fn new(identity: HolderIdentity) -> Self {
        Self::with_config(identity, &LockConfig::default())
    }

    /// Creates a lock manager from configuration.
    pub fn with_config(identity: HolderIdentity, config: &LockConfig) -> Self {
        let stale_after = chrono::Duration::from_std(config.stale_after())
            .unwrap_or_else(|_| chrono::Duration::minutes(30));
        Self {
            identity,
            stale_after,
            application: config.application.clone(),
            time_provider: None,
        }
    }

    /// Sets a custom time provider for testing.
    pub fn with_time_provider(mut self, provider: impl TimeProvider + 'static) -> Self {
        self.time_provider = Some(Arc::new(provider));
        self
    }

    /// Returns the identity this manager acquires locks for.
    pub fn identity(&self) -> &HolderIdentity {
        &self.identity
    }

    /// Tries to take the exclusive lock on `container`.
    ///
    /// Returns `None` when the caller now holds the lock (fresh acquisition,
    /// stale reclaim, or re-entrant open by the same machine and process).
    /// Returns the other holder's record when someone else holds it. When
    /// the lock file cannot be written, a synthetic `(unknown)` record is
    /// returned so the caller can fall back to read-only.
    pub fn try_acquire(&self, container: &Path, application: Option<&str>) -> Option<LockRecord> {
        let path = paths::lock_path(container);
        let application = application.unwrap_or(&self.application);

        for attempt in 0..MAX_ACQUIRE_ATTEMPTS {
            match read_lock_file(&path) {
                LockFileState::Missing => {}
                LockFileState::Malformed => {
                    warn!(path = %path.display(), "Lock file has invalid content, reclaiming");
                    if let Err(e) = atomic::remove_if_exists(&path) {
                        warn!(error = %e, "Failed to remove malformed lock file");
                        return Some(LockRecord::unknown(self.now()));
                    }
                }
                LockFileState::Unreadable(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read lock file");
                    return Some(LockRecord::unknown(self.now()));
                }
                LockFileState::Held(record) => {
                    if !self.is_stale(&record) {
                        if self.identity.owns(&record) {
                            debug!(path = %path.display(), "Re-entrant acquire, refreshing heartbeat");
                            if let Err(e) = self.write_heartbeat(&path, record) {
                                warn!(error = %e, "Failed to refresh heartbeat on re-entrant acquire");
                            }
                            return None;
                        }
                        return Some(record);
                    }

                    warn!(
                        path = %path.display(),
                        holder = %record.locked_by,
                        machine = %record.machine_name,
                        pid = record.process_id,
                        "Detected stale lock, reclaiming"
                    );
                    if let Err(e) = remove_if_unchanged(&path, &record) {
                        warn!(error = %e, "Failed to remove stale lock file");
                        return Some(LockRecord::unknown(self.now()));
                    }
                }
            }

            let now = self.now();
            let record = LockRecord {
                locked_by: self.identity.user.clone(),
                machine_name: self.identity.machine.clone(),
                process_id: self.identity.pid,
                locked_at: now,
                heartbeat: now,
                application: application.to_string(),
            };
            let bytes = match serde_json::to_vec_pretty(&record) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize lock record");
                    return Some(LockRecord::unknown(now));
                }
            };

            match atomic::create_exclusive(&path, &bytes) {
                Ok(()) => {
                    info!(path = %path.display(), user = %record.locked_by, "Acquired lock");
                    return None;
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    // Lost the race, report whoever won
                    debug!(attempt, "Lock file appeared while acquiring");
                    if let LockFileState::Held(winner) = read_lock_file(&path) {
                        if self.identity.owns(&winner) {
                            return None;
                        }
                        return Some(winner);
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to write lock file");
                    return Some(LockRecord::unknown(now));
                }
            }
        }

        Some(LockRecord::unknown(self.now()))
    }

    /// Releases the lock on `container`.
    ///
    /// Only a lock owned by this identity (or an unreadable one) is removed;
    /// a live lock held by someone else is left alone. Returns whether a file
    /// was removed. Failures are non-fatal for callers: an orphaned lock is
    /// reclaimed later through staleness detection.
    pub fn release(&self, container: &Path) -> Result<bool> {
        let path = paths::lock_path(container);
        match read_lock_file(&path) {
            LockFileState::Missing => Ok(false),
            LockFileState::Held(record)
                if !self.identity.owns(&record) && !self.is_stale(&record) =>
            {
                debug!(holder = %record.locked_by, "Not releasing a lock held by someone else");
                Ok(false)
            }
            _ => {
                atomic::remove_if_exists(&path)?;
                info!(path = %path.display(), "Released lock");
                Ok(true)
            }
        }
    }

    /// Removes the lock file regardless of its holder.
    pub fn force_release(&self, container: &Path) -> Result<bool> {
        let path = paths::lock_path(container);
        let existed = path.exists();
        atomic::remove_if_exists(&path)?;
        if existed {
            warn!(path = %path.display(), "Force-released lock");
        }
        Ok(existed)
    }

    /// Refreshes the heartbeat if this identity holds the lock.
    ///
    /// Returns `Ok(false)` (no-op) when the lock is missing or held by
    /// someone else.
    pub fn heartbeat(&self, container: &Path) -> Result<bool> {
        let path = paths::lock_path(container);
        match read_lock_file(&path) {
            LockFileState::Held(record) if self.identity.owns(&record) => {
                self.write_heartbeat(&path, record)?;
                Ok(true)
            }
            LockFileState::Unreadable(e) => Err(e.into()),
            _ => Ok(false),
        }
    }

    /// Returns the live lock on `container`, if any.
    ///
    /// Missing, malformed and stale lock files all count as "no lock". An
    /// unreadable lock file yields the synthetic `(unknown)` holder.
    pub fn current_lock(&self, container: &Path) -> Option<LockRecord> {
        match read_lock_file(&paths::lock_path(container)) {
            LockFileState::Held(record) if !self.is_stale(&record) => Some(record),
            LockFileState::Unreadable(_) => Some(LockRecord::unknown(self.now())),
            _ => None,
        }
    }

    /// Returns true if this identity holds a live lock on `container`.
    pub fn is_locked_by_me(&self, container: &Path) -> bool {
        self.current_lock(container)
            .map(|record| self.identity.owns(&record))
            .unwrap_or(false)
    }

    /// Decides whether `record` has been abandoned.
    ///
    /// Heartbeat age is checked first. A record from this machine is also
    /// stale when its process is gone; records from other machines are
    /// never judged by process liveness.
    pub fn is_stale(&self, record: &LockRecord) -> bool {
        let age = self.now().signed_duration_since(record.heartbeat);
        if age > self.stale_after {
            return true;
        }

        self.identity.same_machine(record)
            && record.process_id != self.identity.pid
            && !is_process_alive(record.process_id)
    }

    fn write_heartbeat(&self, path: &Path, mut record: LockRecord) -> Result<()> {
        record.heartbeat = self.now();
        let bytes = serde_json::to_vec_pretty(&record)?;
        atomic::write_atomic(path, &atomic::sibling_temp_path(path), &bytes)?;
        debug!(path = %path.display(), "Heartbeat");
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        match &self.time_provider {
            Some(provider) => provider.now(),
            None => Utc::now(),
        }
    }
}

fn read_lock_file(path: &Path) -> LockFileState {
    match fs::read(path) {
        Ok(bytes) => match serde_json::from_slice::<LockRecord>(&bytes) {
            Ok(record) => LockFileState::Held(record),
            Err(_) => LockFileState::Malformed,
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => LockFileState::Missing,
        Err(e) => LockFileState::Unreadable(e),
    }
}

/// Removes a stale lock file only if it still holds `expected`, narrowing
/// the window in which a freshly won lock could be deleted.
fn remove_if_unchanged(path: &Path, expected: &LockRecord) -> io::Result<()> {
    match read_lock_file(path) {
        LockFileState::Held(current) if &current != expected => Ok(()),
        LockFileState::Unreadable(e) => Err(e),
        _ => atomic::remove_if_exists(path),
    }
}

/// Best-effort name of this machine.
pub fn machine_name() -> String {
    for var in ["HOSTNAME", "COMPUTERNAME"] {
        if let Ok(value) = std::env::var(var) {
            let value = value.trim();
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }

    #[cfg(unix)]
    {
        if let Ok(content) = fs::read_to_string("/etc/hostname") {
            let name = content.trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }

    "localhost".to_string()
}

/// Check if a process with the given PID is still alive.
///
/// On Linux, uses /proc/{pid}/stat to check process existence.
/// On other Unix systems, asks `kill -0`.
/// On non-Unix systems, conservatively assumes the process is alive, so
/// same-machine locks there are only reclaimed through heartbeat age.
#[cfg(target_os = "linux")]
pub fn is_process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}/stat", pid)).exists()
}

/// Check if a process with the given PID is still alive.
#[cfg(all(unix, not(target_os = "linux")))]
pub fn is_process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(true)
}

/// Check if a process with the given PID is still alive.
#[cfg(not(unix))]
pub fn is_process_alive(_pid: u32) -> bool {
    true
}
