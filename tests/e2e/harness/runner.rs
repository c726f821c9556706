use super::assertions::Assertion;
use super::clock::MockClock;
use super::steps::{ScenarioStep, Sidecar};
use super::workspace::TestWorkspace;
use anyhow::{anyhow, bail, ensure, Context, Result};
use projpack_core::{
    collab_path, lock_path, CollabConfig, CollabStore, CollaborationRecord, HolderIdentity,
    LockManager, LockRecord, NotePosition, StickyNote,
};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// A simulated process taking part in a scenario
#[derive(Debug, Clone)]
pub struct ActorSpec {
    pub name: String,
    pub machine: String,
    pub pid: u32,
}

struct Actor {
    locks: LockManager,
    collab: CollabStore,
    record: CollaborationRecord,
    last_acquire: Option<Option<LockRecord>>,
    last_save: Option<bool>,
}

/// Executes scenarios against real sidecar files in a temp directory
pub struct ScenarioRunner {
    workspace: TestWorkspace,
    container: PathBuf,
    clock: MockClock,
    actors: HashMap<String, Actor>,
    current_step: usize,
}

impl ScenarioRunner {
    /// Create the container and one lock manager and store per actor
    pub fn new(container: &str, content: &[u8], actors: &[ActorSpec]) -> Result<Self> {
        let workspace = TestWorkspace::empty()?;
        let container = workspace.create_container(container, content)?;
        let clock = MockClock::new();

        let actors = actors
            .iter()
            .map(|spec| {
                let identity = HolderIdentity::new(&spec.name, &spec.machine, spec.pid);
                let actor = Actor {
                    locks: LockManager::new(identity).with_time_provider(clock.as_provider()),
                    collab: CollabStore::with_config(CollabConfig {
                        max_retries: 3,
                        initial_backoff_ms: 0,
                    })
                    .with_time_provider(clock.as_provider()),
                    record: CollaborationRecord::default(),
                    last_acquire: None,
                    last_save: None,
                };
                (spec.name.clone(), actor)
            })
            .collect();

        Ok(Self {
            workspace,
            container,
            clock,
            actors,
            current_step: 0,
        })
    }

    /// Get current step number
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Execute all steps in sequence
    pub fn execute(&mut self, steps: &[ScenarioStep]) -> Result<()> {
        for (i, step) in steps.iter().enumerate() {
            self.current_step = i;
            self.execute_step(step)
                .with_context(|| format!("Step {}: {:?}", i, step))?;
        }
        Ok(())
    }

    fn execute_step(&mut self, step: &ScenarioStep) -> Result<()> {
        match step {
            ScenarioStep::Acquire { actor } => self.handle_acquire(actor),
            ScenarioStep::Release { actor } => {
                self.actor(actor)?.locks.release(&self.container)?;
                Ok(())
            }
            ScenarioStep::ForceRelease { actor } => {
                self.actor(actor)?.locks.force_release(&self.container)?;
                Ok(())
            }
            ScenarioStep::Heartbeat { actor } => {
                self.actor(actor)?.locks.heartbeat(&self.container)?;
                Ok(())
            }

            ScenarioStep::LoadNotes { actor } | ScenarioStep::ReloadNotes { actor } => {
                let container = self.container.clone();
                let a = self.actor_mut(actor)?;
                a.record = a.collab.load(&container);
                Ok(())
            }
            ScenarioStep::AddNote { actor, text } => {
                let now = self.clock.now();
                let a = self.actor_mut(actor)?;
                a.record
                    .upsert_note(StickyNote::new(actor, text, NotePosition::default(), now));
                Ok(())
            }
            ScenarioStep::SaveNotes { actor } => {
                let container = self.container.clone();
                let a = self.actor_mut(actor)?;
                let saved = a.collab.save(&container, &mut a.record)?;
                a.last_save = Some(saved);
                Ok(())
            }

            ScenarioStep::Wait { duration } => self.handle_wait(*duration),
            ScenarioStep::CorruptSidecar { sidecar, bytes } => {
                let path = match sidecar {
                    Sidecar::Lock => lock_path(&self.container),
                    Sidecar::Collab => collab_path(&self.container),
                };
                fs::write(&path, bytes)
                    .with_context(|| format!("Failed to corrupt {}", path.display()))
            }

            ScenarioStep::Assert { assertion } => self.handle_assertion(assertion),
        }
    }

    fn actor(&self, name: &str) -> Result<&Actor> {
        self.actors
            .get(name)
            .ok_or_else(|| anyhow!("Unknown actor: {}", name))
    }

    fn actor_mut(&mut self, name: &str) -> Result<&mut Actor> {
        self.actors
            .get_mut(name)
            .ok_or_else(|| anyhow!("Unknown actor: {}", name))
    }

    fn handle_acquire(&mut self, actor: &str) -> Result<()> {
        let container = self.container.clone();
        let a = self.actor_mut(actor)?;
        a.last_acquire = Some(a.locks.try_acquire(&container, None));
        Ok(())
    }

    fn handle_wait(&mut self, duration: Duration) -> Result<()> {
        self.clock.advance(duration);
        Ok(())
    }

    /// Reads the live lock without any actor's identity bias
    fn observed_lock(&self) -> Option<LockRecord> {
        let observer = LockManager::new(HolderIdentity::new("observer", "observer-host", 1))
            .with_time_provider(self.clock.as_provider());
        observer.current_lock(&self.container)
    }

    fn notes_on_disk(&self) -> Result<CollaborationRecord> {
        let mut store = CollabStore::new();
        Ok(store.load(&self.container))
    }

    fn handle_assertion(&mut self, assertion: &Assertion) -> Result<()> {
        match assertion {
            Assertion::Acquired { actor } => match &self.actor(actor)?.last_acquire {
                Some(None) => Ok(()),
                Some(Some(holder)) => bail!("{} was blocked by {}", actor, holder.locked_by),
                None => bail!("{} never tried to acquire", actor),
            },
            Assertion::BlockedBy { actor, holder } => match &self.actor(actor)?.last_acquire {
                Some(Some(record)) => {
                    ensure!(
                        &record.locked_by == holder,
                        "{} was blocked by {}, expected {}",
                        actor,
                        record.locked_by,
                        holder
                    );
                    Ok(())
                }
                Some(None) => bail!("{} acquired the lock, expected to be blocked", actor),
                None => bail!("{} never tried to acquire", actor),
            },
            Assertion::LockHeldBy(holder) => match self.observed_lock() {
                Some(record) if &record.locked_by == holder => Ok(()),
                Some(record) => bail!("Lock held by {}, expected {}", record.locked_by, holder),
                None => bail!("No live lock, expected {}", holder),
            },
            Assertion::Unlocked => match self.observed_lock() {
                None => Ok(()),
                Some(record) => bail!("Lock still held by {}", record.locked_by),
            },
            Assertion::LockedByMe { actor, expected } => {
                let actual = self.actor(actor)?.locks.is_locked_by_me(&self.container);
                ensure!(actual == *expected, "is_locked_by_me for {} was {}", actor, actual);
                Ok(())
            }
            Assertion::LockFileExists(expected) => {
                let actual = lock_path(&self.container).exists();
                ensure!(actual == *expected, "Lock file exists: {}", actual);
                Ok(())
            }
            Assertion::SaveSucceeded { actor } => match self.actor(actor)?.last_save {
                Some(true) => Ok(()),
                Some(false) => bail!("Save by {} conflicted", actor),
                None => bail!("{} never saved", actor),
            },
            Assertion::SaveConflicted { actor } => match self.actor(actor)?.last_save {
                Some(false) => Ok(()),
                Some(true) => bail!("Save by {} succeeded, expected a conflict", actor),
                None => bail!("{} never saved", actor),
            },
            Assertion::HasChanges { actor, expected } => {
                let actual = self.actor(actor)?.collab.has_changes(&self.container);
                ensure!(actual == *expected, "has_changes for {} was {}", actor, actual);
                Ok(())
            }
            Assertion::NotesOnDisk(count) => {
                let record = self.notes_on_disk()?;
                ensure!(
                    record.sticky_notes.len() == *count,
                    "Expected {} notes on disk, found {}",
                    count,
                    record.sticky_notes.len()
                );
                Ok(())
            }
            Assertion::NoteOnDisk(text) => {
                let record = self.notes_on_disk()?;
                ensure!(
                    record.sticky_notes.iter().any(|n| &n.text == text),
                    "No note with text {:?} on disk",
                    text
                );
                Ok(())
            }
            Assertion::Custom(check) => check(&self.container),
        }
    }

    /// Workspace backing this scenario
    pub fn workspace(&self) -> &TestWorkspace {
        &self.workspace
    }
}
