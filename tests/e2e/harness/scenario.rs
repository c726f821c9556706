use super::assertions::Assertion;
use super::runner::{ActorSpec, ScenarioRunner};
use super::steps::{ScenarioStep, Sidecar};
use std::time::Duration;

/// Fluent DSL for multi-process scenarios on one shared container
pub struct Scenario {
    name: String,
    container: String,
    content: Vec<u8>,
    actors: Vec<ActorSpec>,
    steps: Vec<ScenarioStep>,
}

impl Scenario {
    /// Create a new scenario with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            container: "shared.xlpj".to_string(),
            content: b"workbook".to_vec(),
            actors: Vec::new(),
            steps: Vec::new(),
        }
    }

    // ===== Initial setup =====

    /// Use a different container name (the extension picks the product)
    pub fn with_container(mut self, name: &str, content: &[u8]) -> Self {
        self.container = name.to_string();
        self.content = content.to_vec();
        self
    }

    /// Add a simulated process
    pub fn with_actor(mut self, name: &str, machine: &str, pid: u32) -> Self {
        self.actors.push(ActorSpec {
            name: name.to_string(),
            machine: machine.to_string(),
            pid,
        });
        self
    }

    // ===== Lock protocol =====

    /// Actor calls try_acquire
    pub fn acquire(mut self, actor: &str) -> Self {
        self.steps.push(ScenarioStep::Acquire {
            actor: actor.to_string(),
        });
        self
    }

    /// Actor releases its lock
    pub fn release(mut self, actor: &str) -> Self {
        self.steps.push(ScenarioStep::Release {
            actor: actor.to_string(),
        });
        self
    }

    /// Actor breaks whatever lock exists
    pub fn force_release(mut self, actor: &str) -> Self {
        self.steps.push(ScenarioStep::ForceRelease {
            actor: actor.to_string(),
        });
        self
    }

    /// Actor refreshes its heartbeat
    pub fn heartbeat(mut self, actor: &str) -> Self {
        self.steps.push(ScenarioStep::Heartbeat {
            actor: actor.to_string(),
        });
        self
    }

    // ===== Collaboration =====

    /// Actor loads the sidecar, capturing its watermark
    pub fn load_notes(mut self, actor: &str) -> Self {
        self.steps.push(ScenarioStep::LoadNotes {
            actor: actor.to_string(),
        });
        self
    }

    /// Actor reloads after a conflict, keeping nothing local
    pub fn reload_notes(mut self, actor: &str) -> Self {
        self.steps.push(ScenarioStep::ReloadNotes {
            actor: actor.to_string(),
        });
        self
    }

    /// Actor adds a note to its in-memory record
    pub fn add_note(mut self, actor: &str, text: &str) -> Self {
        self.steps.push(ScenarioStep::AddNote {
            actor: actor.to_string(),
            text: text.to_string(),
        });
        self
    }

    /// Actor saves its in-memory record
    pub fn save_notes(mut self, actor: &str) -> Self {
        self.steps.push(ScenarioStep::SaveNotes {
            actor: actor.to_string(),
        });
        self
    }

    // ===== Environment =====

    /// Advance the shared clock
    pub fn wait(mut self, duration: Duration) -> Self {
        self.steps.push(ScenarioStep::Wait { duration });
        self
    }

    /// Advance the shared clock by N minutes
    pub fn wait_minutes(self, minutes: u64) -> Self {
        self.wait(Duration::from_secs(minutes * 60))
    }

    /// Overwrite a sidecar with raw bytes
    pub fn corrupt(mut self, sidecar: Sidecar, bytes: &[u8]) -> Self {
        self.steps.push(ScenarioStep::CorruptSidecar {
            sidecar,
            bytes: bytes.to_vec(),
        });
        self
    }

    // ===== Assertions =====

    /// Add a general assertion
    pub fn assert(mut self, assertion: Assertion) -> Self {
        self.steps.push(ScenarioStep::Assert { assertion });
        self
    }

    /// Assert the actor's last acquire succeeded
    pub fn assert_acquired(self, actor: &str) -> Self {
        self.assert(Assertion::Acquired {
            actor: actor.to_string(),
        })
    }

    /// Assert the actor's last acquire returned `holder`'s record
    pub fn assert_blocked_by(self, actor: &str, holder: &str) -> Self {
        self.assert(Assertion::BlockedBy {
            actor: actor.to_string(),
            holder: holder.to_string(),
        })
    }

    /// Assert the live lock belongs to `holder`
    pub fn assert_lock_held_by(self, holder: &str) -> Self {
        self.assert(Assertion::LockHeldBy(holder.to_string()))
    }

    /// Assert there is no live lock
    pub fn assert_unlocked(self) -> Self {
        self.assert(Assertion::Unlocked)
    }

    /// Assert the actor's last notes save went through
    pub fn assert_save_succeeded(self, actor: &str) -> Self {
        self.assert(Assertion::SaveSucceeded {
            actor: actor.to_string(),
        })
    }

    /// Assert the actor's last notes save reported a conflict
    pub fn assert_save_conflicted(self, actor: &str) -> Self {
        self.assert(Assertion::SaveConflicted {
            actor: actor.to_string(),
        })
    }

    /// Assert the number of notes in the sidecar on disk
    pub fn assert_notes_on_disk(self, count: usize) -> Self {
        self.assert(Assertion::NotesOnDisk(count))
    }

    // ===== Execution =====

    /// Execute the scenario and return results
    pub fn run(self) -> ScenarioResult {
        let mut runner = match ScenarioRunner::new(&self.container, &self.content, &self.actors) {
            Ok(r) => r,
            Err(e) => {
                return ScenarioResult {
                    name: self.name.clone(),
                    success: false,
                    steps_executed: 0,
                    failure_step: Some(0),
                    error: Some(format!("Failed to create runner: {:?}", e)),
                }
            }
        };

        match runner.execute(&self.steps) {
            Ok(()) => ScenarioResult {
                name: self.name,
                success: true,
                steps_executed: self.steps.len(),
                failure_step: None,
                error: None,
            },
            Err(e) => {
                let failure_step = runner.current_step();
                ScenarioResult {
                    name: self.name,
                    success: false,
                    steps_executed: failure_step,
                    failure_step: Some(failure_step),
                    error: Some(format!("{:?}", e)),
                }
            }
        }
    }
}

/// Result of running a scenario
#[derive(Debug)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub steps_executed: usize,
    pub failure_step: Option<usize>,
    pub error: Option<String>,
}

impl ScenarioResult {
    /// Unwrap the result, panicking if it failed
    pub fn unwrap(self) {
        if !self.success {
            panic!(
                "Scenario '{}' failed at step {}: {}",
                self.name,
                self.failure_step.unwrap_or(0),
                self.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }
}
