//! Configuration for lock staleness, sidecar retries and scratch workspaces.

use crate::error::{PackError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file looked up in a config directory.
pub const CONFIG_FILE_NAME: &str = "projpack.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Exclusive lock configuration.
    #[serde(default)]
    pub lock: LockConfig,

    /// Collaboration sidecar configuration.
    #[serde(default)]
    pub collab: CollabConfig,

    /// Scratch workspace configuration.
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

impl Config {
    /// Load configuration from `projpack.toml` in `dir`.
    ///
    /// Returns the defaults when the file does not exist.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| PackError::Config(format!("failed to read config: {}", e)))?;
            toml::from_str(&content)
                .map_err(|e| PackError::Config(format!("failed to parse config: {}", e)))
        } else {
            Ok(Config::default())
        }
    }

    /// Renders the configuration as pretty TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PackError::Config(format!("failed to serialize config: {}", e)))
    }

    /// Save configuration to `projpack.toml` in `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(CONFIG_FILE_NAME);
        let content = self.to_toml()?;
        fs::write(&path, content)
            .map_err(|e| PackError::Config(format!("failed to write config: {}", e)))?;
        Ok(())
    }
}

/// Exclusive lock configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LockConfig {
    /// Heartbeat age in seconds after which a lock is stale (default: 1800).
    pub stale_after_secs: u64,

    /// Application name recorded in lock files (default: "projpack").
    pub application: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 30 * 60,
            application: "projpack".to_string(),
        }
    }
}

impl LockConfig {
    /// Returns the staleness threshold as a Duration.
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Collaboration sidecar configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollabConfig {
    /// Retries after the first failed write attempt (default: 3).
    pub max_retries: u32,

    /// First backoff delay in milliseconds, doubled on each retry (default: 200).
    pub initial_backoff_ms: u64,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 200,
        }
    }
}

impl CollabConfig {
    /// Backoff before retry number `attempt` (0-based): 200ms, 400ms, 800ms...
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

/// Scratch workspace configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WorkspaceConfig {
    /// Directory under which scratch workspaces are created.
    /// Defaults to the system temp directory.
    pub scratch_dir: Option<PathBuf>,
}
