//! CLI commands.

pub mod config;
pub mod create;
pub mod export;
pub mod history;
pub mod info;
pub mod lock;
pub mod notes;
pub mod validate;

use anyhow::{Context as _, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use projpack_core::{Config, HolderIdentity, LockRecord};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings shared by every command.
pub struct Context {
    pub config_dir: PathBuf,
    pub config: Config,
    pub user: String,
}

impl Context {
    pub fn new(config_dir: &Path, user: Option<String>) -> Result<Self> {
        let config = Config::load(config_dir).with_context(|| {
            format!("Failed to load configuration from {}", config_dir.display())
        })?;
        let user = user
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self {
            config_dir: config_dir.to_path_buf(),
            config,
            user,
        })
    }

    /// Identity of this process for lock ownership.
    pub fn identity(&self) -> HolderIdentity {
        HolderIdentity::current(self.user.clone())
    }
}

/// Steady spinner on stderr for archive work.
pub fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// Prints a lock holder block.
pub fn print_lock(record: &LockRecord) {
    println!("  Holder:      {}", style(&record.locked_by).cyan());
    println!("  Machine:     {}", record.machine_name);
    println!("  Process:     {}", record.process_id);
    println!("  Application: {}", record.application);
    println!(
        "  Locked at:   {}",
        record.locked_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  Heartbeat:   {}",
        record.heartbeat.format("%Y-%m-%d %H:%M:%S UTC")
    );
}
