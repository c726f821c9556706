//! Lock inspection and release.

use super::{print_lock, Context};
use anyhow::Result;
use console::style;
use projpack_core::LockManager;
use std::path::Path;

/// Show the live lock holder, if any.
pub fn status(ctx: &Context, container: &Path) -> Result<()> {
    let locks = LockManager::with_config(ctx.identity(), &ctx.config.lock);
    match locks.current_lock(container) {
        Some(record) => {
            println!("{} {}", style("Locked:").yellow().bold(), container.display());
            print_lock(&record);
        }
        None => println!("{} {}", style("Not locked:").green(), container.display()),
    }
    Ok(())
}

/// Release our own or a stale lock; `force` removes any lock.
pub fn release(ctx: &Context, container: &Path, force: bool) -> Result<()> {
    let locks = LockManager::with_config(ctx.identity(), &ctx.config.lock);

    let removed = if force {
        if let Some(record) = locks.current_lock(container) {
            println!(
                "{} Breaking lock held by {} on {}",
                style("⚠").yellow().bold(),
                style(&record.locked_by).cyan(),
                record.machine_name
            );
        }
        locks.force_release(container)?
    } else {
        locks.release(container)?
    };

    if removed {
        println!("{} Lock released", style("✓").green());
    } else if let Some(record) = locks.current_lock(container) {
        println!(
            "{} Lock is held by {}; use {} to break it",
            style("×").red(),
            style(&record.locked_by).cyan(),
            style("--force").cyan()
        );
    } else {
        println!("No lock to release");
    }
    Ok(())
}
