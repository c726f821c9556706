//! History snapshots of the inner document.

use super::{spinner, Context};
use anyhow::{bail, Context as _, Result};
use console::style;
use projpack_core::{ContainerManager, OpenMode, Project};
use std::path::Path;

/// Snapshot the inner document and save. Requires the exclusive lock.
pub fn add(ctx: &Context, container: &Path, message: &str) -> Result<()> {
    let mut project = Project::open(container, ctx.identity(), &ctx.config)
        .with_context(|| format!("Failed to open {}", container.display()))?;

    if let OpenMode::ReadOnly { holder } = project.mode() {
        bail!(
            "{} is locked by {} on {}",
            container.display(),
            holder.locked_by,
            holder.machine_name
        );
    }

    let entry = project
        .container_mut()
        .add_history_snapshot(&ctx.user, message)?;
    let pb = spinner("Saving container...")?;
    let saved = project.save(&ctx.user);
    pb.finish_and_clear();
    saved?;
    project.close();

    println!(
        "{} Snapshot {} ({} bytes)",
        style("✓").green(),
        style(&entry.id).cyan(),
        entry.size
    );
    Ok(())
}

/// List snapshots, oldest first.
pub fn list(ctx: &Context, container: &Path) -> Result<()> {
    let mut manager = ContainerManager::with_config(&ctx.config.workspace);
    manager
        .open(container)
        .with_context(|| format!("Failed to open {}", container.display()))?;

    let history = manager.list_history()?;
    if history.is_empty() {
        println!("No history snapshots");
        return Ok(());
    }
    for entry in history {
        println!(
            "{} {} {} {}",
            style(&entry.id).cyan(),
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.author,
            entry.comment
        );
    }
    Ok(())
}
