//! Container overview.

use super::{print_lock, spinner, Context};
use anyhow::{Context as _, Result};
use console::style;
use projpack_core::{CollabStore, ContainerManager, LockManager};
use std::path::Path;

/// Print metadata, integrity, lock and collaboration state.
pub fn run(ctx: &Context, container: &Path) -> Result<()> {
    let pb = spinner("Reading container...")?;
    let mut manager = ContainerManager::with_config(&ctx.config.workspace);
    let opened = manager.open(container);
    pb.finish_and_clear();
    let meta = opened.with_context(|| format!("Failed to open {}", container.display()))?;
    let intact = manager.verify_document_hash()?;

    println!("{}", style(container.display()).bold());
    println!("  Product:        {}", meta.product_code);
    println!("  Title:          {}", meta.title);
    if !meta.description.is_empty() {
        println!("  Description:    {}", meta.description);
    }
    println!("  Author:         {}", meta.author);
    println!(
        "  Created:        {}",
        meta.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  Updated:        {} by {}",
        meta.updated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        meta.last_modified_by
    );
    println!("  Original file:  {}", meta.original_file_name);
    println!(
        "  Document hash:  {} {}",
        meta.document_hash,
        if intact {
            style("(verified)").green()
        } else {
            style("(mismatch)").red()
        }
    );
    println!(
        "  Entries:        {} history, {} references, {} scripts",
        style(meta.history_count).cyan(),
        style(meta.reference_count).cyan(),
        style(meta.script_count).cyan()
    );
    if !meta.tags.is_empty() {
        println!("  Tags:           {}", meta.tags.join(", "));
    }

    println!();
    let locks = LockManager::with_config(ctx.identity(), &ctx.config.lock);
    match locks.current_lock(container) {
        Some(record) => {
            println!("{}", style("Locked").yellow().bold());
            print_lock(&record);
        }
        None => println!("{}", style("Not locked").green()),
    }

    let mut collab = CollabStore::with_config(ctx.config.collab.clone());
    let notes = collab.load(container);
    println!();
    println!("  Sticky notes:   {}", style(notes.sticky_notes.len()).cyan());
    if let Some(updated) = notes.updated_at {
        println!(
            "  Notes updated:  {}",
            updated.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    Ok(())
}
