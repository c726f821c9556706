//! Sticky notes in the collaboration sidecar.

use super::Context;
use anyhow::{bail, Context as _, Result};
use chrono::Utc;
use console::style;
use projpack_core::{CollabStore, NotePosition, NotesSaveOutcome, StickyNote};
use std::path::Path;

/// List the notes currently in the sidecar.
pub fn list(ctx: &Context, container: &Path) -> Result<()> {
    let mut collab = CollabStore::with_config(ctx.config.collab.clone());
    let record = collab.load(container);

    if record.sticky_notes.is_empty() {
        println!("No sticky notes");
        return Ok(());
    }
    for note in &record.sticky_notes {
        println!(
            "{} {} {}",
            style(short_id(&note.id)).dim(),
            style(&note.author).cyan(),
            note.updated_at.format("%Y-%m-%d %H:%M")
        );
        for line in note.text.lines() {
            println!("    {}", line);
        }
    }
    Ok(())
}

/// First eight characters of a note id.
fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Add a note, merging with concurrent writers. Works without the lock.
pub fn add(
    ctx: &Context,
    container: &Path,
    text: &str,
    x: f64,
    y: f64,
    color: Option<String>,
) -> Result<()> {
    if !container.is_file() {
        bail!("Container not found: {}", container.display());
    }

    let position = NotePosition {
        x,
        y,
        width: None,
        height: None,
    };
    let mut note = StickyNote::new(&ctx.user, text, position, Utc::now());
    note.color = color;

    let mut collab = CollabStore::with_config(ctx.config.collab.clone());
    let attempts = ctx.config.collab.max_retries + 1;
    let outcome = collab
        .apply_edit(container, attempts, |record| record.upsert_note(note.clone()))
        .with_context(|| format!("Failed to save notes for {}", container.display()))?;

    match outcome {
        NotesSaveOutcome::Saved(record) => {
            println!(
                "{} Added note ({} total)",
                style("✓").green(),
                record.sticky_notes.len()
            );
            Ok(())
        }
        NotesSaveOutcome::Unsaved(_) => {
            bail!("Notes kept changing under us; the note was not saved, try again")
        }
    }
}
