//! Export the inner document.

use super::{spinner, Context};
use anyhow::{Context as _, Result};
use console::style;
use projpack_core::ContainerManager;
use std::path::Path;

/// Copy the inner document of `container` to `output`.
pub fn run(ctx: &Context, container: &Path, output: &Path) -> Result<()> {
    let pb = spinner("Extracting container...")?;
    let mut manager = ContainerManager::with_config(&ctx.config.workspace);
    let opened = manager.open(container);
    pb.finish_and_clear();
    opened.with_context(|| format!("Failed to open {}", container.display()))?;

    manager
        .export_inner_document(output)
        .with_context(|| format!("Failed to export to {}", output.display()))?;
    println!("{} Exported to {}", style("✓").green(), output.display());
    Ok(())
}
