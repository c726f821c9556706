//! Structural container check.

use anyhow::{bail, Result};
use console::style;
use projpack_core::is_valid_container;
use std::path::PathBuf;

/// Check each path; fails if any is not a valid container.
pub fn run(paths: &[PathBuf]) -> Result<()> {
    let mut invalid = 0;
    for path in paths {
        if is_valid_container(path) {
            println!("{} {}", style("✓").green(), path.display());
        } else {
            println!("{} {}", style("×").red(), path.display());
            invalid += 1;
        }
    }

    if invalid > 0 {
        bail!("{} of {} file(s) are not valid containers", invalid, paths.len());
    }
    Ok(())
}
