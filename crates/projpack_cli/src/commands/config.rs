//! Configuration display.

use super::Context;
use anyhow::Result;
use console::style;
use projpack_core::CONFIG_FILE_NAME;

/// Print the effective configuration as TOML.
pub fn show(ctx: &Context) -> Result<()> {
    let path = ctx.config_dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        println!("{} {}", style("#").dim(), style(path.display()).dim());
    } else {
        println!("{} {}", style("#").dim(), style("defaults (no projpack.toml found)").dim());
    }
    println!("{}", ctx.config.to_toml()?);
    Ok(())
}
