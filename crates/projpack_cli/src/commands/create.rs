//! Create a project container from a source document.

use super::{spinner, Context};
use anyhow::{bail, Context as _, Result};
use console::style;
use projpack_core::{ContainerManager, Product};
use std::path::{Path, PathBuf};

fn resolve_product(source: &Path, code: Option<&str>) -> Result<Product> {
    if let Some(code) = code {
        return Ok(Product::from_code(code)?);
    }
    match Product::ALL.into_iter().find(|p| p.accepts_source(source)) {
        Some(product) => Ok(product),
        None => bail!(
            "Cannot infer the product from {}; pass --product",
            source.display()
        ),
    }
}

/// Build a new container next to the source (or at `output`).
pub fn run(ctx: &Context, source: &Path, output: Option<&Path>, product: Option<&str>) -> Result<()> {
    let product = resolve_product(source, product)?;
    let target: PathBuf = match output {
        Some(path) => path.to_path_buf(),
        None => source.with_extension(product.container_extension()),
    };

    let pb = spinner("Packing container...")?;
    let mut manager = ContainerManager::with_config(&ctx.config.workspace);
    let result = manager.create_from_source(
        source,
        &target,
        product,
        &ctx.user,
        env!("CARGO_PKG_VERSION"),
    );
    pb.finish_and_clear();
    let meta = result.with_context(|| format!("Failed to create {}", target.display()))?;

    println!("{} Created {}", style("✓").green(), style(target.display()).bold());
    println!("  Product:  {} ({})", meta.product_code, product.inner_document_name());
    println!("  Title:    {}", meta.title);
    println!("  Hash:     {}", meta.document_hash);
    Ok(())
}
