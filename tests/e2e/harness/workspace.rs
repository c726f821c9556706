use anyhow::{Context, Result};
use projpack_core::{ContainerManager, Product};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Isolated directory standing in for a shared folder.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    /// Create an empty workspace
    pub fn empty() -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp directory")?;
        Ok(Self { dir })
    }

    /// Get workspace path
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of a workspace-relative file
    pub fn join(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    /// Write a file, creating parent directories
    pub fn write_file(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let full_path = self.join(name);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directories for {}", name))?;
        }
        fs::write(&full_path, content).with_context(|| format!("Failed to write file: {}", name))?;
        Ok(full_path)
    }

    /// Read a file
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        fs::read(self.join(name)).with_context(|| format!("Failed to read file: {}", name))
    }

    /// Check if a file exists
    pub fn file_exists(&self, name: &str) -> bool {
        self.join(name).exists()
    }

    /// Write `content` as a source document and build `container` from it.
    ///
    /// The product is taken from the container extension.
    pub fn create_container(&self, container: &str, content: &[u8]) -> Result<PathBuf> {
        let target = self.join(container);
        let product = Product::from_container_path(&target)
            .with_context(|| format!("No product for {}", container))?;
        let source = self.write_file(
            &format!("source.{}", product.inner_document_extension()),
            content,
        )?;

        let mut manager = ContainerManager::new();
        manager
            .create_from_source(&source, &target, product, "fixture", "0.0.0")
            .with_context(|| format!("Failed to create {}", container))?;
        Ok(target)
    }
}
