//! Filesystem-based catalog storage implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::store::CatalogStore;
use crate::{DumpCatalog, CATALOG_FILE};

/// Filesystem implementation of CatalogStore trait.
///
/// Stores the catalog as pretty-printed JSON in the dump directory.
pub struct FilesystemStore {
    dir: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.dir.join(CATALOG_FILE)
    }
}

#[async_trait]
impl CatalogStore for FilesystemStore {
    async fn write_catalog(&self, catalog: &DumpCatalog) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        // Write to a temporary name first so readers never see a partial catalog
        let path = self.catalog_path();
        let partial = self.dir.join(format!("{CATALOG_FILE}.partial"));
        std::fs::write(&partial, serde_json::to_string_pretty(catalog)?)?;
        std::fs::rename(&partial, &path)?;
        tracing::info!("Stored dump catalog to {}", path.display());
        Ok(())
    }

    async fn read_catalog(&self) -> Result<Option<DumpCatalog>> {
        let path = self.catalog_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let catalog: DumpCatalog = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        catalog.validate()?;
        Ok(Some(catalog))
    }
}
