//! Catalog storage trait.

use anyhow::Result;
use async_trait::async_trait;

use crate::DumpCatalog;

/// Trait for catalog storage operations.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Store the catalog, replacing any previous one.
    async fn write_catalog(&self, catalog: &DumpCatalog) -> Result<()>;

    /// Read the catalog.
    ///
    /// Returns None if no catalog has been written.
    async fn read_catalog(&self) -> Result<Option<DumpCatalog>>;
}
