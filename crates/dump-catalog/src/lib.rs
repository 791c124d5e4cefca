//! Dump catalog management for db-migrator
//!
//! A dump directory holds one container file per extracted chunk plus a
//! `catalog.json` describing them. The catalog is written last, so a
//! directory without one is an incomplete dump.
//!
//! # File Format
//!
//! ```json
//! {
//!     "version": 1,
//!     "format": "csv",
//!     "source": { "product_name": "MySQL", "product_version": "8.0.36", ... },
//!     "time_zone": "UTC",
//!     "created_at": "2024-01-01T00:00:00Z",
//!     "row_sets": [
//!         {
//!             "name": "orders",
//!             "table": "orders",
//!             "columns": [{ "name": "id", "type_code": 4, "variant_type": "string" }],
//!             "chunks": [{ "index": 0, "file": "orders.0.csv", "row_count": 1000, "offset": 0 }]
//!         }
//!     ]
//! }
//! ```
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - stores the catalog next to the chunk files

mod filesystem;
pub mod store;

#[cfg(test)]
mod tests;

pub use filesystem::FilesystemStore;
pub use store::CatalogStore;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use migrator_core::{ColumnDescriptor, Signature};
use serde::{Deserialize, Serialize};

/// File name of the catalog inside a dump directory.
pub const CATALOG_FILE: &str = "catalog.json";

/// Catalog layout version written by this build.
pub const CATALOG_VERSION: u32 = 1;

/// One extracted chunk of a row set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub index: u64,
    /// File name relative to the dump directory
    pub file: String,
    pub row_count: u64,
    /// Offset of the chunk's first row in the source query
    pub offset: u64,
}

/// A table or query and the chunks it was extracted into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowSetEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub chunks: Vec<ChunkEntry>,
}

impl RowSetEntry {
    pub fn for_table(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            name: table.clone(),
            table: Some(table),
            query: None,
            columns: Vec::new(),
            chunks: Vec::new(),
        }
    }

    pub fn for_query(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            query: Some(query.into()),
            columns: Vec::new(),
            chunks: Vec::new(),
        }
    }

    /// Table rows of this set are loaded into: the source table, or the set
    /// name for queries.
    pub fn target_table(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }

    pub fn row_count(&self) -> u64 {
        self.chunks.iter().map(|c| c.row_count).sum()
    }

    /// Order chunks by index; workers finish in any order.
    pub fn sort_chunks(&mut self) {
        self.chunks.sort_by_key(|c| c.index);
    }
}

/// Name of the file holding chunk `index` of the row set written under
/// `stem`: `<stem>.<index>.<extension>`.
pub fn chunk_file_name(stem: &str, index: u64, extension: &str) -> String {
    format!("{stem}.{index}.{extension}")
}

/// Hands out one file stem per row set of a dump.
///
/// Row set names are reduced to characters safe in file names. When two
/// names reduce to the same stem, ignoring case, later ones get a `-2`,
/// `-3`, ... suffix.
#[derive(Debug, Default)]
pub struct FileStems {
    used: HashSet<String>,
}

impl FileStems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, name: &str) -> String {
        let base: String = name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        let mut stem = base.clone();
        let mut suffix = 1;
        while !self.used.insert(stem.to_lowercase()) {
            suffix += 1;
            stem = format!("{base}-{suffix}");
        }
        stem
    }
}

/// Description of a complete dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpCatalog {
    pub version: u32,
    /// Name of the wire format of every chunk file
    pub format: String,
    /// Database the dump was taken from
    pub source: Signature,
    /// Zone local temporal values were interpreted in
    pub time_zone: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub row_sets: Vec<RowSetEntry>,
}

impl DumpCatalog {
    pub fn new(format: impl Into<String>, source: Signature, time_zone: impl Into<String>) -> Self {
        Self {
            version: CATALOG_VERSION,
            format: format.into(),
            source,
            time_zone: time_zone.into(),
            created_at: Utc::now(),
            row_sets: Vec::new(),
        }
    }

    pub fn add_row_set(&mut self, mut row_set: RowSetEntry) {
        row_set.sort_chunks();
        self.row_sets.push(row_set);
    }

    pub fn row_set(&self, name: &str) -> Option<&RowSetEntry> {
        self.row_sets.iter().find(|r| r.name == name)
    }

    pub fn total_rows(&self) -> u64 {
        self.row_sets.iter().map(RowSetEntry::row_count).sum()
    }

    /// Check a catalog read back from storage.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.version > CATALOG_VERSION {
            anyhow::bail!(
                "Catalog version {} is newer than the supported version {}",
                self.version,
                CATALOG_VERSION
            );
        }
        let mut files = HashSet::new();
        for row_set in &self.row_sets {
            for chunk in &row_set.chunks {
                if !files.insert(chunk.file.to_lowercase()) {
                    anyhow::bail!(
                        "Chunk file {} is listed more than once (row set '{}')",
                        chunk.file,
                        row_set.name
                    );
                }
            }
            for (expected, chunk) in row_set.chunks.iter().enumerate() {
                if chunk.index != expected as u64 {
                    anyhow::bail!(
                        "Row set '{}' is missing chunk {} (found chunk {})",
                        row_set.name,
                        expected,
                        chunk.index
                    );
                }
            }
        }
        Ok(())
    }
}
