//! Unit tests for the dump-catalog crate.

use migrator_core::{ColumnDescriptor, Signature, VariantType};
use tempfile::TempDir;

use crate::{
    chunk_file_name, CatalogStore, ChunkEntry, DumpCatalog, FileStems, FilesystemStore, RowSetEntry,
    CATALOG_FILE,
};

fn chunk(index: u64, rows: u64) -> ChunkEntry {
    ChunkEntry {
        index,
        file: format!("orders.{index}.csv"),
        row_count: rows,
        offset: index * 1000,
    }
}

fn catalog() -> DumpCatalog {
    let mut catalog = DumpCatalog::new("csv", Signature::new("MySQL", "8.0.36", 8, 0), "Europe/Paris");
    let mut orders = RowSetEntry::for_table("orders");
    orders.columns = vec![
        ColumnDescriptor::from_header("id", VariantType::String),
        ColumnDescriptor::from_header("receipt", VariantType::Binary),
    ];
    orders.chunks = vec![chunk(2, 7), chunk(0, 1000), chunk(1, 1000)];
    catalog.add_row_set(orders);
    catalog.add_row_set(RowSetEntry::for_query("recent", "SELECT * FROM orders WHERE id > 10"));
    catalog
}

// ============================================================================
// Catalog Tests
// ============================================================================

#[test]
fn test_chunks_are_sorted_and_counted() {
    let catalog = catalog();
    let orders = catalog.row_set("orders").unwrap();
    let indexes: Vec<u64> = orders.chunks.iter().map(|c| c.index).collect();
    assert_eq!(indexes, vec![0, 1, 2]);
    assert_eq!(orders.row_count(), 2007);
    assert_eq!(catalog.total_rows(), 2007);
    assert!(catalog.validate().is_ok());
}

#[test]
fn test_target_table_and_file_names() {
    let query = RowSetEntry::for_query("recent orders", "SELECT 1");
    assert_eq!(query.target_table(), "recent orders");
    let mut stems = FileStems::new();
    let stem = stems.allocate(&query.name);
    assert_eq!(chunk_file_name(&stem, 3, "bson"), "recent_orders.3.bson");
    assert_eq!(chunk_file_name(&stems.allocate("orders"), 0, "csv"), "orders.0.csv");
}

#[test]
fn test_colliding_names_get_distinct_stems() {
    let mut stems = FileStems::new();
    assert_eq!(stems.allocate("sales.orders"), "sales_orders");
    assert_eq!(stems.allocate("sales_orders"), "sales_orders-2");
    assert_eq!(stems.allocate("SALES_ORDERS"), "SALES_ORDERS-3");
    assert_eq!(stems.allocate("sales_orders-2"), "sales_orders-2-2");
    assert_eq!(stems.allocate("customers"), "customers");
}

#[test]
fn test_shared_chunk_file_fails_validation() {
    let mut catalog = catalog();
    let mut copy = RowSetEntry::for_table("orders_copy");
    copy.chunks = vec![chunk(0, 1000)];
    catalog.add_row_set(copy);
    let err = catalog.validate().unwrap_err();
    assert!(err.to_string().contains("orders.0.csv is listed more than once"));
}

#[test]
fn test_missing_chunk_fails_validation() {
    let mut catalog = catalog();
    catalog.row_sets[0].chunks.remove(1);
    let err = catalog.validate().unwrap_err();
    assert!(err.to_string().contains("missing chunk 1"));
}

#[test]
fn test_newer_version_fails_validation() {
    let mut catalog = catalog();
    catalog.version += 1;
    assert!(catalog.validate().is_err());
}

#[test]
fn test_query_row_sets_omit_table() {
    let json = serde_json::to_value(catalog()).unwrap();
    let recent = &json["row_sets"][1];
    assert!(recent.get("table").is_none());
    assert_eq!(recent["query"], "SELECT * FROM orders WHERE id > 10");
    assert_eq!(json["source"]["product_name"], "MySQL");
}

// ============================================================================
// FilesystemStore Tests
// ============================================================================

#[tokio::test]
async fn test_filesystem_store_roundtrip() {
    let dir = TempDir::new().unwrap();
    let store = FilesystemStore::new(dir.path().join("dump"));
    assert!(store.read_catalog().await.unwrap().is_none());

    let original = catalog();
    store.write_catalog(&original).await.unwrap();
    assert!(dir.path().join("dump").join(CATALOG_FILE).exists());
    assert!(!dir.path().join("dump").join("catalog.json.partial").exists());

    let loaded = store.read_catalog().await.unwrap().unwrap();
    assert_eq!(loaded, original);
}

#[tokio::test]
async fn test_filesystem_store_rejects_garbage() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(CATALOG_FILE), "{ not json").unwrap();
    let store = FilesystemStore::new(dir.path());
    let err = store.read_catalog().await.unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse"));
}
