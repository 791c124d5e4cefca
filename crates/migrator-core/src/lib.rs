//! Extraction and encoding engine for db-migrator.
//!
//! This crate holds everything between a live database connection and a
//! portable container of rows.
//!
//! # Modules
//!
//! - [`signature`] and [`resolver`] - vendor capability resolution
//! - [`types`], [`catalog`] and [`codec`] - type registry and the value codec
//!   converting native values into [`Variant`]s
//! - [`dialect`] and [`split`] - vendor pagination and chunked query splitting
//! - [`connection`] and [`memory`] - the database seam and an in-memory backend
//! - [`commit`] - target-side write batching
//! - [`format`] - the wire format seam implemented by the format crates
//!
//! # Example
//!
//! ```rust,ignore
//! use migrator_core::{dialect_resolver, QuerySplitter, RowCodec, CodecOptions};
//!
//! let dialect = dialect_resolver().resolve(conn.signature())?;
//! let catalog = dialect.type_catalog();
//! let mut splitter = QuerySplitter::new(dialect.clone(), dialect.table_query("users"), vec![])
//!     .with_chunk_size(Some(1000));
//! while let Some(split) = splitter.next_split(&mut conn).await? {
//!     let mut cursor = split.open(&mut conn).await?;
//!     let codec = RowCodec::bind(&catalog, cursor.columns(), CodecOptions::default())?;
//!     // ...
//! }
//! ```

pub mod catalog;
pub mod codec;
pub mod commit;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod format;
pub mod memory;
pub mod resolver;
pub mod signature;
pub mod split;
pub mod types;
pub mod values;

pub use catalog::{HandleAdapter, TypeAdapter, TypeBehavior, TypeCatalog, ValueGetter, ValueSetter};
pub use codec::{parse_temporal, parse_time_zone, CodecOptions, ColumnCodec, RowCodec, ValueFormat};
pub use commit::{BatchCommitStrategy, CommitMode, CommitStrategy, SingleCommitStrategy};
pub use connection::{
    collect_rows, Connection, ConnectionFactory, Cursor, LookaheadCursor, TrimmedCursor, VecCursor,
};
pub use dialect::{dialect_resolver, Dialect, ExactRowCount, LimitedQuery, Pagination, RowCountStrategy};
pub use error::{MigratorError, Result};
pub use format::{Format, FormatReader, FormatWriter, RowReader, VariantRow, WRITE_BUFFER_SIZE};
pub use memory::{MemoryConnection, MemoryDatabase};
pub use resolver::{ServiceFactory, ServiceResolver};
pub use signature::{is_assignable, Signature};
pub use split::{BindingMode, QueryLimit, QuerySplit, QuerySplitter, SplitStatement};
pub use types::{sql_types, TypeDescriptor};
pub use values::{
    BoundParam, ColumnDescriptor, ColumnMetadata, Lob, Row, SqlValue, ValueKind, Variant, VariantType,
};
