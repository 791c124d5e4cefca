//! BSON container format.
//!
//! A container is a sequence of BSON documents:
//!
//! - a header `{"columns": [{"column": <name>, "variant": <alias>}, ...]}`,
//! - any number of chunks `{"rows": [<row>, ...]}` of at most
//!   [`ROWS_PER_DOCUMENT`] rows.
//!
//! A row is an array whose first element is `null` when no column is null,
//! or else a binary null bitset (bit `i` set when column `i` is null, least
//! significant bit first). The non-null values follow in column order, as
//! BSON strings or generic binaries.

mod error;
mod reader;
mod writer;

pub use error::BsonFormatError;
pub use reader::BsonReader;
pub use writer::BsonWriter;

use std::io::{Read, Write};

use migrator_core::{Format, FormatReader, FormatWriter};

/// Maximum number of rows held by one chunk document.
pub const ROWS_PER_DOCUMENT: usize = 1000;

/// Chunk documents are closed early past this many payload bytes, keeping
/// them well below the BSON document size limit.
pub const MAX_CHUNK_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct BsonFormat;

impl Format for BsonFormat {
    fn name(&self) -> &'static str {
        "bson"
    }

    fn writer(&self, sink: Box<dyn Write + Send>) -> Box<dyn FormatWriter> {
        Box::new(BsonWriter::new(sink))
    }

    fn reader(&self, source: Box<dyn Read + Send>) -> Box<dyn FormatReader> {
        Box::new(BsonReader::new(source))
    }
}

/// Null bitset of a row, or `None` when no value is null.
pub(crate) fn null_bitset<T>(row: &[Option<T>]) -> Option<Vec<u8>> {
    if row.iter().all(Option::is_some) {
        return None;
    }
    let mut bits = vec![0u8; row.len().div_ceil(8)];
    for (i, value) in row.iter().enumerate() {
        if value.is_none() {
            bits[i / 8] |= 1 << (i % 8);
        }
    }
    Some(bits)
}

pub(crate) fn is_null_at(bits: &[u8], index: usize) -> bool {
    bits.get(index / 8)
        .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
}
