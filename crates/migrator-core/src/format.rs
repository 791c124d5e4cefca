//! Wire format seam.
//!
//! A format streams [`Variant`] rows to and from a self-describing container:
//! every container opens with its column manifest (name and variant type),
//! followed by the rows in order.

use std::io::{Read, Write};

use tracing::warn;

use crate::codec::RowCodec;
use crate::error::Result;
use crate::values::{BoundParam, ColumnDescriptor, Variant};

/// One serialized row: a value per column, `None` for SQL NULL.
pub type VariantRow = Vec<Option<Variant>>;

/// Size of the buffer placed in front of container sinks.
pub const WRITE_BUFFER_SIZE: usize = 8 * 1024 * 1024;

pub trait FormatWriter: Send {
    fn write_header(&mut self, columns: &[ColumnDescriptor]) -> Result<()>;

    fn write_row(&mut self, row: &[Option<Variant>]) -> Result<()>;

    /// Terminate the container and flush the sink.
    fn finish(&mut self) -> Result<()>;
}

/// Reads a container.
///
/// Implementations consume a whole row before validating it, so a row-level
/// [`crate::MigratorError::Format`] leaves the reader on the next row.
pub trait FormatReader: Send {
    fn read_header(&mut self) -> Result<Vec<ColumnDescriptor>>;

    fn read_row(&mut self) -> Result<Option<VariantRow>>;
}

/// A wire format, creating writers and readers over byte streams.
pub trait Format: Send + Sync {
    /// Name used on the command line and in the dump catalog.
    fn name(&self) -> &'static str;

    /// File extension of chunk files.
    fn extension(&self) -> &'static str {
        self.name()
    }

    fn writer(&self, sink: Box<dyn Write + Send>) -> Box<dyn FormatWriter>;

    fn reader(&self, source: Box<dyn Read + Send>) -> Box<dyn FormatReader>;
}

/// Reads a container and decodes its rows into statement parameters.
///
/// In lenient mode rows raising a recoverable error are logged and skipped.
pub struct RowReader {
    reader: Box<dyn FormatReader>,
    codec: RowCodec,
    rows_read: u64,
    rows_skipped: u64,
}

impl RowReader {
    pub fn new(reader: Box<dyn FormatReader>, codec: RowCodec) -> Self {
        Self {
            reader,
            codec,
            rows_read: 0,
            rows_skipped: 0,
        }
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn rows_skipped(&self) -> u64 {
        self.rows_skipped
    }

    pub fn next_params(&mut self) -> Result<Option<Vec<BoundParam>>> {
        let lenient = self.codec.options().lenient;
        loop {
            let decoded = match self.reader.read_row() {
                Ok(None) => return Ok(None),
                Ok(Some(values)) => self.codec.decode_row(&values),
                Err(e) => Err(e),
            };
            self.rows_read += 1;
            match decoded {
                Ok(params) => return Ok(Some(params)),
                Err(e) if lenient && e.is_row_recoverable() => {
                    self.rows_skipped += 1;
                    warn!("Skipping row {}: {}", self.rows_read, e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
