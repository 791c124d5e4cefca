use std::io::Write;

use bson::spec::BinarySubtype;
use bson::{doc, Binary, Bson, Document};
use migrator_core::{ColumnDescriptor, FormatWriter, Result, Variant};
use tracing::trace;

use crate::error::BsonFormatError;
use crate::{null_bitset, MAX_CHUNK_BYTES, ROWS_PER_DOCUMENT};

/// Streams rows as BSON chunk documents.
pub struct BsonWriter {
    sink: Box<dyn Write + Send>,
    columns: usize,
    header_written: bool,
    rows: Vec<Bson>,
    chunk_bytes: usize,
    documents: u64,
    rows_written: u64,
}

fn binary(bytes: Vec<u8>) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Generic,
        bytes,
    })
}

impl BsonWriter {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink,
            columns: 0,
            header_written: false,
            rows: Vec::with_capacity(ROWS_PER_DOCUMENT),
            chunk_bytes: 0,
            documents: 0,
            rows_written: 0,
        }
    }

    fn write_document(&mut self, document: &Document) -> std::result::Result<(), BsonFormatError> {
        document.to_writer(&mut self.sink)?;
        self.documents += 1;
        Ok(())
    }

    fn flush_chunk(&mut self) -> std::result::Result<(), BsonFormatError> {
        if self.rows.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(&mut self.rows);
        trace!("Writing BSON chunk of {} rows", rows.len());
        self.write_document(&doc! { "rows": rows })?;
        self.chunk_bytes = 0;
        Ok(())
    }
}

impl FormatWriter for BsonWriter {
    fn write_header(&mut self, columns: &[ColumnDescriptor]) -> Result<()> {
        let manifest: Vec<Bson> = columns
            .iter()
            .map(|c| {
                Bson::Document(doc! {
                    "column": c.name.as_str(),
                    "variant": c.variant_type.alias(),
                })
            })
            .collect();
        self.write_document(&doc! { "columns": manifest })?;
        self.columns = columns.len();
        self.header_written = true;
        Ok(())
    }

    fn write_row(&mut self, row: &[Option<Variant>]) -> Result<()> {
        if !self.header_written {
            return Err(BsonFormatError::HeaderNotWritten.into());
        }
        if row.len() != self.columns {
            return Err(BsonFormatError::Row {
                row: self.rows_written + 1,
                reason: format!("{} values for {} columns", row.len(), self.columns),
            }
            .into());
        }
        let mut values = Vec::with_capacity(row.len() + 1);
        values.push(match null_bitset(row) {
            Some(bits) => binary(bits),
            None => Bson::Null,
        });
        for value in row.iter().flatten() {
            self.chunk_bytes += value.as_bytes().len();
            values.push(match value {
                Variant::String(s) => Bson::String(s.clone()),
                Variant::Binary(b) => binary(b.clone()),
            });
        }
        self.rows.push(Bson::Array(values));
        self.rows_written += 1;
        if self.rows.len() >= ROWS_PER_DOCUMENT || self.chunk_bytes >= MAX_CHUNK_BYTES {
            self.flush_chunk()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.flush_chunk()?;
        self.sink.flush().map_err(BsonFormatError::from)?;
        trace!("BSON container finished with {} documents", self.documents);
        Ok(())
    }
}
