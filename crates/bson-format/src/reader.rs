use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};

use bson::{Bson, Document};
use migrator_core::{ColumnDescriptor, FormatReader, Result, Variant, VariantRow, VariantType};

use crate::error::BsonFormatError;
use crate::is_null_at;

/// Reads a BSON container.
pub struct BsonReader {
    source: BufReader<Box<dyn Read + Send>>,
    columns: Option<Vec<ColumnDescriptor>>,
    pending: VecDeque<Bson>,
    rows: u64,
}

impl BsonReader {
    pub fn new(source: Box<dyn Read + Send>) -> Self {
        Self {
            source: BufReader::new(source),
            columns: None,
            pending: VecDeque::new(),
            rows: 0,
        }
    }

    /// Next document, or `None` at a clean end of stream.
    fn next_document(&mut self) -> std::result::Result<Option<Document>, BsonFormatError> {
        if self.source.fill_buf()?.is_empty() {
            return Ok(None);
        }
        Ok(Some(Document::from_reader(&mut self.source)?))
    }

    fn header(&mut self) -> std::result::Result<&[ColumnDescriptor], BsonFormatError> {
        if self.columns.is_none() {
            let document = self
                .next_document()?
                .ok_or_else(|| BsonFormatError::Header("empty container".to_string()))?;
            let manifest = document
                .get_array("columns")
                .map_err(|e| BsonFormatError::Header(e.to_string()))?;
            let columns = manifest
                .iter()
                .map(|entry| {
                    let entry = entry
                        .as_document()
                        .ok_or_else(|| BsonFormatError::Header("column entry is not a document".to_string()))?;
                    let name = entry
                        .get_str("column")
                        .map_err(|e| BsonFormatError::Header(e.to_string()))?;
                    let variant_type = entry
                        .get_str("variant")
                        .ok()
                        .and_then(|alias| VariantType::from_alias(alias).ok())
                        .unwrap_or_default();
                    Ok(ColumnDescriptor::from_header(name, variant_type))
                })
                .collect::<std::result::Result<Vec<_>, BsonFormatError>>()?;
            self.columns = Some(columns);
        }
        Ok(self.columns.as_deref().unwrap_or_default())
    }

    fn decode_row(&self, row: Bson) -> std::result::Result<VariantRow, BsonFormatError> {
        let width = self.columns.as_ref().map_or(0, Vec::len);
        let malformed = |reason: String| BsonFormatError::Row {
            row: self.rows,
            reason,
        };
        let Bson::Array(values) = row else {
            return Err(malformed("row is not an array".to_string()));
        };
        let mut values = values.into_iter();
        let bits = match values.next() {
            Some(Bson::Null) => Vec::new(),
            Some(Bson::Binary(binary)) => binary.bytes,
            _ => return Err(malformed("row does not start with a null marker".to_string())),
        };
        let mut decoded = Vec::with_capacity(width);
        for index in 0..width {
            if is_null_at(&bits, index) {
                decoded.push(None);
                continue;
            }
            let value = match values.next() {
                Some(Bson::String(s)) => Variant::String(s),
                Some(Bson::Binary(binary)) => Variant::Binary(binary.bytes),
                Some(other) => {
                    return Err(malformed(format!(
                        "unexpected {:?} value in column {index}",
                        other.element_type()
                    )))
                }
                None => return Err(malformed(format!("missing value for column {index}"))),
            };
            decoded.push(Some(value));
        }
        if values.next().is_some() {
            return Err(malformed(format!("more values than the {width} columns")));
        }
        Ok(decoded)
    }
}

impl FormatReader for BsonReader {
    fn read_header(&mut self) -> Result<Vec<ColumnDescriptor>> {
        Ok(self.header()?.to_vec())
    }

    fn read_row(&mut self) -> Result<Option<VariantRow>> {
        self.header()?;
        while self.pending.is_empty() {
            let Some(mut document) = self.next_document()? else {
                return Ok(None);
            };
            match document.remove("rows") {
                Some(Bson::Array(rows)) => self.pending.extend(rows),
                _ => return Err(BsonFormatError::Chunk("missing rows array".to_string()).into()),
            }
        }
        let Some(row) = self.pending.pop_front() else {
            return Ok(None);
        };
        self.rows += 1;
        Ok(Some(self.decode_row(row)?))
    }
}
