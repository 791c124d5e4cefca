use std::io::Write;

use migrator_core::{ColumnDescriptor, FormatWriter, Result, Variant, VariantType};
use tracing::trace;

use crate::error::CsvFormatError;
use crate::{is_quote_only, EMPTY_SENTINEL};

/// Streams rows as CSV records.
pub struct CsvWriter {
    writer: csv::Writer<Box<dyn Write + Send>>,
    columns: Vec<ColumnDescriptor>,
    header_written: bool,
    rows: u64,
}

impl CsvWriter {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(sink);
        Self {
            writer,
            columns: Vec::new(),
            header_written: false,
            rows: 0,
        }
    }

    fn field(column: &ColumnDescriptor, value: &Option<Variant>) -> std::result::Result<String, CsvFormatError> {
        let text = match (value, column.variant_type) {
            (None, _) => return Ok(String::new()),
            (Some(variant), VariantType::Binary) => hex::encode(variant.as_bytes()),
            (Some(Variant::String(s)), VariantType::String) => s.clone(),
            (Some(Variant::Binary(_)), VariantType::String) => {
                return Err(CsvFormatError::BinaryInStringColumn {
                    column: column.name.clone(),
                })
            }
        };
        if is_quote_only(&text) {
            Ok(text + EMPTY_SENTINEL)
        } else {
            Ok(text)
        }
    }
}

impl FormatWriter for CsvWriter {
    fn write_header(&mut self, columns: &[ColumnDescriptor]) -> Result<()> {
        let aliases: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let alias = c.variant_type.alias();
                if i == 0 {
                    format!("#{alias}")
                } else {
                    alias.to_string()
                }
            })
            .collect();
        if aliases.is_empty() {
            self.writer.write_record(["#"]).map_err(CsvFormatError::from)?;
        } else {
            self.writer.write_record(&aliases).map_err(CsvFormatError::from)?;
        }
        self.writer
            .write_record(columns.iter().map(|c| c.name.as_str()))
            .map_err(CsvFormatError::from)?;
        self.columns = columns.to_vec();
        self.header_written = true;
        Ok(())
    }

    fn write_row(&mut self, row: &[Option<Variant>]) -> Result<()> {
        if !self.header_written {
            return Err(CsvFormatError::HeaderNotWritten.into());
        }
        if row.len() != self.columns.len() {
            return Err(CsvFormatError::FieldCount {
                row: self.rows + 1,
                found: row.len(),
                expected: self.columns.len(),
            }
            .into());
        }
        let fields = self
            .columns
            .iter()
            .zip(row)
            .map(|(column, value)| Self::field(column, value))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.writer.write_record(&fields).map_err(CsvFormatError::from)?;
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().map_err(CsvFormatError::from)?;
        trace!("CSV container finished with {} rows", self.rows);
        Ok(())
    }
}
