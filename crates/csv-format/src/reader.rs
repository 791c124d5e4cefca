use std::io::{BufRead, BufReader, Cursor, Read};

use migrator_core::{ColumnDescriptor, FormatReader, Result, Variant, VariantRow, VariantType};
use tracing::debug;

use crate::error::CsvFormatError;
use crate::{is_quote_only, EMPTY_SENTINEL};

enum State {
    Start(BufReader<Box<dyn Read + Send>>),
    Rows(csv::Reader<Box<dyn Read + Send>>),
    Failed,
}

/// Reads a CSV container.
///
/// A container without the leading alias line is accepted; every column is
/// then read as a string.
pub struct CsvReader {
    state: State,
    columns: Vec<ColumnDescriptor>,
    record: csv::StringRecord,
    rows: u64,
}

impl CsvReader {
    pub fn new(source: Box<dyn Read + Send>) -> Self {
        Self {
            state: State::Start(BufReader::new(source)),
            columns: Vec::new(),
            record: csv::StringRecord::new(),
            rows: 0,
        }
    }

    fn open(&mut self) -> std::result::Result<(), CsvFormatError> {
        let mut source = match std::mem::replace(&mut self.state, State::Failed) {
            State::Start(source) => source,
            other => {
                self.state = other;
                return Ok(());
            }
        };

        let mut first = String::new();
        source.read_line(&mut first)?;
        let (aliases, rest): (Vec<VariantType>, Box<dyn Read + Send>) =
            match first.strip_prefix('#') {
                Some(line) => {
                    let aliases = line
                        .trim_end_matches(['\r', '\n'])
                        .split(',')
                        .map(|alias| VariantType::from_alias(alias).unwrap_or_default())
                        .collect();
                    (aliases, Box::new(source))
                }
                None => {
                    debug!("CSV container has no variant line, reading all columns as strings");
                    (Vec::new(), Box::new(Cursor::new(first.into_bytes()).chain(source)))
                }
            };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(rest);
        let mut names = csv::StringRecord::new();
        if !reader.read_record(&mut names)? {
            return Err(CsvFormatError::MissingHeader);
        }
        self.columns = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let variant_type = aliases.get(i).copied().unwrap_or_default();
                ColumnDescriptor::from_header(name, variant_type)
            })
            .collect();
        self.state = State::Rows(reader);
        Ok(())
    }

    fn value(column: &ColumnDescriptor, field: &str) -> std::result::Result<Option<Variant>, CsvFormatError> {
        if field.is_empty() {
            return Ok(None);
        }
        let text = if field.len() >= EMPTY_SENTINEL.len() && is_quote_only(field) {
            &field[EMPTY_SENTINEL.len()..]
        } else {
            field
        };
        match column.variant_type {
            VariantType::String => Ok(Some(Variant::String(text.to_string()))),
            VariantType::Binary => hex::decode(text)
                .map(|bytes| Some(Variant::Binary(bytes)))
                .map_err(|source| CsvFormatError::Hex {
                    column: column.name.clone(),
                    source,
                }),
        }
    }
}

impl FormatReader for CsvReader {
    fn read_header(&mut self) -> Result<Vec<ColumnDescriptor>> {
        self.open()?;
        Ok(self.columns.clone())
    }

    fn read_row(&mut self) -> Result<Option<VariantRow>> {
        self.open()?;
        let State::Rows(reader) = &mut self.state else {
            return Err(CsvFormatError::MissingHeader.into());
        };
        if !reader.read_record(&mut self.record).map_err(CsvFormatError::from)? {
            return Ok(None);
        }
        self.rows += 1;
        if self.record.len() != self.columns.len() {
            return Err(CsvFormatError::FieldCount {
                row: self.rows,
                found: self.record.len(),
                expected: self.columns.len(),
            }
            .into());
        }
        let row = self
            .columns
            .iter()
            .zip(self.record.iter())
            .map(|(column, field)| Self::value(column, field))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Some(row))
    }
}
