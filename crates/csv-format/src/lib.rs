//! CSV container format.
//!
//! Layout of a container:
//!
//! ```text
//! #string,binary,string
//! id,payload,note
//! 1,00ff10,
//! 2,,""""
//! ```
//!
//! - the first line is `#` followed by the comma-joined variant aliases,
//! - the second line holds the column names,
//! - binary values are lowercase hex,
//! - an empty field is SQL NULL,
//! - a value made only of quote characters, the empty string included, is
//!   written with two extra quote characters so it never reads as NULL.

mod error;
mod reader;
mod writer;

pub use error::CsvFormatError;
pub use reader::CsvReader;
pub use writer::CsvWriter;

use std::io::{Read, Write};

use migrator_core::{Format, FormatReader, FormatWriter};

/// Quote-only marker appended to quote-only values.
pub(crate) const EMPTY_SENTINEL: &str = "\"\"";

/// Whether `value` consists only of quote characters (or is empty).
pub(crate) fn is_quote_only(value: &str) -> bool {
    value.chars().all(|c| c == '"')
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvFormat;

impl Format for CsvFormat {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn writer(&self, sink: Box<dyn Write + Send>) -> Box<dyn FormatWriter> {
        Box::new(CsvWriter::new(sink))
    }

    fn reader(&self, source: Box<dyn Read + Send>) -> Box<dyn FormatReader> {
        Box::new(CsvReader::new(source))
    }
}

#[cfg(test)]
mod tests;
