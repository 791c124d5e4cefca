//! XML container format.
//!
//! ```text
//! <rowset>
//! <columns><column name="id" variant="string"/><column name="photo" variant="binary"/></columns>
//! <row><value>1</value><value>iVBORw0K</value></row>
//! <row><value>2</value><value null="true"/></row>
//! </rowset>
//! ```
//!
//! Binary values are standard base64. A `value` element carrying
//! `null="true"` is SQL NULL; any other `value`, empty ones included, is a
//! string.

mod error;
mod reader;
mod writer;

pub use error::XmlFormatError;
pub use reader::XmlReader;
pub use writer::XmlWriter;

use std::io::{Read, Write};

use migrator_core::{Format, FormatReader, FormatWriter};

pub(crate) const ROWSET: &str = "rowset";
pub(crate) const COLUMNS: &str = "columns";
pub(crate) const COLUMN: &str = "column";
pub(crate) const ROW: &str = "row";
pub(crate) const VALUE: &str = "value";

#[derive(Debug, Default, Clone, Copy)]
pub struct XmlFormat;

impl Format for XmlFormat {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn writer(&self, sink: Box<dyn Write + Send>) -> Box<dyn FormatWriter> {
        Box::new(XmlWriter::new(sink))
    }

    fn reader(&self, source: Box<dyn Read + Send>) -> Box<dyn FormatReader> {
        Box::new(XmlReader::new(source))
    }
}

#[cfg(test)]
mod tests;
