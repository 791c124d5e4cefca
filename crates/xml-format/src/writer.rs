use std::io::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use migrator_core::{ColumnDescriptor, FormatWriter, Result, Variant};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::trace;

use crate::error::XmlFormatError;
use crate::{COLUMN, COLUMNS, ROW, ROWSET, VALUE};

pub struct XmlWriter {
    writer: Writer<Box<dyn Write + Send>>,
    columns: usize,
    header_written: bool,
    finished: bool,
    rows_written: u64,
}

impl XmlWriter {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Writer::new(sink),
            columns: 0,
            header_written: false,
            finished: false,
            rows_written: 0,
        }
    }

    fn event(&mut self, event: Event<'_>) -> std::result::Result<(), XmlFormatError> {
        self.writer.write_event(event)?;
        Ok(())
    }

    fn newline(&mut self) -> std::result::Result<(), XmlFormatError> {
        self.event(Event::Text(BytesText::new("\n")))
    }
}

impl FormatWriter for XmlWriter {
    fn write_header(&mut self, columns: &[ColumnDescriptor]) -> Result<()> {
        self.event(Event::Start(BytesStart::new(ROWSET)))?;
        self.newline()?;
        self.event(Event::Start(BytesStart::new(COLUMNS)))?;
        for column in columns {
            let element = BytesStart::new(COLUMN).with_attributes([
                ("name", column.name.as_str()),
                ("variant", column.variant_type.alias()),
            ]);
            self.event(Event::Empty(element))?;
        }
        self.event(Event::End(BytesEnd::new(COLUMNS)))?;
        self.newline()?;
        self.columns = columns.len();
        self.header_written = true;
        Ok(())
    }

    fn write_row(&mut self, row: &[Option<Variant>]) -> Result<()> {
        if !self.header_written {
            return Err(XmlFormatError::HeaderNotWritten.into());
        }
        if row.len() != self.columns {
            return Err(XmlFormatError::Row {
                row: self.rows_written + 1,
                reason: format!("{} values for {} columns", row.len(), self.columns),
            }
            .into());
        }
        self.event(Event::Start(BytesStart::new(ROW)))?;
        for value in row {
            match value {
                None => {
                    let element = BytesStart::new(VALUE).with_attributes([("null", "true")]);
                    self.event(Event::Empty(element))?;
                }
                Some(value) => {
                    let text = match value {
                        Variant::String(s) => s.clone(),
                        Variant::Binary(b) => STANDARD.encode(b),
                    };
                    self.event(Event::Start(BytesStart::new(VALUE)))?;
                    if !text.is_empty() {
                        self.event(Event::Text(BytesText::new(&text)))?;
                    }
                    self.event(Event::End(BytesEnd::new(VALUE)))?;
                }
            }
        }
        self.event(Event::End(BytesEnd::new(ROW)))?;
        self.newline()?;
        self.rows_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.header_written && !self.finished {
            self.event(Event::End(BytesEnd::new(ROWSET)))?;
            self.newline()?;
            self.finished = true;
            trace!("XML container finished with {} rows", self.rows_written);
        }
        self.writer
            .get_mut()
            .flush()
            .map_err(XmlFormatError::from)?;
        Ok(())
    }
}
