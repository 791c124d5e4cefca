use std::io::{BufReader, Read};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use migrator_core::{ColumnDescriptor, FormatReader, Result, Variant, VariantRow, VariantType};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::XmlFormatError;
use crate::{COLUMN, COLUMNS, ROW, ROWSET, VALUE};

/// Owned view of the parser events the reader cares about.
enum Node {
    Open { name: String, attrs: Vec<(String, String)>, empty: bool },
    Close(String),
    Text(String),
    Eof,
}

/// A `value` element as it appeared in the document.
enum RawValue {
    Null,
    Text(String),
}

pub struct XmlReader {
    reader: Reader<BufReader<Box<dyn Read + Send>>>,
    buf: Vec<u8>,
    columns: Option<Vec<ColumnDescriptor>>,
    rows: u64,
    done: bool,
}

fn open_node(element: &BytesStart<'_>, empty: bool) -> std::result::Result<Node, XmlFormatError> {
    let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in element.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        attrs.push((key, attr.unescape_value()?.into_owned()));
    }
    Ok(Node::Open { name, attrs, empty })
}

fn attribute<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

impl XmlReader {
    pub fn new(source: Box<dyn Read + Send>) -> Self {
        Self {
            reader: Reader::from_reader(BufReader::new(source)),
            buf: Vec::new(),
            columns: None,
            rows: 0,
            done: false,
        }
    }

    fn next_node(&mut self) -> std::result::Result<Node, XmlFormatError> {
        loop {
            self.buf.clear();
            let node = match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) => open_node(&e, false)?,
                Event::Empty(e) => open_node(&e, true)?,
                Event::End(e) => Node::Close(String::from_utf8_lossy(e.name().as_ref()).into_owned()),
                Event::Text(e) => Node::Text(e.unescape()?.into_owned()),
                Event::CData(e) => Node::Text(String::from_utf8_lossy(&e.into_inner()).into_owned()),
                Event::Eof => Node::Eof,
                // declarations, comments and processing instructions
                _ => continue,
            };
            return Ok(node);
        }
    }

    /// Next element event, skipping whitespace between elements.
    fn next_element(&mut self) -> std::result::Result<Node, XmlFormatError> {
        loop {
            match self.next_node()? {
                Node::Text(text) if text.trim().is_empty() => continue,
                node => return Ok(node),
            }
        }
    }

    fn header(&mut self) -> std::result::Result<&[ColumnDescriptor], XmlFormatError> {
        if self.columns.is_none() {
            match self.next_element()? {
                Node::Open { name, empty: false, .. } if name == ROWSET => {}
                _ => return Err(XmlFormatError::Header(format!("expected <{ROWSET}>"))),
            }
            match self.next_element()? {
                Node::Open { name, empty, .. } if name == COLUMNS => {
                    let columns = if empty { Vec::new() } else { self.read_columns()? };
                    self.columns = Some(columns);
                }
                _ => return Err(XmlFormatError::Header(format!("expected <{COLUMNS}>"))),
            }
        }
        Ok(self.columns.as_deref().unwrap_or_default())
    }

    fn read_columns(&mut self) -> std::result::Result<Vec<ColumnDescriptor>, XmlFormatError> {
        let mut columns = Vec::new();
        loop {
            match self.next_element()? {
                Node::Open { name, attrs, empty } if name == COLUMN => {
                    let column = attribute(&attrs, "name")
                        .ok_or_else(|| XmlFormatError::Header("column without a name".to_string()))?;
                    let variant_type = attribute(&attrs, "variant")
                        .and_then(|alias| VariantType::from_alias(alias).ok())
                        .unwrap_or_default();
                    columns.push(ColumnDescriptor::from_header(column, variant_type));
                    if !empty {
                        self.skip_to_close(COLUMN)?;
                    }
                }
                Node::Close(name) if name == COLUMNS => return Ok(columns),
                _ => return Err(XmlFormatError::Header("unexpected content in column list".to_string())),
            }
        }
    }

    fn skip_to_close(&mut self, element: &str) -> std::result::Result<(), XmlFormatError> {
        loop {
            match self.next_node()? {
                Node::Close(name) if name == element => return Ok(()),
                Node::Eof => return Err(XmlFormatError::Header(format!("unterminated <{element}>"))),
                _ => {}
            }
        }
    }

    /// Reads the whole row before judging it, so a bad row does not derail
    /// the rows after it.
    fn read_raw_row(&mut self) -> std::result::Result<Vec<RawValue>, XmlFormatError> {
        let mut values = Vec::new();
        let mut problem = None;
        loop {
            match self.next_element()? {
                Node::Open { name, attrs, empty } if name == VALUE => {
                    let null = attribute(&attrs, "null") == Some("true");
                    let text = if empty { String::new() } else { self.read_value_text()? };
                    values.push(if null { RawValue::Null } else { RawValue::Text(text) });
                }
                Node::Close(name) if name == ROW => break,
                Node::Eof => {
                    self.done = true;
                    return Err(XmlFormatError::Truncated { rows: self.rows.saturating_sub(1) });
                }
                Node::Open { name, empty, .. } => {
                    problem.get_or_insert_with(|| format!("unexpected <{name}> element"));
                    if !empty {
                        self.skip_to_close(&name)?;
                    }
                }
                Node::Close(name) => {
                    problem.get_or_insert_with(|| format!("unexpected </{name}>"));
                }
                Node::Text(_) => {
                    problem.get_or_insert_with(|| "text outside of a value".to_string());
                }
            }
        }
        match problem {
            Some(reason) => Err(XmlFormatError::Row { row: self.rows, reason }),
            None => Ok(values),
        }
    }

    fn read_value_text(&mut self) -> std::result::Result<String, XmlFormatError> {
        let mut text = String::new();
        loop {
            match self.next_node()? {
                Node::Text(chunk) => text.push_str(&chunk),
                Node::Close(name) if name == VALUE => return Ok(text),
                _ => {
                    return Err(XmlFormatError::Row {
                        row: self.rows,
                        reason: "nested content in value".to_string(),
                    })
                }
            }
        }
    }

    fn decode(&self, raw: Vec<RawValue>) -> std::result::Result<VariantRow, XmlFormatError> {
        let columns = self.columns.as_deref().unwrap_or_default();
        if raw.len() != columns.len() {
            return Err(XmlFormatError::Row {
                row: self.rows,
                reason: format!("{} values for {} columns", raw.len(), columns.len()),
            });
        }
        raw.into_iter()
            .zip(columns)
            .map(|(value, column)| match value {
                RawValue::Null => Ok(None),
                RawValue::Text(text) => match column.variant_type {
                    VariantType::String => Ok(Some(Variant::String(text))),
                    VariantType::Binary => STANDARD
                        .decode(text.trim())
                        .map(|bytes| Some(Variant::Binary(bytes)))
                        .map_err(|source| XmlFormatError::Base64 {
                            column: column.name.clone(),
                            source,
                        }),
                },
            })
            .collect()
    }
}

impl FormatReader for XmlReader {
    fn read_header(&mut self) -> Result<Vec<ColumnDescriptor>> {
        Ok(self.header()?.to_vec())
    }

    fn read_row(&mut self) -> Result<Option<VariantRow>> {
        self.header()?;
        if self.done {
            return Ok(None);
        }
        let raw = loop {
            match self.next_element()? {
                Node::Open { name, empty, .. } if name == ROW => {
                    self.rows += 1;
                    if empty {
                        break Vec::new();
                    }
                    break self.read_raw_row()?;
                }
                Node::Close(name) if name == ROWSET => {
                    self.done = true;
                    return Ok(None);
                }
                Node::Eof => {
                    self.done = true;
                    return Err(XmlFormatError::Truncated { rows: self.rows }.into());
                }
                Node::Open { name, empty, .. } => {
                    if !empty {
                        self.skip_to_close(&name)?;
                    }
                    return Err(XmlFormatError::Row {
                        row: self.rows + 1,
                        reason: format!("unexpected <{name}> element"),
                    }
                    .into());
                }
                _ => {
                    return Err(XmlFormatError::Row {
                        row: self.rows + 1,
                        reason: "unexpected content between rows".to_string(),
                    }
                    .into())
                }
            }
        };
        Ok(Some(self.decode(raw)?))
    }
}
