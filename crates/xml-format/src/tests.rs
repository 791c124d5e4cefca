use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

use migrator_core::{ColumnDescriptor, Format, MigratorError, Variant, VariantRow, VariantType};

use crate::XmlFormat;

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn columns() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::from_header("id", VariantType::String),
        ColumnDescriptor::from_header("payload", VariantType::Binary),
        ColumnDescriptor::from_header("note", VariantType::String),
    ]
}

fn write(columns: &[ColumnDescriptor], rows: &[VariantRow]) -> String {
    let buffer = SharedBuffer::default();
    let mut writer = XmlFormat.writer(Box::new(buffer.clone()));
    writer.write_header(columns).unwrap();
    for row in rows {
        writer.write_row(row).unwrap();
    }
    writer.finish().unwrap();
    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}

fn read(text: &str) -> (Vec<ColumnDescriptor>, Vec<VariantRow>) {
    let mut reader = XmlFormat.reader(Box::new(Cursor::new(text.as_bytes().to_vec())));
    let header = reader.read_header().unwrap();
    let mut rows = Vec::new();
    while let Some(row) = reader.read_row().unwrap() {
        rows.push(row);
    }
    (header, rows)
}

fn s(value: &str) -> Option<Variant> {
    Some(Variant::String(value.to_string()))
}

#[test]
fn test_document_layout() {
    let text = write(&columns(), &[vec![s("1"), Some(Variant::Binary(vec![0, 1, 2])), None]]);
    assert!(text.starts_with("<rowset>\n<columns>"));
    assert!(text.contains(r#"<column name="payload" variant="binary"/>"#));
    assert!(text.contains(r#"<row><value>1</value><value>AAEC</value><value null="true"/></row>"#));
    assert!(text.trim_end().ends_with("</rowset>"));
}

#[test]
fn test_round_trip_preserves_values_and_nulls() {
    let rows = vec![
        vec![s("1"), Some(Variant::Binary(vec![255, 0, 16])), s("plain")],
        vec![s("2"), None, s("")],
        vec![None, Some(Variant::Binary(vec![])), None],
        vec![s("  padded  "), None, s("<tag> & \"quotes\" 'apos'\nsecond line")],
    ];
    let (header, decoded) = read(&write(&columns(), &rows));
    assert_eq!(header, columns());
    assert_eq!(decoded, rows);
}

#[test]
fn test_empty_string_and_null_are_distinct() {
    let text = write(&columns()[..1], &[vec![s("")], vec![None]]);
    assert!(text.contains("<value></value>"));
    assert!(text.contains(r#"<value null="true"/>"#));
    let (_, rows) = read(&text);
    assert_eq!(rows, vec![vec![s("")], vec![None]]);
}

#[test]
fn test_hand_written_document_with_comments_and_cdata() {
    let text = r#"<?xml version="1.0"?>
<rowset>
  <!-- exported by hand -->
  <columns>
    <column name="a" variant="string"/>
    <column name="b"/>
  </columns>
  <row><value><![CDATA[x < y]]></value><value/></row>
</rowset>
"#;
    let (header, rows) = read(text);
    assert_eq!(header[1].variant_type, VariantType::String);
    assert_eq!(rows, vec![vec![s("x < y"), s("")]]);
}

#[test]
fn test_bad_rows_are_recoverable() {
    let text = r#"<rowset><columns><column name="a" variant="binary"/></columns>
<row><value>not base64!</value></row>
<row><value>AQ==</value><value>extra</value></row>
<row><value>AQ==</value></row>
</rowset>"#;
    let mut reader = XmlFormat.reader(Box::new(Cursor::new(text.as_bytes().to_vec())));
    assert!(matches!(reader.read_row().unwrap_err(), MigratorError::Format(_)));
    assert!(matches!(reader.read_row().unwrap_err(), MigratorError::Format(_)));
    assert_eq!(
        reader.read_row().unwrap().unwrap(),
        vec![Some(Variant::Binary(vec![1]))]
    );
    assert!(reader.read_row().unwrap().is_none());
    assert!(reader.read_row().unwrap().is_none());
}

#[test]
fn test_row_before_header_is_rejected() {
    let mut writer = XmlFormat.writer(Box::new(SharedBuffer::default()));
    assert!(writer.write_row(&[s("1")]).is_err());
}

#[test]
fn test_missing_rowset_is_a_header_error() {
    let mut reader = XmlFormat.reader(Box::new(Cursor::new(b"<table/>".to_vec())));
    assert!(matches!(reader.read_header().unwrap_err(), MigratorError::Format(_)));
}

#[test]
fn test_document_cut_before_rowset_end_is_truncated() {
    let full = write(&columns(), &[vec![s("1"), None, s("a")], vec![s("2"), None, s("b")]]);
    let cut = &full[..full.find("<row><value>2").unwrap()];
    let mut reader = XmlFormat.reader(Box::new(Cursor::new(cut.as_bytes().to_vec())));
    assert_eq!(reader.read_row().unwrap().unwrap(), vec![s("1"), None, s("a")]);
    let err = reader.read_row().unwrap_err();
    assert!(!err.is_row_recoverable());
    assert!(err.to_string().contains("ends before </rowset> after 1 rows"));
    assert!(reader.read_row().unwrap().is_none());

    let mid_row = &full[..full.find("<value>b").unwrap()];
    let mut reader = XmlFormat.reader(Box::new(Cursor::new(mid_row.as_bytes().to_vec())));
    reader.read_row().unwrap();
    assert!(matches!(reader.read_row().unwrap_err(), MigratorError::Io(_)));
}
