use std::io::Write;
use std::sync::{Arc, Mutex};

use migrator_core::{ColumnDescriptor, Format, MigratorError, Variant, VariantRow, VariantType};

use crate::CsvFormat;

/// Sink whose bytes stay readable after the writer is dropped.
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

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
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
    let mut writer = CsvFormat.writer(Box::new(buffer.clone()));
    writer.write_header(columns).unwrap();
    for row in rows {
        writer.write_row(row).unwrap();
    }
    writer.finish().unwrap();
    buffer.contents()
}

fn read(text: &str) -> (Vec<ColumnDescriptor>, Vec<VariantRow>) {
    let mut reader = CsvFormat.reader(Box::new(std::io::Cursor::new(text.as_bytes().to_vec())));
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
fn test_header_lines() {
    let text = write(&columns(), &[]);
    assert_eq!(text, "#string,binary,string\nid,payload,note\n");
}

#[test]
fn test_round_trip_preserves_nulls_and_empty_strings() {
    let rows = vec![
        vec![s("1"), Some(Variant::Binary(vec![0x00, 0xff, 0x10])), None],
        vec![s("2"), None, s("")],
        vec![s("3"), Some(Variant::Binary(vec![])), s("\"")],
        vec![s("4"), None, s("\"\"")],
        vec![s("5"), None, s("a,b\n\"quoted\"")],
    ];
    let text = write(&columns(), &rows);
    let (header, read_rows) = read(&text);
    assert_eq!(header, columns());
    assert_eq!(read_rows, rows);
}

#[test]
fn test_null_and_empty_string_are_distinct_on_disk() {
    let text = write(&columns(), &[vec![s("1"), None, None], vec![s("2"), None, s("")]]);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[2], "1,,");
    assert_eq!(lines[3], "2,,\"\"\"\"\"\"");
}

#[test]
fn test_single_null_column() {
    let columns = vec![ColumnDescriptor::from_header("only", VariantType::String)];
    let rows = vec![vec![None], vec![s("")], vec![s("x")]];
    let (_, read_rows) = read(&write(&columns, &rows));
    assert_eq!(read_rows, rows);
}

#[test]
fn test_missing_variant_line_defaults_to_string() {
    let (header, rows) = read("id,name\n1,alice\n");
    assert_eq!(
        header,
        vec![
            ColumnDescriptor::from_header("id", VariantType::String),
            ColumnDescriptor::from_header("name", VariantType::String),
        ]
    );
    assert_eq!(rows, vec![vec![s("1"), s("alice")]]);
}

#[test]
fn test_bad_row_is_recoverable_and_reader_moves_on() {
    let text = "#string,binary\nid,payload\n1,zz\n2\n3,0a\n";
    let mut reader = CsvFormat.reader(Box::new(std::io::Cursor::new(text.as_bytes().to_vec())));
    reader.read_header().unwrap();

    let err = reader.read_row().unwrap_err();
    assert!(matches!(err, MigratorError::Format(_)));
    let err = reader.read_row().unwrap_err();
    assert!(err.is_row_recoverable());
    assert_eq!(
        reader.read_row().unwrap(),
        Some(vec![s("3"), Some(Variant::Binary(vec![0x0a]))])
    );
    assert_eq!(reader.read_row().unwrap(), None);
}

#[test]
fn test_rows_before_header_are_rejected() {
    let mut writer = CsvFormat.writer(Box::new(SharedBuffer::default()));
    assert!(writer.write_row(&[s("1")]).is_err());
}

#[test]
fn test_empty_input_has_no_header() {
    let mut reader = CsvFormat.reader(Box::new(std::io::empty()));
    assert!(reader.read_header().is_err());
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rows.csv");
    {
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = CsvFormat.writer(Box::new(std::io::BufWriter::new(file)));
        writer.write_header(&columns()).unwrap();
        writer
            .write_row(&[s("1"), Some(Variant::Binary(vec![1, 2])), s("n")])
            .unwrap();
        writer.finish().unwrap();
    }
    let file = std::fs::File::open(&path).unwrap();
    let mut reader = CsvFormat.reader(Box::new(file));
    assert_eq!(reader.read_header().unwrap().len(), 3);
    assert!(reader.read_row().unwrap().is_some());
    assert!(reader.read_row().unwrap().is_none());
}
