//! Error types for the CSV format.

use migrator_core::MigratorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CsvFormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid hex in column '{column}': {source}")]
    Hex {
        column: String,
        #[source]
        source: hex::FromHexError,
    },

    #[error("Row {row} has {found} fields, expected {expected}")]
    FieldCount {
        row: u64,
        found: usize,
        expected: usize,
    },

    #[error("Column '{column}' holds binary data but is declared as string")]
    BinaryInStringColumn { column: String },

    #[error("Missing column names line")]
    MissingHeader,

    #[error("Rows written before the header")]
    HeaderNotWritten,
}

impl From<CsvFormatError> for MigratorError {
    fn from(err: CsvFormatError) -> Self {
        match err {
            CsvFormatError::Io(e) => MigratorError::Io(e),
            CsvFormatError::Csv(e) if e.is_io_error() => match e.into_kind() {
                csv::ErrorKind::Io(io) => MigratorError::Io(io),
                other => MigratorError::format(format!("{other:?}")),
            },
            other => MigratorError::format(other),
        }
    }
}
