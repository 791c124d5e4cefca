//! Error types for the XML format.

use migrator_core::MigratorError;
use quick_xml::events::attributes::AttrError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlFormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attr(#[from] AttrError),

    #[error("Invalid base64 in column '{column}': {source}")]
    Base64 {
        column: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Malformed header: {0}")]
    Header(String),

    #[error("Malformed row {row}: {reason}")]
    Row { row: u64, reason: String },

    #[error("Rows written before the header")]
    HeaderNotWritten,

    #[error("Document ends before </rowset> after {rows} rows")]
    Truncated { rows: u64 },
}

impl From<XmlFormatError> for MigratorError {
    fn from(err: XmlFormatError) -> Self {
        match err {
            XmlFormatError::Io(e) => MigratorError::Io(e),
            truncated @ XmlFormatError::Truncated { .. } => MigratorError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                truncated.to_string(),
            )),
            other => MigratorError::format(other),
        }
    }
}
