//! Error types for the BSON format.

use migrator_core::MigratorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BsonFormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("BSON serialization error: {0}")]
    Serialize(#[from] bson::ser::Error),

    #[error("BSON deserialization error: {0}")]
    Deserialize(#[from] bson::de::Error),

    #[error("Malformed header document: {0}")]
    Header(String),

    #[error("Malformed chunk document: {0}")]
    Chunk(String),

    #[error("Malformed row {row}: {reason}")]
    Row { row: u64, reason: String },

    #[error("Rows written before the header")]
    HeaderNotWritten,
}

impl From<BsonFormatError> for MigratorError {
    fn from(err: BsonFormatError) -> Self {
        match err {
            BsonFormatError::Io(e) => MigratorError::Io(e),
            other => MigratorError::format(other),
        }
    }
}
