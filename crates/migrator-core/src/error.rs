//! Error types for the extraction & encoding engine.
//!
//! Resolver and catalog errors are fatal to the table being migrated. A
//! [`MigratorError::Format`] raised for a single row may be recovered from
//! when the reader runs in lenient mode.

use thiserror::Error;

use crate::signature::Signature;

/// Errors raised by the migration engine.
#[derive(Debug, Error)]
pub enum MigratorError {
    /// No registered capability matches the signature and there is no default.
    #[error("No capability registered for {signature} and no default available")]
    Resolution { signature: Signature },

    /// The type is not mapped in the type catalog or in the wire format.
    #[error("Unsupported type: code {code}{}", type_name_suffix(.name))]
    UnsupportedType { code: i32, name: Option<String> },

    /// A serialized value or a container could not be parsed.
    #[error("Format error: {0}")]
    Format(String),

    /// A value needs coercion but no adapter is registered for its kind.
    #[error("No adapter registered to convert {from} into {to}")]
    AdapterMissing { from: String, to: String },

    /// Stream fault while reading or writing a container.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Opaque database error reported by a connection backend.
    #[error("SQL error: {0}")]
    Sql(String),

    /// The owning job was stopped between two split boundaries.
    #[error("Job stopped")]
    Stopped,
}

impl MigratorError {
    /// Wrap any database driver error.
    pub fn sql(err: impl std::fmt::Display) -> Self {
        MigratorError::Sql(err.to_string())
    }

    /// Build a format error from anything printable.
    pub fn format(msg: impl std::fmt::Display) -> Self {
        MigratorError::Format(msg.to_string())
    }

    pub fn unsupported(code: i32, name: Option<&str>) -> Self {
        MigratorError::UnsupportedType {
            code,
            name: name.map(str::to_string),
        }
    }

    /// Whether a lenient reader may skip the row that raised this error.
    pub fn is_row_recoverable(&self) -> bool {
        matches!(self, MigratorError::Format(_))
    }
}

fn type_name_suffix(name: &Option<String>) -> String {
    match name {
        Some(n) => format!(" ({n})"),
        None => String::new(),
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, MigratorError>;
