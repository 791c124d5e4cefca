//! Value representations crossing the engine.
//!
//! - [`SqlValue`] is what a connection backend reads from and binds into a
//!   database. Its discriminant, [`ValueKind`], plays the role of the host
//!   type when the catalog looks up adapters.
//! - [`Variant`] is the only representation handed to a wire format. Null is
//!   `Option<Variant>::None`.
//! - [`ColumnDescriptor`] is one entry of a container's schema header.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MigratorError;

/// Native database value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact numeric kept in its textual form to preserve precision.
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Timestamp without time zone.
    Timestamp(NaiveDateTime),
    /// Timestamp with time zone, normalized to UTC.
    TimestampTz(DateTime<Utc>),
    /// Large binary object handle.
    Blob(Lob<Vec<u8>>),
    /// Large character object handle.
    Clob(Lob<String>),
    /// Vendor row identifier.
    RowId(String),
}

/// Content of a large object as returned by a backend.
///
/// Backends materialize LOBs eagerly; the wrapper keeps LOB columns distinct
/// from plain binary/text so the catalog adapters decide how they surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Lob<T>(pub T);

/// Discriminant of [`SqlValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Decimal,
    Text,
    Bytes,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Blob,
    Clob,
    RowId,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl SqlValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            SqlValue::Null => ValueKind::Null,
            SqlValue::Bool(_) => ValueKind::Bool,
            SqlValue::Int(_) => ValueKind::Int,
            SqlValue::Float(_) => ValueKind::Float,
            SqlValue::Decimal(_) => ValueKind::Decimal,
            SqlValue::Text(_) => ValueKind::Text,
            SqlValue::Bytes(_) => ValueKind::Bytes,
            SqlValue::Date(_) => ValueKind::Date,
            SqlValue::Time(_) => ValueKind::Time,
            SqlValue::Timestamp(_) => ValueKind::Timestamp,
            SqlValue::TimestampTz(_) => ValueKind::TimestampTz,
            SqlValue::Blob(_) => ValueKind::Blob,
            SqlValue::Clob(_) => ValueKind::Clob,
            SqlValue::RowId(_) => ValueKind::RowId,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn text(value: impl Into<String>) -> Self {
        SqlValue::Text(value.into())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) | SqlValue::Decimal(s) | SqlValue::RowId(s) => Some(s),
            SqlValue::Clob(Lob(s)) => Some(s),
            _ => None,
        }
    }

    /// Render the value as an SQL literal, for literal-mode statements.
    pub fn to_sql_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Decimal(d) => d.clone(),
            other => format!("'{}'", other.to_string().replace('\'', "''")),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(b) => write!(f, "{b}"),
            SqlValue::Int(i) => write!(f, "{i}"),
            SqlValue::Float(v) => write!(f, "{v}"),
            SqlValue::Decimal(s) | SqlValue::Text(s) | SqlValue::RowId(s) => f.write_str(s),
            SqlValue::Clob(Lob(s)) => f.write_str(s),
            SqlValue::Bytes(b) | SqlValue::Blob(Lob(b)) => write!(f, "<{} bytes>", b.len()),
            SqlValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            SqlValue::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
            SqlValue::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f")),
            SqlValue::TimestampTz(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

/// A row as produced by a cursor: one native value per column.
pub type Row = Vec<SqlValue>;

/// Parameter bound into a statement.
///
/// Nulls carry the SQL type code of the target parameter so that backends
/// needing typed nulls can bind them correctly.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundParam {
    Value(SqlValue),
    Null(i32),
}

impl BoundParam {
    pub fn into_value(self) -> SqlValue {
        match self {
            BoundParam::Value(value) => value,
            BoundParam::Null(_) => SqlValue::Null,
        }
    }

    pub fn as_value(&self) -> &SqlValue {
        match self {
            BoundParam::Value(value) => value,
            BoundParam::Null(_) => &SqlValue::Null,
        }
    }
}

impl From<SqlValue> for BoundParam {
    fn from(value: SqlValue) -> Self {
        BoundParam::Value(value)
    }
}

/// Wire value: either a string or raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variant {
    String(String),
    Binary(Vec<u8>),
}

impl Variant {
    pub fn variant_type(&self) -> VariantType {
        match self {
            Variant::String(_) => VariantType::String,
            Variant::Binary(_) => VariantType::Binary,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            Variant::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Variant::String(s) => s.as_bytes(),
            Variant::Binary(b) => b,
        }
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}

impl From<Vec<u8>> for Variant {
    fn from(value: Vec<u8>) -> Self {
        Variant::Binary(value)
    }
}

/// Variant type recorded in a container header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantType {
    #[default]
    String,
    Binary,
}

impl VariantType {
    pub fn alias(&self) -> &'static str {
        match self {
            VariantType::String => "string",
            VariantType::Binary => "binary",
        }
    }

    /// Parse a header alias; an empty alias means String.
    pub fn from_alias(alias: &str) -> Result<Self, MigratorError> {
        match alias.trim().to_ascii_lowercase().as_str() {
            "" | "string" => Ok(VariantType::String),
            "binary" => Ok(VariantType::Binary),
            other => Err(MigratorError::format(format!(
                "unknown variant type alias '{other}'"
            ))),
        }
    }
}

impl FromStr for VariantType {
    type Err = MigratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_alias(s)
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.alias())
    }
}

/// Column metadata reported by a cursor or by a target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub type_code: i32,
    pub type_name: Option<String>,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, type_code: i32) -> Self {
        Self {
            name: name.into(),
            type_code,
            type_name: None,
        }
    }

    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }
}

/// One column of a container's schema header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(default)]
    pub type_code: Option<i32>,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub variant_type: VariantType,
}

impl ColumnDescriptor {
    /// Descriptor as rebuilt from a container header, without type details.
    pub fn from_header(name: impl Into<String>, variant_type: VariantType) -> Self {
        Self {
            name: name.into(),
            type_code: None,
            type_name: None,
            variant_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_alias_parsing() {
        assert_eq!(VariantType::from_alias("binary").unwrap(), VariantType::Binary);
        assert_eq!(VariantType::from_alias("STRING").unwrap(), VariantType::String);
        assert_eq!(VariantType::from_alias("").unwrap(), VariantType::String);
        assert!(VariantType::from_alias("blob").is_err());
    }

    #[test]
    fn test_sql_literal_escaping() {
        assert_eq!(SqlValue::Int(42).to_sql_literal(), "42");
        assert_eq!(SqlValue::text("O'Brien").to_sql_literal(), "'O''Brien'");
        assert_eq!(SqlValue::Null.to_sql_literal(), "NULL");
    }

    #[test]
    fn test_bound_null_keeps_type_code() {
        let param = BoundParam::Null(crate::types::sql_types::INTEGER);
        assert_eq!(param.as_value(), &SqlValue::Null);
        assert!(matches!(param, BoundParam::Null(4)));
    }

    #[test]
    fn test_descriptor_defaults_to_string_variant() {
        let descriptor: ColumnDescriptor = serde_json::from_str(r#"{"name":"id"}"#).unwrap();
        assert_eq!(descriptor.variant_type, VariantType::String);
        assert_eq!(descriptor.type_code, None);
    }
}
