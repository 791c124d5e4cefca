//! Forward conversion: BoundParam → PostgreSQL parameter
//!
//! Values are sent in the text format and parsed by the server according to
//! the parameter type of the prepared statement, so one representation
//! serves every target type (`uuid`, `jsonb`, `numeric`, ...). Binary
//! values are sent in the binary format, which for `bytea` is the raw bytes.

use std::error::Error;

use bytes::BytesMut;
use migrator_core::{BoundParam, Lob, SqlValue};
use postgres_types::{to_sql_checked, Format, IsNull, ToSql, Type};

/// A statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct PostgreSQLParam(pub SqlValue);

impl From<&BoundParam> for PostgreSQLParam {
    fn from(param: &BoundParam) -> Self {
        PostgreSQLParam(param.as_value().clone())
    }
}

impl PostgreSQLParam {
    /// Text representation understood by the PostgreSQL input functions.
    pub fn to_text(&self) -> Option<String> {
        let text = match &self.0 {
            SqlValue::Null | SqlValue::Bytes(_) | SqlValue::Blob(_) => return None,
            SqlValue::Bool(b) => if *b { "t" } else { "f" }.to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Float(f) if f.is_infinite() => {
                if *f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
            }
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Decimal(s) | SqlValue::Text(s) | SqlValue::RowId(s) => s.clone(),
            SqlValue::Clob(Lob(s)) => s.clone(),
            SqlValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            SqlValue::Time(t) => t.format("%H:%M:%S%.6f").to_string(),
            SqlValue::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            SqlValue::TimestampTz(ts) => ts.to_rfc3339(),
        };
        Some(text)
    }

    fn is_binary(&self) -> bool {
        matches!(self.0, SqlValue::Bytes(_) | SqlValue::Blob(_))
    }
}

impl ToSql for PostgreSQLParam {
    fn to_sql(&self, _ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match &self.0 {
            SqlValue::Null => return Ok(IsNull::Yes),
            SqlValue::Bytes(b) | SqlValue::Blob(Lob(b)) => out.extend_from_slice(b),
            _ => {
                if let Some(text) = self.to_text() {
                    out.extend_from_slice(text.as_bytes());
                }
            }
        }
        Ok(IsNull::No)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        if self.is_binary() {
            Format::Binary
        } else {
            Format::Text
        }
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use migrator_core::sql_types;

    fn encode(value: SqlValue) -> (Format, Vec<u8>, bool) {
        let param = PostgreSQLParam(value);
        let mut out = BytesMut::new();
        let is_null = param.to_sql(&Type::TEXT, &mut out).unwrap();
        (param.encode_format(&Type::TEXT), out.to_vec(), matches!(is_null, IsNull::Yes))
    }

    #[test]
    fn test_text_encoding() {
        assert_eq!(encode(SqlValue::Bool(true)).1, b"t");
        assert_eq!(encode(SqlValue::Int(-42)).1, b"-42");
        assert_eq!(encode(SqlValue::Float(f64::NEG_INFINITY)).1, b"-Infinity");
        assert_eq!(encode(SqlValue::Decimal("1.50".into())).1, b"1.50");
        let ts = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_micro_opt(7, 8, 9, 10)
            .unwrap();
        assert_eq!(encode(SqlValue::Timestamp(ts)).1, b"2024-05-06 07:08:09.000010");
        assert_eq!(
            encode(SqlValue::TimestampTz(Utc.from_utc_datetime(&ts))).1,
            b"2024-05-06T07:08:09.000010+00:00"
        );
        assert!(matches!(encode(SqlValue::Int(1)).0, Format::Text));
    }

    #[test]
    fn test_binary_and_null_encoding() {
        let (format, bytes, null) = encode(SqlValue::Bytes(vec![0, 255]));
        assert!(matches!(format, Format::Binary));
        assert_eq!(bytes, vec![0, 255]);
        assert!(!null);

        let param = PostgreSQLParam::from(&BoundParam::Null(sql_types::INTEGER));
        let mut out = BytesMut::new();
        assert!(matches!(param.to_sql(&Type::INT4, &mut out).unwrap(), IsNull::Yes));
    }
}
