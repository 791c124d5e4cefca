//! Reverse conversion: MySQL values → SqlValue
//!
//! Values are converted according to the SQL type code the column was mapped
//! to, so that every value handed to the codec has the native kind of its
//! catalog entry.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use migrator_core::{sql_types, ColumnMetadata, MigratorError, SqlValue};
use mysql_async::Value;
use thiserror::Error;

/// Error during MySQL value conversion.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Type mismatch in column '{column}': expected {expected}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: Value,
    },
    #[error("Invalid UTF-8 in string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("Invalid date/time value in column '{0}'")]
    InvalidDateTime(String),
}

impl From<ConversionError> for MigratorError {
    fn from(err: ConversionError) -> Self {
        MigratorError::sql(err)
    }
}

/// Convert one MySQL value of a result set column.
pub fn to_sql_value(value: Value, column: &ColumnMetadata) -> Result<SqlValue, ConversionError> {
    if matches!(value, Value::NULL) {
        return Ok(SqlValue::Null);
    }
    let mismatch = |expected: &'static str, actual: &Value| ConversionError::TypeMismatch {
        column: column.name.clone(),
        expected,
        actual: actual.clone(),
    };
    let year = column.type_name.as_deref() == Some("YEAR");
    match column.type_code {
        sql_types::BIT | sql_types::BOOLEAN => match &value {
            Value::Int(i) => Ok(SqlValue::Bool(*i != 0)),
            Value::UInt(u) => Ok(SqlValue::Bool(*u != 0)),
            // BIT(1) arrives as a single byte, TINYINT(1) in the text protocol as "0"/"1"
            Value::Bytes(b) => match b.as_slice() {
                [0] | [b'0'] => Ok(SqlValue::Bool(false)),
                [1] | [b'1'] => Ok(SqlValue::Bool(true)),
                _ => Err(mismatch("boolean", &value)),
            },
            _ => Err(mismatch("boolean", &value)),
        },
        sql_types::TINYINT | sql_types::SMALLINT | sql_types::INTEGER | sql_types::BIGINT => {
            extract_int(&value).ok_or_else(|| mismatch("integer", &value)).map(SqlValue::Int)
        }
        sql_types::DATE if year => extract_int(&value)
            .or_else(|| match &value {
                Value::Date(y, ..) => Some(i64::from(*y)),
                _ => None,
            })
            .ok_or_else(|| mismatch("year", &value))
            .map(SqlValue::Int),
        sql_types::REAL | sql_types::FLOAT | sql_types::DOUBLE => match &value {
            Value::Float(f) => Ok(SqlValue::Float(f64::from(*f))),
            Value::Double(d) => Ok(SqlValue::Float(*d)),
            Value::Int(i) => Ok(SqlValue::Float(*i as f64)),
            Value::Bytes(b) => std::str::from_utf8(b)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(SqlValue::Float)
                .ok_or_else(|| mismatch("float", &value)),
            _ => Err(mismatch("float", &value)),
        },
        sql_types::DECIMAL | sql_types::NUMERIC => Ok(SqlValue::Decimal(extract_string(&value, &mismatch)?)),
        sql_types::BINARY | sql_types::VARBINARY | sql_types::LONGVARBINARY => match value {
            Value::Bytes(b) => Ok(SqlValue::Bytes(b)),
            other => Err(mismatch("bytes", &other)),
        },
        sql_types::DATE => extract_date(&value, column).map(SqlValue::Date),
        sql_types::TIME => extract_time(&value, column).map(SqlValue::Time),
        sql_types::TIMESTAMP => extract_datetime(&value, column).map(SqlValue::Timestamp),
        _ => Ok(SqlValue::Text(extract_string(&value, &mismatch)?)),
    }
}

fn extract_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::UInt(u) => i64::try_from(*u).ok(),
        Value::Bytes(b) => std::str::from_utf8(b).ok()?.parse().ok(),
        _ => None,
    }
}

fn extract_string(
    value: &Value,
    mismatch: &impl Fn(&'static str, &Value) -> ConversionError,
) -> Result<String, ConversionError> {
    match value {
        Value::Bytes(b) => Ok(String::from_utf8(b.clone())?),
        Value::Int(i) => Ok(i.to_string()),
        Value::UInt(u) => Ok(u.to_string()),
        Value::Float(f) => Ok(f.to_string()),
        Value::Double(d) => Ok(d.to_string()),
        _ => Err(mismatch("string", value)),
    }
}

fn extract_date(value: &Value, column: &ColumnMetadata) -> Result<NaiveDate, ConversionError> {
    let invalid = || ConversionError::InvalidDateTime(column.name.clone());
    match value {
        Value::Date(year, month, day, ..) => {
            NaiveDate::from_ymd_opt(i32::from(*year), u32::from(*month), u32::from(*day)).ok_or_else(invalid)
        }
        Value::Bytes(b) => {
            let s = String::from_utf8(b.clone())?;
            NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|_| invalid())
        }
        _ => Err(invalid()),
    }
}

fn extract_time(value: &Value, column: &ColumnMetadata) -> Result<NaiveTime, ConversionError> {
    let invalid = || ConversionError::InvalidDateTime(column.name.clone());
    match value {
        // negative and multi-day intervals have no time-of-day equivalent
        Value::Time(false, 0, hour, min, sec, micro) => {
            NaiveTime::from_hms_micro_opt(u32::from(*hour), u32::from(*min), u32::from(*sec), *micro)
                .ok_or_else(invalid)
        }
        Value::Bytes(b) => {
            let s = String::from_utf8(b.clone())?;
            NaiveTime::parse_from_str(&s, "%H:%M:%S%.f").map_err(|_| invalid())
        }
        _ => Err(invalid()),
    }
}

fn extract_datetime(value: &Value, column: &ColumnMetadata) -> Result<NaiveDateTime, ConversionError> {
    let invalid = || ConversionError::InvalidDateTime(column.name.clone());
    match value {
        Value::Date(year, month, day, hour, min, sec, micro) => {
            let date = NaiveDate::from_ymd_opt(i32::from(*year), u32::from(*month), u32::from(*day))
                .ok_or_else(invalid)?;
            let time = NaiveTime::from_hms_micro_opt(u32::from(*hour), u32::from(*min), u32::from(*sec), *micro)
                .ok_or_else(invalid)?;
            Ok(NaiveDateTime::new(date, time))
        }
        Value::Bytes(b) => {
            let s = String::from_utf8(b.clone())?;
            NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f").map_err(|_| invalid())
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(code: i32) -> ColumnMetadata {
        ColumnMetadata::new("c", code)
    }

    #[test]
    fn test_null_is_null_for_every_type() {
        for code in [sql_types::BIT, sql_types::INTEGER, sql_types::DATE, sql_types::VARCHAR] {
            assert_eq!(to_sql_value(Value::NULL, &column(code)).unwrap(), SqlValue::Null);
        }
    }

    #[test]
    fn test_int_conversion() {
        let v = to_sql_value(Value::Int(42), &column(sql_types::INTEGER)).unwrap();
        assert_eq!(v, SqlValue::Int(42));
        let v = to_sql_value(Value::Bytes(b"-7".to_vec()), &column(sql_types::BIGINT)).unwrap();
        assert_eq!(v, SqlValue::Int(-7));
        assert!(to_sql_value(Value::UInt(u64::MAX), &column(sql_types::BIGINT)).is_err());
    }

    #[test]
    fn test_bit_conversion() {
        assert_eq!(
            to_sql_value(Value::Bytes(vec![1]), &column(sql_types::BIT)).unwrap(),
            SqlValue::Bool(true)
        );
        assert_eq!(
            to_sql_value(Value::Int(0), &column(sql_types::BIT)).unwrap(),
            SqlValue::Bool(false)
        );
    }

    #[test]
    fn test_year_conversion() {
        let year = column(sql_types::DATE).with_type_name("YEAR");
        assert_eq!(to_sql_value(Value::Int(1999), &year).unwrap(), SqlValue::Int(1999));
    }

    #[test]
    fn test_temporal_conversion() {
        let v = to_sql_value(Value::Date(2024, 2, 29, 13, 5, 9, 250_000), &column(sql_types::TIMESTAMP)).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_micro_opt(13, 5, 9, 250_000)
            .unwrap();
        assert_eq!(v, SqlValue::Timestamp(expected));

        let v = to_sql_value(Value::Time(false, 0, 23, 59, 1, 0), &column(sql_types::TIME)).unwrap();
        assert_eq!(v, SqlValue::Time(NaiveTime::from_hms_opt(23, 59, 1).unwrap()));
        assert!(to_sql_value(Value::Time(true, 0, 1, 0, 0, 0), &column(sql_types::TIME)).is_err());
        assert!(to_sql_value(Value::Date(2023, 2, 30, 0, 0, 0, 0), &column(sql_types::DATE)).is_err());
    }

    #[test]
    fn test_text_and_binary() {
        let v = to_sql_value(Value::Bytes("héllo".as_bytes().to_vec()), &column(sql_types::VARCHAR)).unwrap();
        assert_eq!(v, SqlValue::text("héllo"));
        let v = to_sql_value(Value::Bytes(vec![0, 159]), &column(sql_types::VARBINARY)).unwrap();
        assert_eq!(v, SqlValue::Bytes(vec![0, 159]));
        assert!(to_sql_value(Value::Bytes(vec![0, 159]), &column(sql_types::VARCHAR)).is_err());
        let v = to_sql_value(Value::Bytes(b"12.50".to_vec()), &column(sql_types::DECIMAL)).unwrap();
        assert_eq!(v, SqlValue::Decimal("12.50".to_string()));
    }
}
