//! Forward conversion: BoundParam → mysql_async::Value
//!
//! Used for the parameters of INSERT statements and split windows.

use chrono::{Datelike, NaiveDateTime, Timelike};
use migrator_core::{BoundParam, Lob, SqlValue};
use mysql_async::{Params, Value};

fn datetime_value(dt: &NaiveDateTime) -> Value {
    Value::Date(
        dt.year() as u16,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
        dt.nanosecond() / 1000, // MySQL uses microseconds
    )
}

/// Convert a bound parameter to a MySQL value.
///
/// MySQL infers the type of NULL from the statement, so typed nulls bind as
/// plain `NULL`.
pub fn to_mysql_value(param: &BoundParam) -> Value {
    match param.as_value() {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(b) => Value::Int(i64::from(*b)),
        SqlValue::Int(i) => Value::Int(*i),
        SqlValue::Float(f) => Value::Double(*f),
        SqlValue::Decimal(s) | SqlValue::Text(s) | SqlValue::RowId(s) => Value::Bytes(s.clone().into_bytes()),
        SqlValue::Clob(Lob(s)) => Value::Bytes(s.clone().into_bytes()),
        SqlValue::Bytes(b) | SqlValue::Blob(Lob(b)) => Value::Bytes(b.clone()),
        SqlValue::Date(d) => Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        SqlValue::Time(t) => Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1000,
        ),
        SqlValue::Timestamp(ts) => datetime_value(ts),
        // TIMESTAMP columns are written in the session time zone, which the
        // connection pins to UTC
        SqlValue::TimestampTz(ts) => datetime_value(&ts.naive_utc()),
    }
}

pub(crate) fn to_params(params: &[BoundParam]) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params.iter().map(to_mysql_value).collect())
    }
}
