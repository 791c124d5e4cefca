//! Reverse conversion: PostgreSQL value → SqlValue
//!
//! Portable types are read through their `FromSql` implementations. NUMERIC,
//! JSON and the network and interval types are decoded from their binary
//! wire form into text, so no precision or formatting is lost.

use std::error::Error;
use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use migrator_core::{MigratorError, SqlValue};
use postgres_types::{FromSql, Type};
use thiserror::Error;
use tokio_postgres::Row;
use uuid::Uuid;

/// Errors that can occur during PostgreSQL to SqlValue conversion.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The column type is not supported
    #[error("Unsupported PostgreSQL type: {0}")]
    UnsupportedType(String),

    #[error("Failed to read column '{column}': {source}")]
    Column {
        column: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// Malformed binary value
    #[error("Invalid {type_name} value: {reason}")]
    InvalidValue { type_name: &'static str, reason: String },

    /// Invalid UTF-8 in string data
    #[error("Invalid UTF-8: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),
}

impl From<ConversionError> for MigratorError {
    fn from(err: ConversionError) -> Self {
        MigratorError::sql(err)
    }
}

/// Undecoded binary value of any type.
struct RawValue(Vec<u8>);

impl<'a> FromSql<'a> for RawValue {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(RawValue(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn invalid(type_name: &'static str, reason: impl Into<String>) -> ConversionError {
    ConversionError::InvalidValue {
        type_name,
        reason: reason.into(),
    }
}

/// Convert every column of a row.
pub fn row_to_sql_values(row: &Row) -> Result<Vec<SqlValue>, ConversionError> {
    (0..row.len()).map(|i| convert_postgres_value(row, i)).collect()
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, index: usize) -> Result<Option<T>, ConversionError> {
    row.try_get::<_, Option<T>>(index)
        .map_err(|source| ConversionError::Column {
            column: row.columns()[index].name().to_string(),
            source,
        })
}

fn convert_postgres_value(row: &Row, index: usize) -> Result<SqlValue, ConversionError> {
    let pg_type = row.columns()[index].type_();

    let value = match *pg_type {
        Type::BOOL => get::<bool>(row, index)?.map(SqlValue::Bool),
        Type::INT2 => get::<i16>(row, index)?.map(|i| SqlValue::Int(i64::from(i))),
        Type::INT4 => get::<i32>(row, index)?.map(|i| SqlValue::Int(i64::from(i))),
        Type::INT8 => get::<i64>(row, index)?.map(SqlValue::Int),
        Type::OID => get::<u32>(row, index)?.map(|i| SqlValue::Int(i64::from(i))),
        Type::FLOAT4 => get::<f32>(row, index)?.map(|f| SqlValue::Float(f64::from(f))),
        Type::FLOAT8 => get::<f64>(row, index)?.map(SqlValue::Float),
        Type::BPCHAR | Type::VARCHAR | Type::TEXT | Type::NAME => {
            get::<String>(row, index)?.map(SqlValue::Text)
        }
        Type::CHAR => get::<i8>(row, index)?.map(|c| SqlValue::Text(char::from(c as u8).to_string())),
        Type::BYTEA => get::<Vec<u8>>(row, index)?.map(SqlValue::Bytes),
        Type::DATE => get::<NaiveDate>(row, index)?.map(SqlValue::Date),
        Type::TIME => get::<NaiveTime>(row, index)?.map(SqlValue::Time),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, index)?.map(SqlValue::Timestamp),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, index)?.map(SqlValue::TimestampTz),
        Type::UUID => get::<Uuid>(row, index)?.map(|u| SqlValue::Text(u.to_string())),
        Type::NUMERIC => match get::<RawValue>(row, index)? {
            Some(raw) => Some(SqlValue::Decimal(decode_numeric(&raw.0)?)),
            None => None,
        },
        Type::JSON | Type::JSONB | Type::INET | Type::CIDR | Type::MACADDR | Type::INTERVAL => {
            match get::<RawValue>(row, index)? {
                Some(raw) => Some(SqlValue::Text(decode_text(pg_type, raw.0)?)),
                None => None,
            }
        }
        _ => return Err(ConversionError::UnsupportedType(pg_type.name().to_string())),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

fn decode_text(pg_type: &Type, raw: Vec<u8>) -> Result<String, ConversionError> {
    match *pg_type {
        Type::JSON => Ok(String::from_utf8(raw)?),
        Type::JSONB => match raw.split_first() {
            Some((1, text)) => Ok(String::from_utf8(text.to_vec())?),
            _ => Err(invalid("jsonb", "unknown jsonb version")),
        },
        Type::INET | Type::CIDR => decode_inet(&raw),
        Type::MACADDR => match raw.as_slice() {
            [a, b, c, d, e, f] => Ok(format!("{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{f:02x}")),
            _ => Err(invalid("macaddr", format!("{} bytes", raw.len()))),
        },
        Type::INTERVAL => decode_interval(&raw),
        _ => Err(ConversionError::UnsupportedType(pg_type.name().to_string())),
    }
}

/// Decode the binary NUMERIC format.
///
/// - int16 ndigits: number of base-10000 digits
/// - int16 weight: exponent of the first digit in base 10000
/// - uint16 sign: 0x0000 positive, 0x4000 negative, 0xC000 NaN
/// - int16 dscale: digits after the decimal point
/// - int16[ndigits] digits, most significant first
pub(crate) fn decode_numeric(raw: &[u8]) -> Result<String, ConversionError> {
    const NUMERIC_NEG: u16 = 0x4000;
    const NUMERIC_NAN: u16 = 0xC000;

    if raw.len() < 8 {
        return Err(invalid("numeric", format!("length {} below the 8 byte header", raw.len())));
    }
    let word = |i: usize| u16::from_be_bytes([raw[2 * i], raw[2 * i + 1]]);
    let ndigits = usize::from(word(0));
    let weight = i32::from(word(1) as i16);
    let sign = word(2);
    let dscale = usize::from(word(3));
    if sign == NUMERIC_NAN {
        return Ok("NaN".to_string());
    }
    if raw.len() != 8 + 2 * ndigits {
        return Err(invalid("numeric", format!("{ndigits} digits in {} bytes", raw.len())));
    }
    let digits: Vec<u16> = (4..4 + ndigits).map(word).collect();
    let digit = |position: i32| -> u16 {
        usize::try_from(position)
            .ok()
            .and_then(|p| digits.get(p).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        for position in 0..=weight {
            let group = digit(position);
            if position == 0 {
                text.push_str(&group.to_string());
            } else {
                text.push_str(&format!("{group:04}"));
            }
        }
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut position = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(position)));
            position += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }
    Ok(text)
}

fn decode_inet(raw: &[u8]) -> Result<String, ConversionError> {
    const PGSQL_AF_INET: u8 = 2;
    const PGSQL_AF_INET6: u8 = 3;

    let [family, bits, is_cidr, length, address @ ..] = raw else {
        return Err(invalid("inet", "truncated header"));
    };
    if address.len() != usize::from(*length) {
        return Err(invalid("inet", "address length mismatch"));
    }
    let (text, max_bits) = match (*family, address) {
        (PGSQL_AF_INET, [a, b, c, d]) => (Ipv4Addr::new(*a, *b, *c, *d).to_string(), 32),
        (PGSQL_AF_INET6, _) if address.len() == 16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(address);
            (Ipv6Addr::from(octets).to_string(), 128)
        }
        _ => return Err(invalid("inet", format!("unknown address family {family}"))),
    };
    if *is_cidr != 0 || *bits != max_bits {
        Ok(format!("{text}/{bits}"))
    } else {
        Ok(text)
    }
}

fn decode_interval(raw: &[u8]) -> Result<String, ConversionError> {
    let bytes: &[u8; 16] = raw
        .try_into()
        .map_err(|_| invalid("interval", format!("{} bytes", raw.len())))?;
    let mut micros = [0u8; 8];
    micros.copy_from_slice(&bytes[..8]);
    let mut days = [0u8; 4];
    days.copy_from_slice(&bytes[8..12]);
    let mut months = [0u8; 4];
    months.copy_from_slice(&bytes[12..]);
    Ok(format!(
        "{} mons {} days {} microseconds",
        i32::from_be_bytes(months),
        i32::from_be_bytes(days),
        i64::from_be_bytes(micros)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(ndigits: u16, weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        for word in [ndigits, weight as u16, sign, dscale].iter().chain(digits) {
            raw.extend_from_slice(&word.to_be_bytes());
        }
        raw
    }

    #[test]
    fn test_decode_numeric() {
        // 12345.678
        assert_eq!(decode_numeric(&numeric(3, 1, 0, 3, &[1, 2345, 6780])).unwrap(), "12345.678");
        // -0.05
        assert_eq!(decode_numeric(&numeric(1, -1, 0x4000, 2, &[500])).unwrap(), "-0.05");
        // 0.00
        assert_eq!(decode_numeric(&numeric(0, 0, 0, 2, &[])).unwrap(), "0.00");
        // 20000 stored with a trailing zero group dropped
        assert_eq!(decode_numeric(&numeric(1, 1, 0, 0, &[2])).unwrap(), "20000");
        // 0.000001
        assert_eq!(decode_numeric(&numeric(1, -2, 0, 6, &[100])).unwrap(), "0.000001");
        assert_eq!(decode_numeric(&numeric(0, 0, 0xC000, 0, &[])).unwrap(), "NaN");
        assert!(decode_numeric(&[0, 1]).is_err());
    }

    #[test]
    fn test_decode_network_types() {
        assert_eq!(decode_inet(&[2, 32, 0, 4, 10, 0, 0, 1]).unwrap(), "10.0.0.1");
        assert_eq!(decode_inet(&[2, 24, 1, 4, 192, 168, 1, 0]).unwrap(), "192.168.1.0/24");
        let mut v6 = vec![3, 128, 0, 16];
        v6.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        assert_eq!(decode_inet(&v6).unwrap(), "::1");
        assert_eq!(
            decode_text(&Type::MACADDR, vec![8, 0, 0x2b, 1, 2, 3]).unwrap(),
            "08:00:2b:01:02:03"
        );
    }

    #[test]
    fn test_decode_interval_and_json() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(-1_500_000i64).to_be_bytes());
        raw.extend_from_slice(&3i32.to_be_bytes());
        raw.extend_from_slice(&14i32.to_be_bytes());
        assert_eq!(decode_interval(&raw).unwrap(), "14 mons 3 days -1500000 microseconds");

        let mut jsonb = vec![1];
        jsonb.extend_from_slice(br#"{"a": 1}"#);
        assert_eq!(decode_text(&Type::JSONB, jsonb).unwrap(), r#"{"a": 1}"#);
        assert!(decode_text(&Type::JSONB, vec![2, b'{']).is_err());
    }
}
