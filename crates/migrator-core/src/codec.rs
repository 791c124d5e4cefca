//! Value codec: native values to [`Variant`]s and back.
//!
//! Each registered type carries a [`ValueFormat`]. A [`ColumnCodec`] binds a
//! format to one column of a result set (through a catalog getter) and to one
//! parameter of an insert statement (through a catalog setter). A
//! [`RowCodec`] is the ordered list of column codecs of a row set.
//!
//! Wire conventions:
//! - numbers and booleans travel as their decimal string form,
//! - temporal values travel as epoch milliseconds in UTC,
//! - binary values travel as [`Variant::Binary`],
//! - an empty string decodes to SQL NULL for every non-character type.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::catalog::{TypeCatalog, ValueGetter, ValueSetter};
use crate::error::{MigratorError, Result};
use crate::types::TypeDescriptor;
use crate::values::{
    BoundParam, ColumnDescriptor, ColumnMetadata, SqlValue, ValueKind, Variant, VariantType,
};

/// Session settings shared by every codec of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodecOptions {
    /// Zone in which values without a zone (DATE, TIME, TIMESTAMP) are read.
    pub time_zone: Tz,
    /// Skip rows raising format errors instead of failing the stream.
    pub lenient: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            time_zone: Tz::UTC,
            lenient: false,
        }
    }
}

impl CodecOptions {
    pub fn with_time_zone(mut self, time_zone: Tz) -> Self {
        self.time_zone = time_zone;
        self
    }

    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }
}

/// Parse an IANA time zone name such as `Europe/Paris`.
pub fn parse_time_zone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| MigratorError::format(format!("invalid time zone '{name}': {e}")))
}

/// Per-type conversion between native values and variants.
///
/// `encode` only ever sees non-null values of one of the kinds listed by
/// `accepts`; nulls are handled by the column codec.
pub trait ValueFormat: Send + Sync {
    fn name(&self) -> &'static str;

    /// Kinds the format reads directly. Other kinds go through an adapter
    /// converting them into the first accepted kind.
    fn accepts(&self) -> &'static [ValueKind];

    fn variant_type(&self) -> VariantType {
        VariantType::String
    }

    /// Whether an empty string variant stands for SQL NULL.
    fn empty_is_null(&self) -> bool {
        true
    }

    fn encode(&self, value: SqlValue, options: &CodecOptions) -> Result<Variant>;

    /// Decode into a host value suitable for a column whose native kind is
    /// `native`.
    fn decode(&self, variant: &Variant, native: ValueKind, options: &CodecOptions)
        -> Result<SqlValue>;
}

fn variant_text<'a>(variant: &'a Variant, format: &str) -> Result<&'a str> {
    match variant {
        Variant::String(s) => Ok(s.trim()),
        Variant::Binary(bytes) => std::str::from_utf8(bytes)
            .map(str::trim)
            .map_err(|e| MigratorError::format(format!("{format}: binary value is not UTF-8: {e}"))),
    }
}

fn unexpected(format: &str, value: &SqlValue) -> MigratorError {
    MigratorError::format(format!("{format}: cannot encode {} value", value.kind()))
}

#[derive(Debug, Clone, Copy)]
pub struct BooleanFormat;

impl ValueFormat for BooleanFormat {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn accepts(&self) -> &'static [ValueKind] {
        &[ValueKind::Bool, ValueKind::Int]
    }

    fn encode(&self, value: SqlValue, _options: &CodecOptions) -> Result<Variant> {
        match value {
            SqlValue::Bool(b) => Ok(Variant::String(b.to_string())),
            SqlValue::Int(i) => Ok(Variant::String((i != 0).to_string())),
            other => Err(unexpected(self.name(), &other)),
        }
    }

    fn decode(&self, variant: &Variant, native: ValueKind, _options: &CodecOptions) -> Result<SqlValue> {
        let text = variant_text(variant, self.name())?;
        let flag = match text.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => true,
            "false" | "f" | "0" => false,
            _ => return Err(MigratorError::format(format!("invalid boolean '{text}'"))),
        };
        Ok(match native {
            ValueKind::Int => SqlValue::Int(flag as i64),
            _ => SqlValue::Bool(flag),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IntegerFormat;

impl ValueFormat for IntegerFormat {
    fn name(&self) -> &'static str {
        "integer"
    }

    fn accepts(&self) -> &'static [ValueKind] {
        &[ValueKind::Int, ValueKind::Bool, ValueKind::Decimal]
    }

    fn encode(&self, value: SqlValue, _options: &CodecOptions) -> Result<Variant> {
        match value {
            SqlValue::Int(i) => Ok(Variant::String(i.to_string())),
            SqlValue::Bool(b) => Ok(Variant::String((b as i64).to_string())),
            SqlValue::Decimal(d) => Ok(Variant::String(d)),
            other => Err(unexpected(self.name(), &other)),
        }
    }

    fn decode(&self, variant: &Variant, _native: ValueKind, _options: &CodecOptions) -> Result<SqlValue> {
        let text = variant_text(variant, self.name())?;
        text.parse::<i64>()
            .map(SqlValue::Int)
            .map_err(|e| MigratorError::format(format!("invalid integer '{text}': {e}")))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FloatFormat;

impl ValueFormat for FloatFormat {
    fn name(&self) -> &'static str {
        "float"
    }

    fn accepts(&self) -> &'static [ValueKind] {
        &[ValueKind::Float, ValueKind::Int, ValueKind::Decimal]
    }

    fn encode(&self, value: SqlValue, _options: &CodecOptions) -> Result<Variant> {
        match value {
            SqlValue::Float(f) => Ok(Variant::String(f.to_string())),
            SqlValue::Int(i) => Ok(Variant::String(i.to_string())),
            SqlValue::Decimal(d) => Ok(Variant::String(d)),
            other => Err(unexpected(self.name(), &other)),
        }
    }

    fn decode(&self, variant: &Variant, _native: ValueKind, _options: &CodecOptions) -> Result<SqlValue> {
        let text = variant_text(variant, self.name())?;
        text.parse::<f64>()
            .map(SqlValue::Float)
            .map_err(|e| MigratorError::format(format!("invalid floating point number '{text}': {e}")))
    }
}

/// Exact numerics. Values stay textual end to end.
#[derive(Debug, Clone, Copy)]
pub struct DecimalFormat;

impl DecimalFormat {
    fn is_numeric_literal(text: &str) -> bool {
        if text == "NaN" {
            return true;
        }
        let body = text.strip_prefix(['-', '+']).unwrap_or(text);
        let (mantissa, exponent) = match body.find(['e', 'E']) {
            Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
            None => (body, None),
        };
        let mut parts = mantissa.splitn(2, '.');
        let int_part = parts.next().unwrap_or("");
        let frac_part = parts.next().unwrap_or("");
        let digits_ok = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        let mantissa_ok = !(int_part.is_empty() && frac_part.is_empty())
            && digits_ok(int_part)
            && digits_ok(frac_part);
        let exponent_ok = match exponent {
            Some(exp) => {
                let exp = exp.strip_prefix(['-', '+']).unwrap_or(exp);
                !exp.is_empty() && digits_ok(exp)
            }
            None => true,
        };
        mantissa_ok && exponent_ok
    }
}

impl ValueFormat for DecimalFormat {
    fn name(&self) -> &'static str {
        "decimal"
    }

    fn accepts(&self) -> &'static [ValueKind] {
        &[ValueKind::Decimal, ValueKind::Int, ValueKind::Float]
    }

    fn encode(&self, value: SqlValue, _options: &CodecOptions) -> Result<Variant> {
        match value {
            SqlValue::Decimal(d) => Ok(Variant::String(d)),
            SqlValue::Int(i) => Ok(Variant::String(i.to_string())),
            SqlValue::Float(f) => Ok(Variant::String(f.to_string())),
            other => Err(unexpected(self.name(), &other)),
        }
    }

    fn decode(&self, variant: &Variant, _native: ValueKind, _options: &CodecOptions) -> Result<SqlValue> {
        let text = variant_text(variant, self.name())?;
        if Self::is_numeric_literal(text) {
            Ok(SqlValue::Decimal(text.to_string()))
        } else {
            Err(MigratorError::format(format!("invalid decimal '{text}'")))
        }
    }
}

/// Character data, including CLOB and ROWID columns read through adapters.
#[derive(Debug, Clone, Copy)]
pub struct CharFormat;

impl ValueFormat for CharFormat {
    fn name(&self) -> &'static str {
        "char"
    }

    fn accepts(&self) -> &'static [ValueKind] {
        &[ValueKind::Text]
    }

    fn empty_is_null(&self) -> bool {
        false
    }

    fn encode(&self, value: SqlValue, _options: &CodecOptions) -> Result<Variant> {
        match value {
            SqlValue::Text(s) => Ok(Variant::String(s)),
            other => Err(unexpected(self.name(), &other)),
        }
    }

    fn decode(&self, variant: &Variant, _native: ValueKind, _options: &CodecOptions) -> Result<SqlValue> {
        match variant {
            Variant::String(s) => Ok(SqlValue::Text(s.clone())),
            Variant::Binary(bytes) => String::from_utf8(bytes.clone())
                .map(SqlValue::Text)
                .map_err(|e| MigratorError::format(format!("char: binary value is not UTF-8: {e}"))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BinaryFormat;

impl ValueFormat for BinaryFormat {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn accepts(&self) -> &'static [ValueKind] {
        &[ValueKind::Bytes]
    }

    fn variant_type(&self) -> VariantType {
        VariantType::Binary
    }

    fn encode(&self, value: SqlValue, _options: &CodecOptions) -> Result<Variant> {
        match value {
            SqlValue::Bytes(bytes) => Ok(Variant::Binary(bytes)),
            other => Err(unexpected(self.name(), &other)),
        }
    }

    fn decode(&self, variant: &Variant, _native: ValueKind, _options: &CodecOptions) -> Result<SqlValue> {
        Ok(SqlValue::Bytes(variant.as_bytes().to_vec()))
    }
}

/// DATE, TIME and TIMESTAMP columns, with or without zone.
#[derive(Debug, Clone, Copy)]
pub struct TemporalFormat;

impl ValueFormat for TemporalFormat {
    fn name(&self) -> &'static str {
        "temporal"
    }

    fn accepts(&self) -> &'static [ValueKind] {
        &[
            ValueKind::Timestamp,
            ValueKind::TimestampTz,
            ValueKind::Date,
            ValueKind::Time,
            ValueKind::Text,
        ]
    }

    fn encode(&self, value: SqlValue, options: &CodecOptions) -> Result<Variant> {
        let tz = options.time_zone;
        let instant = match value {
            SqlValue::Date(date) => local_to_utc(date_at_midnight(date)?, tz)?,
            SqlValue::Time(time) => local_to_utc(epoch_date()?.and_time(time), tz)?,
            SqlValue::Timestamp(ts) => local_to_utc(ts, tz)?,
            SqlValue::TimestampTz(ts) => ts,
            SqlValue::Text(text) => parse_temporal(&text, tz)?,
            other => return Err(unexpected(self.name(), &other)),
        };
        Ok(Variant::String(instant.timestamp_millis().to_string()))
    }

    fn decode(&self, variant: &Variant, native: ValueKind, options: &CodecOptions) -> Result<SqlValue> {
        let tz = options.time_zone;
        let instant = parse_wire_temporal(variant_text(variant, self.name())?, tz)?;
        let local = instant.with_timezone(&tz);
        Ok(match native {
            ValueKind::Date => SqlValue::Date(local.date_naive()),
            ValueKind::Time => SqlValue::Time(local.time()),
            ValueKind::TimestampTz => SqlValue::TimestampTz(instant),
            ValueKind::Int => SqlValue::Int(i64::from(local.year())),
            _ => SqlValue::Timestamp(local.naive_local()),
        })
    }
}

/// Year-only temporal columns such as MySQL `YEAR`, carried as a bare year.
#[derive(Debug, Clone, Copy)]
pub struct YearFormat;

impl ValueFormat for YearFormat {
    fn name(&self) -> &'static str {
        "year"
    }

    fn accepts(&self) -> &'static [ValueKind] {
        &[ValueKind::Int, ValueKind::Date, ValueKind::Text]
    }

    fn encode(&self, value: SqlValue, options: &CodecOptions) -> Result<Variant> {
        let year = match value {
            SqlValue::Int(year) => year,
            SqlValue::Date(date) => i64::from(date.year()),
            SqlValue::Text(text) => {
                let instant = parse_temporal(&text, options.time_zone)?;
                i64::from(instant.with_timezone(&options.time_zone).year())
            }
            other => return Err(unexpected(self.name(), &other)),
        };
        Ok(Variant::String(format!("{year:04}")))
    }

    fn decode(&self, variant: &Variant, native: ValueKind, options: &CodecOptions) -> Result<SqlValue> {
        let tz = options.time_zone;
        let instant = parse_temporal(variant_text(variant, self.name())?, tz)?;
        let year = instant.with_timezone(&tz).year();
        Ok(match native {
            ValueKind::Date => SqlValue::Date(year_start(year)?),
            ValueKind::Text => SqlValue::Text(format!("{year:04}")),
            _ => SqlValue::Int(i64::from(year)),
        })
    }
}

/// Formats for naive literals, tried in this order after RFC 3339.
const TIMESTAMP_PATTERNS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a temporal literal.
///
/// Literal forms are tried first, in a fixed order: full timestamp, date,
/// bare four-digit year. Only then is the text read as epoch milliseconds,
/// so `"2020"` is a year here. Columns whose wire value is always a
/// millisecond count decode through [`parse_wire_temporal`] instead.
pub fn parse_temporal(text: &str, tz: Tz) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.with_timezone(&Utc));
    }
    for pattern in TIMESTAMP_PATTERNS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, pattern) {
            return local_to_utc(naive, tz);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return local_to_utc(date_at_midnight(date)?, tz);
    }
    if text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()) {
        let year: i32 = text
            .parse()
            .map_err(|e| MigratorError::format(format!("invalid year '{text}': {e}")))?;
        return local_to_utc(date_at_midnight(year_start(year)?)?, tz);
    }
    if let Ok(millis) = text.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| MigratorError::format(format!("epoch milliseconds out of range: {millis}")));
    }
    Err(MigratorError::format(format!("invalid temporal value '{text}'")))
}

/// Parse the wire value of a DATE, TIME or TIMESTAMP column.
///
/// A plain signed integer is epoch milliseconds, whatever its width. Any
/// other text goes through the literal order of [`parse_temporal`].
pub fn parse_wire_temporal(text: &str, tz: Tz) -> Result<DateTime<Utc>> {
    let text = text.trim();
    let digits = text.strip_prefix('-').unwrap_or(text);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        let millis: i64 = text
            .parse()
            .map_err(|e| MigratorError::format(format!("invalid epoch milliseconds '{text}': {e}")))?;
        return DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| MigratorError::format(format!("epoch milliseconds out of range: {millis}")));
    }
    parse_temporal(text, tz)
}

fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| MigratorError::format(format!("{naive} does not exist in time zone {tz}")))
}

fn date_at_midnight(date: NaiveDate) -> Result<NaiveDateTime> {
    date.and_hms_opt(0, 0, 0)
        .ok_or_else(|| MigratorError::format(format!("invalid date {date}")))
}

fn year_start(year: i32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| MigratorError::format(format!("year out of range: {year}")))
}

fn epoch_date() -> Result<NaiveDate> {
    year_start(1970)
}

/// Codec bound to one column and to the matching statement parameter.
#[derive(Clone)]
pub struct ColumnCodec {
    descriptor: ColumnDescriptor,
    native: ValueKind,
    format: std::sync::Arc<dyn ValueFormat>,
    getter: ValueGetter,
    setter: ValueSetter,
}

impl ColumnCodec {
    /// Bind column `index` of `column`'s type. Unregistered types fail with
    /// [`MigratorError::UnsupportedType`].
    pub fn bind(catalog: &TypeCatalog, index: usize, column: &ColumnMetadata) -> Result<Self> {
        let type_descriptor = match &column.type_name {
            Some(name) => TypeDescriptor::named(column.type_code, name.clone()),
            None => TypeDescriptor::new(column.type_code),
        };
        let behavior = catalog.get_descriptor(&type_descriptor)?;
        Ok(Self {
            descriptor: ColumnDescriptor {
                name: column.name.clone(),
                type_code: Some(column.type_code),
                type_name: column.type_name.clone(),
                variant_type: behavior.format.variant_type(),
            },
            native: behavior.native,
            format: behavior.format.clone(),
            getter: catalog.bind_getter(&type_descriptor, index)?,
            setter: catalog.bind_setter(&type_descriptor, index)?,
        })
    }

    pub fn descriptor(&self) -> &ColumnDescriptor {
        &self.descriptor
    }

    pub fn encode(&self, row: &[SqlValue], options: &CodecOptions) -> Result<Option<Variant>> {
        let value = self.getter.get_value(row, self.format.accepts())?;
        if value.is_null() {
            return Ok(None);
        }
        self.format.encode(value, options).map(Some)
    }

    pub fn decode_value(&self, variant: Option<&Variant>, options: &CodecOptions) -> Result<SqlValue> {
        match variant {
            None => Ok(SqlValue::Null),
            Some(Variant::String(s)) if s.is_empty() && self.format.empty_is_null() => Ok(SqlValue::Null),
            Some(variant) => self.format.decode(variant, self.native, options),
        }
    }

    pub fn decode(
        &self,
        variant: Option<&Variant>,
        params: &mut [BoundParam],
        options: &CodecOptions,
    ) -> Result<()> {
        let value = self.decode_value(variant, options)?;
        self.setter.set_value(params, value)
    }
}

/// Ordered column codecs of a row set.
#[derive(Clone)]
pub struct RowCodec {
    columns: Vec<ColumnCodec>,
    options: CodecOptions,
}

impl RowCodec {
    pub fn bind(catalog: &TypeCatalog, columns: &[ColumnMetadata], options: CodecOptions) -> Result<Self> {
        let columns = columns
            .iter()
            .enumerate()
            .map(|(index, column)| ColumnCodec::bind(catalog, index, column))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns, options })
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn descriptors(&self) -> Vec<ColumnDescriptor> {
        self.columns.iter().map(|c| c.descriptor().clone()).collect()
    }

    /// Encode every column of `row`, in column order.
    pub fn encode_row(&self, row: &[SqlValue]) -> Result<Vec<Option<Variant>>> {
        self.columns
            .iter()
            .map(|column| column.encode(row, &self.options))
            .collect()
    }

    /// Decode a wire row into statement parameters.
    pub fn decode_row(&self, values: &[Option<Variant>]) -> Result<Vec<BoundParam>> {
        if values.len() != self.columns.len() {
            return Err(MigratorError::format(format!(
                "row has {} values, expected {}",
                values.len(),
                self.columns.len()
            )));
        }
        let mut params: Vec<BoundParam> = self
            .columns
            .iter()
            .map(|column| BoundParam::Null(column.descriptor.type_code.unwrap_or_default()))
            .collect();
        for (column, value) in self.columns.iter().zip(values) {
            column.decode(value.as_ref(), &mut params, &self.options)?;
        }
        Ok(params)
    }
}
