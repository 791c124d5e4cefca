//! MySQL column type mapping.
//!
//! Result set columns are mapped onto SQL type codes the way Connector/J
//! reports them, so the portable type catalog applies unchanged. A few MySQL
//! types keep their own type name so dialect overrides can single them out:
//! `YEAR` (reported as DATE) and `JSON` (reported as LONGVARCHAR).

use migrator_core::{sql_types, ColumnMetadata};
use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::Column;

/// Character set id MySQL uses for binary strings.
pub const BINARY_CHARSET: u16 = 63;

/// Map a MySQL column type to its SQL type code and type name.
///
/// # Example
///
/// ```
/// use mysql_async::consts::{ColumnFlags, ColumnType};
/// use mysql_types::{mysql_column_to_type_code, BINARY_CHARSET};
///
/// let (code, name) = mysql_column_to_type_code(
///     ColumnType::MYSQL_TYPE_VAR_STRING,
///     ColumnFlags::empty(),
///     BINARY_CHARSET,
///     16,
/// );
/// assert_eq!((code, name), (-3, "VARBINARY"));
/// ```
pub fn mysql_column_to_type_code(
    column_type: ColumnType,
    flags: ColumnFlags,
    charset: u16,
    length: u32,
) -> (i32, &'static str) {
    use ColumnType::*;
    let binary = charset == BINARY_CHARSET;
    let unsigned = flags.contains(ColumnFlags::UNSIGNED_FLAG);
    match column_type {
        // TINYINT(1) is the MySQL boolean
        MYSQL_TYPE_TINY if length == 1 => (sql_types::BIT, "BIT"),
        MYSQL_TYPE_TINY => (sql_types::TINYINT, "TINYINT"),
        MYSQL_TYPE_SHORT => (sql_types::SMALLINT, "SMALLINT"),
        MYSQL_TYPE_INT24 => (sql_types::INTEGER, "MEDIUMINT"),
        MYSQL_TYPE_LONG => (sql_types::INTEGER, "INT"),
        // unsigned BIGINT does not fit in i64
        MYSQL_TYPE_LONGLONG if unsigned => (sql_types::DECIMAL, "BIGINT UNSIGNED"),
        MYSQL_TYPE_LONGLONG => (sql_types::BIGINT, "BIGINT"),
        MYSQL_TYPE_FLOAT => (sql_types::REAL, "FLOAT"),
        MYSQL_TYPE_DOUBLE => (sql_types::DOUBLE, "DOUBLE"),
        MYSQL_TYPE_DECIMAL | MYSQL_TYPE_NEWDECIMAL => (sql_types::DECIMAL, "DECIMAL"),
        MYSQL_TYPE_BIT if length <= 1 => (sql_types::BIT, "BIT"),
        MYSQL_TYPE_BIT => (sql_types::VARBINARY, "BIT"),

        MYSQL_TYPE_STRING if binary => (sql_types::BINARY, "BINARY"),
        MYSQL_TYPE_STRING => (sql_types::CHAR, "CHAR"),
        MYSQL_TYPE_VAR_STRING | MYSQL_TYPE_VARCHAR if binary => (sql_types::VARBINARY, "VARBINARY"),
        MYSQL_TYPE_VAR_STRING | MYSQL_TYPE_VARCHAR => (sql_types::VARCHAR, "VARCHAR"),
        MYSQL_TYPE_TINY_BLOB | MYSQL_TYPE_MEDIUM_BLOB | MYSQL_TYPE_BLOB | MYSQL_TYPE_LONG_BLOB
            if binary =>
        {
            (sql_types::LONGVARBINARY, "BLOB")
        }
        MYSQL_TYPE_TINY_BLOB | MYSQL_TYPE_MEDIUM_BLOB | MYSQL_TYPE_BLOB | MYSQL_TYPE_LONG_BLOB => {
            (sql_types::LONGVARCHAR, "TEXT")
        }
        MYSQL_TYPE_ENUM | MYSQL_TYPE_SET => (sql_types::CHAR, "CHAR"),
        MYSQL_TYPE_JSON => (sql_types::LONGVARCHAR, "JSON"),
        MYSQL_TYPE_GEOMETRY => (sql_types::LONGVARBINARY, "GEOMETRY"),

        MYSQL_TYPE_DATE | MYSQL_TYPE_NEWDATE => (sql_types::DATE, "DATE"),
        MYSQL_TYPE_YEAR => (sql_types::DATE, "YEAR"),
        MYSQL_TYPE_TIME | MYSQL_TYPE_TIME2 => (sql_types::TIME, "TIME"),
        MYSQL_TYPE_DATETIME | MYSQL_TYPE_DATETIME2 => (sql_types::TIMESTAMP, "DATETIME"),
        MYSQL_TYPE_TIMESTAMP | MYSQL_TYPE_TIMESTAMP2 => (sql_types::TIMESTAMP, "TIMESTAMP"),

        MYSQL_TYPE_NULL => (sql_types::NULL, "NULL"),
        _ => (sql_types::OTHER, "UNKNOWN"),
    }
}

/// Column metadata of a result set column.
pub fn column_metadata(column: &Column) -> ColumnMetadata {
    let (code, name) = mysql_column_to_type_code(
        column.column_type(),
        column.flags(),
        column.character_set(),
        column.column_length(),
    );
    ColumnMetadata::new(column.name_str(), code).with_type_name(name)
}
