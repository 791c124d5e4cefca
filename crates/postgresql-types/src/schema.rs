//! PostgreSQL type mapping.

use migrator_core::{sql_types, ColumnMetadata};
use postgres_types::{Kind, Type};

/// Map a PostgreSQL type to its SQL type code.
///
/// Types without a portable code report `OTHER`; their type name (`uuid`,
/// `jsonb`, ...) is what the dialect matches on.
pub fn pg_type_to_type_code(ty: &Type) -> i32 {
    if matches!(ty.kind(), Kind::Array(_)) {
        return sql_types::ARRAY;
    }
    match *ty {
        Type::BOOL => sql_types::BOOLEAN,
        Type::INT2 => sql_types::SMALLINT,
        Type::INT4 => sql_types::INTEGER,
        Type::INT8 | Type::OID => sql_types::BIGINT,
        Type::FLOAT4 => sql_types::REAL,
        Type::FLOAT8 => sql_types::DOUBLE,
        Type::NUMERIC => sql_types::NUMERIC,
        Type::BPCHAR | Type::CHAR => sql_types::CHAR,
        Type::VARCHAR | Type::TEXT | Type::NAME => sql_types::VARCHAR,
        Type::BYTEA => sql_types::BINARY,
        Type::DATE => sql_types::DATE,
        Type::TIME => sql_types::TIME,
        Type::TIMESTAMP => sql_types::TIMESTAMP,
        Type::TIMESTAMPTZ => sql_types::TIMESTAMP_WITH_TIMEZONE,
        _ => sql_types::OTHER,
    }
}

/// Column metadata of a result set column.
pub fn column_metadata(column: &tokio_postgres::Column) -> ColumnMetadata {
    let ty = column.type_();
    ColumnMetadata::new(column.name(), pg_type_to_type_code(ty)).with_type_name(ty.name())
}
