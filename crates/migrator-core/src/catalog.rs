//! Type catalog: per-run registry of type behaviors and host adapters.
//!
//! A catalog maps a [`TypeDescriptor`] to a [`TypeBehavior`] (the native
//! value kind a backend produces for that type, plus the wire format used to
//! encode it) and holds the [`TypeAdapter`]s that bridge vendor handles such
//! as BLOB, CLOB or ROWID to plain host values.
//!
//! One catalog is built per migration run, starting from
//! [`TypeCatalog::standard`] and layered with the overrides of the resolved
//! dialect.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::codec::{
    BinaryFormat, BooleanFormat, CharFormat, DecimalFormat, FloatFormat, IntegerFormat,
    TemporalFormat, ValueFormat,
};
use crate::error::{MigratorError, Result};
use crate::types::{sql_types, TypeDescriptor};
use crate::values::{BoundParam, Lob, SqlValue, ValueKind};

/// Converts between a vendor handle and a generic host value.
pub trait TypeAdapter: Send + Sync {
    /// Turn a host value into the native handle bound into a statement.
    fn wrap(&self, value: SqlValue) -> Result<SqlValue>;

    /// Turn a native handle read from a cursor into a host value of `target`.
    fn unwrap(&self, native: SqlValue, target: ValueKind) -> Result<SqlValue>;
}

/// How a registered type is read, written and encoded.
#[derive(Clone)]
pub struct TypeBehavior {
    /// Kind of the values a backend produces and expects for this type.
    pub native: ValueKind,
    pub format: Arc<dyn ValueFormat>,
}

impl TypeBehavior {
    pub fn new(native: ValueKind, format: impl ValueFormat + 'static) -> Self {
        Self {
            native,
            format: Arc::new(format),
        }
    }
}

impl std::fmt::Debug for TypeBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeBehavior")
            .field("native", &self.native)
            .field("format", &self.format.name())
            .finish()
    }
}

type AdapterMap = HashMap<ValueKind, Arc<dyn TypeAdapter>>;

/// Registry of type behaviors keyed by descriptor.
#[derive(Clone, Default)]
pub struct TypeCatalog {
    types: HashMap<TypeDescriptor, TypeBehavior>,
    adapters: Arc<AdapterMap>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the portable SQL types and the LOB/ROWID adapters.
    pub fn standard() -> Self {
        use sql_types::*;

        let mut catalog = Self::new();
        catalog.add_types(&[BIT, BOOLEAN], ValueKind::Bool, BooleanFormat);
        catalog.add_types(&[TINYINT, SMALLINT, INTEGER, BIGINT], ValueKind::Int, IntegerFormat);
        catalog.add_types(&[REAL, FLOAT, DOUBLE], ValueKind::Float, FloatFormat);
        catalog.add_types(&[NUMERIC, DECIMAL], ValueKind::Decimal, DecimalFormat);
        catalog.add_types(
            &[CHAR, VARCHAR, LONGVARCHAR, NCHAR, NVARCHAR, LONGNVARCHAR, SQLXML],
            ValueKind::Text,
            CharFormat,
        );
        catalog.add_types(&[CLOB, NCLOB], ValueKind::Clob, CharFormat);
        catalog.add_types(&[ROWID], ValueKind::RowId, CharFormat);
        catalog.add_types(&[BINARY, VARBINARY, LONGVARBINARY], ValueKind::Bytes, BinaryFormat);
        catalog.add_types(&[BLOB], ValueKind::Blob, BinaryFormat);
        catalog.add_types(&[DATE], ValueKind::Date, TemporalFormat);
        catalog.add_types(&[TIME, TIME_WITH_TIMEZONE], ValueKind::Time, TemporalFormat);
        catalog.add_types(&[TIMESTAMP], ValueKind::Timestamp, TemporalFormat);
        catalog.add_types(&[TIMESTAMP_WITH_TIMEZONE], ValueKind::TimestampTz, TemporalFormat);

        catalog.add_adapter(ValueKind::Blob, HandleAdapter::new(ValueKind::Blob));
        catalog.add_adapter(ValueKind::Clob, HandleAdapter::new(ValueKind::Clob));
        catalog.add_adapter(ValueKind::RowId, HandleAdapter::new(ValueKind::RowId));
        catalog
    }

    /// Register or replace the behavior of a type.
    pub fn add_type(&mut self, descriptor: TypeDescriptor, behavior: TypeBehavior) {
        trace!("Registering type {} as {:?}", descriptor, behavior);
        self.types.insert(descriptor, behavior);
    }

    fn add_types<F>(&mut self, codes: &[i32], native: ValueKind, format: F)
    where
        F: ValueFormat + Clone + 'static,
    {
        for code in codes {
            self.add_type(TypeDescriptor::new(*code), TypeBehavior::new(native, format.clone()));
        }
    }

    /// Register the adapter converting handles of `kind` to host values.
    pub fn add_adapter(&mut self, kind: ValueKind, adapter: impl TypeAdapter + 'static) {
        Arc::make_mut(&mut self.adapters).insert(kind, Arc::new(adapter));
    }

    pub fn get_type(&self, code: i32) -> Result<&TypeBehavior> {
        self.types
            .get(&TypeDescriptor::new(code))
            .ok_or_else(|| MigratorError::unsupported(code, None))
    }

    /// Look up `(code, name)`, falling back to the code-only entry.
    pub fn get_type_named(&self, code: i32, name: Option<&str>) -> Result<&TypeBehavior> {
        if let Some(name) = name {
            if let Some(behavior) = self.types.get(&TypeDescriptor::named(code, name)) {
                return Ok(behavior);
            }
        }
        self.types
            .get(&TypeDescriptor::new(code))
            .ok_or_else(|| MigratorError::unsupported(code, name))
    }

    pub fn get_descriptor(&self, descriptor: &TypeDescriptor) -> Result<&TypeBehavior> {
        self.get_type_named(descriptor.code, descriptor.name.as_deref())
    }

    pub fn adapter(&self, kind: ValueKind) -> Option<&Arc<dyn TypeAdapter>> {
        self.adapters.get(&kind)
    }

    /// Accessor reading column `index` of a row as the given type.
    pub fn bind_getter(&self, descriptor: &TypeDescriptor, index: usize) -> Result<ValueGetter> {
        let behavior = self.get_descriptor(descriptor)?;
        Ok(ValueGetter {
            index,
            native: behavior.native,
            adapters: self.adapters.clone(),
        })
    }

    /// Accessor binding parameter `index` of a statement as the given type.
    pub fn bind_setter(&self, descriptor: &TypeDescriptor, index: usize) -> Result<ValueSetter> {
        let behavior = self.get_descriptor(descriptor)?;
        Ok(ValueSetter {
            index,
            type_code: descriptor.code,
            native: behavior.native,
            adapter: self.adapters.get(&behavior.native).cloned(),
        })
    }
}

/// Reads one column of a row, coercing vendor handles through adapters.
#[derive(Clone)]
pub struct ValueGetter {
    index: usize,
    native: ValueKind,
    adapters: Arc<AdapterMap>,
}

impl ValueGetter {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn native(&self) -> ValueKind {
        self.native
    }

    /// Fetch the column value as one of the `accepted` kinds.
    ///
    /// Values already of an accepted kind, and nulls, are returned as is.
    /// Anything else goes through the adapter registered for its kind and is
    /// converted to the first accepted kind.
    pub fn get_value(&self, row: &[SqlValue], accepted: &[ValueKind]) -> Result<SqlValue> {
        let value = row.get(self.index).cloned().ok_or_else(|| {
            MigratorError::format(format!(
                "row has {} columns, column {} requested",
                row.len(),
                self.index
            ))
        })?;
        let kind = value.kind();
        if kind == ValueKind::Null || accepted.contains(&kind) {
            return Ok(value);
        }
        let target = accepted.first().copied().unwrap_or(self.native);
        match self.adapters.get(&kind) {
            Some(adapter) => adapter.unwrap(value, target),
            None => Err(MigratorError::AdapterMissing {
                from: kind.to_string(),
                to: target.to_string(),
            }),
        }
    }
}

/// Binds one statement parameter with the native representation of its type.
#[derive(Clone)]
pub struct ValueSetter {
    index: usize,
    type_code: i32,
    native: ValueKind,
    adapter: Option<Arc<dyn TypeAdapter>>,
}

impl ValueSetter {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Store `value` at the setter's parameter index.
    ///
    /// A null becomes [`BoundParam::Null`] carrying the SQL type code. A value
    /// whose kind differs from the native kind is wrapped by the adapter
    /// registered for the native kind, if any; otherwise it is bound as is
    /// and left to the backend to coerce.
    pub fn set_value(&self, params: &mut [BoundParam], value: SqlValue) -> Result<()> {
        let len = params.len();
        let slot = params.get_mut(self.index).ok_or_else(|| {
            MigratorError::format(format!(
                "statement has {len} parameters, parameter {} requested",
                self.index
            ))
        })?;
        if value.is_null() {
            *slot = BoundParam::Null(self.type_code);
            return Ok(());
        }
        let value = match &self.adapter {
            Some(adapter) if value.kind() != self.native => adapter.wrap(value)?,
            _ => value,
        };
        *slot = BoundParam::Value(value);
        Ok(())
    }
}

/// Adapter for the LOB and ROWID handles produced by backends.
#[derive(Debug, Clone, Copy)]
pub struct HandleAdapter {
    kind: ValueKind,
}

impl HandleAdapter {
    pub fn new(kind: ValueKind) -> Self {
        Self { kind }
    }

    fn mismatch(&self, from: ValueKind) -> MigratorError {
        MigratorError::AdapterMissing {
            from: from.to_string(),
            to: self.kind.to_string(),
        }
    }
}

impl TypeAdapter for HandleAdapter {
    fn wrap(&self, value: SqlValue) -> Result<SqlValue> {
        match (self.kind, value) {
            (ValueKind::Blob, SqlValue::Bytes(bytes)) => Ok(SqlValue::Blob(Lob(bytes))),
            (ValueKind::Blob, SqlValue::Text(text)) => Ok(SqlValue::Blob(Lob(text.into_bytes()))),
            (ValueKind::Clob, SqlValue::Text(text)) => Ok(SqlValue::Clob(Lob(text))),
            (ValueKind::RowId, SqlValue::Text(text)) => Ok(SqlValue::RowId(text)),
            (_, value) => Err(self.mismatch(value.kind())),
        }
    }

    fn unwrap(&self, native: SqlValue, target: ValueKind) -> Result<SqlValue> {
        match (native, target) {
            (SqlValue::Blob(Lob(bytes)), ValueKind::Bytes) => Ok(SqlValue::Bytes(bytes)),
            (SqlValue::Clob(Lob(text)), ValueKind::Text) => Ok(SqlValue::Text(text)),
            (SqlValue::RowId(id), ValueKind::Text) => Ok(SqlValue::Text(id)),
            (native, target) => Err(MigratorError::AdapterMissing {
                from: native.kind().to_string(),
                to: target.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_lookup_falls_back_to_code() {
        let catalog = TypeCatalog::standard();
        let behavior = catalog
            .get_type_named(sql_types::VARCHAR, Some("citext"))
            .unwrap();
        assert_eq!(behavior.native, ValueKind::Text);
    }

    #[test]
    fn test_named_entry_overrides_code_default() {
        let mut catalog = TypeCatalog::standard();
        catalog.add_type(
            TypeDescriptor::named(sql_types::DATE, "YEAR"),
            TypeBehavior::new(ValueKind::Int, crate::codec::YearFormat),
        );
        assert_eq!(
            catalog.get_type_named(sql_types::DATE, Some("year")).unwrap().native,
            ValueKind::Int
        );
        assert_eq!(catalog.get_type(sql_types::DATE).unwrap().native, ValueKind::Date);
    }

    #[test]
    fn test_unregistered_code_is_unsupported() {
        let catalog = TypeCatalog::standard();
        let err = catalog
            .get_type_named(sql_types::STRUCT, Some("address"))
            .unwrap_err();
        match err {
            MigratorError::UnsupportedType { code, name } => {
                assert_eq!(code, sql_types::STRUCT);
                assert_eq!(name.as_deref(), Some("address"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(catalog.get_type(sql_types::OTHER).is_err());
    }

    #[test]
    fn test_getter_unwraps_blob_handle() {
        let catalog = TypeCatalog::standard();
        let getter = catalog
            .bind_getter(&TypeDescriptor::new(sql_types::BLOB), 1)
            .unwrap();
        let row = vec![SqlValue::Int(1), SqlValue::Blob(Lob(vec![1, 2, 3]))];
        let value = getter.get_value(&row, &[ValueKind::Bytes]).unwrap();
        assert_eq!(value, SqlValue::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn test_getter_without_adapter_fails() {
        let catalog = TypeCatalog::standard();
        let getter = catalog
            .bind_getter(&TypeDescriptor::new(sql_types::VARCHAR), 0)
            .unwrap();
        let err = getter
            .get_value(&[SqlValue::Float(1.5)], &[ValueKind::Text])
            .unwrap_err();
        assert!(matches!(err, MigratorError::AdapterMissing { .. }));
    }

    #[test]
    fn test_setter_binds_typed_null() {
        let catalog = TypeCatalog::standard();
        let setter = catalog
            .bind_setter(&TypeDescriptor::new(sql_types::INTEGER), 0)
            .unwrap();
        let mut params = vec![BoundParam::Null(sql_types::NULL)];
        setter.set_value(&mut params, SqlValue::Null).unwrap();
        assert_eq!(params[0], BoundParam::Null(sql_types::INTEGER));
    }

    #[test]
    fn test_setter_wraps_host_value_into_clob() {
        let catalog = TypeCatalog::standard();
        let setter = catalog
            .bind_setter(&TypeDescriptor::new(sql_types::CLOB), 1)
            .unwrap();
        let mut params = vec![BoundParam::Null(0), BoundParam::Null(0)];
        setter.set_value(&mut params, SqlValue::text("long text")).unwrap();
        assert_eq!(
            params[1],
            BoundParam::Value(SqlValue::Clob(Lob("long text".to_string())))
        );
    }

    #[test]
    fn test_setter_index_out_of_range() {
        let catalog = TypeCatalog::standard();
        let setter = catalog
            .bind_setter(&TypeDescriptor::new(sql_types::INTEGER), 3)
            .unwrap();
        let mut params = vec![BoundParam::Null(0)];
        assert!(setter.set_value(&mut params, SqlValue::Int(1)).is_err());
    }
}
