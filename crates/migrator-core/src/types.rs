//! Portable SQL type codes and type descriptors.
//!
//! Type codes follow the JDBC `java.sql.Types` numbering. They are the
//! vendor-neutral vocabulary shared by the backends, the type catalog and the
//! dump catalog, so a code written by one database can be read back while
//! loading into another.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// SQL type codes.
pub mod sql_types {
    pub const BIT: i32 = -7;
    pub const TINYINT: i32 = -6;
    pub const SMALLINT: i32 = 5;
    pub const INTEGER: i32 = 4;
    pub const BIGINT: i32 = -5;
    pub const FLOAT: i32 = 6;
    pub const REAL: i32 = 7;
    pub const DOUBLE: i32 = 8;
    pub const NUMERIC: i32 = 2;
    pub const DECIMAL: i32 = 3;
    pub const CHAR: i32 = 1;
    pub const VARCHAR: i32 = 12;
    pub const LONGVARCHAR: i32 = -1;
    pub const DATE: i32 = 91;
    pub const TIME: i32 = 92;
    pub const TIMESTAMP: i32 = 93;
    pub const BINARY: i32 = -2;
    pub const VARBINARY: i32 = -3;
    pub const LONGVARBINARY: i32 = -4;
    pub const NULL: i32 = 0;
    pub const OTHER: i32 = 1111;
    pub const JAVA_OBJECT: i32 = 2000;
    pub const DISTINCT: i32 = 2001;
    pub const STRUCT: i32 = 2002;
    pub const ARRAY: i32 = 2003;
    pub const BLOB: i32 = 2004;
    pub const CLOB: i32 = 2005;
    pub const REF: i32 = 2006;
    pub const BOOLEAN: i32 = 16;
    pub const ROWID: i32 = -8;
    pub const NCHAR: i32 = -15;
    pub const NVARCHAR: i32 = -9;
    pub const LONGNVARCHAR: i32 = -16;
    pub const NCLOB: i32 = 2011;
    pub const SQLXML: i32 = 2009;
    pub const TIME_WITH_TIMEZONE: i32 = 2013;
    pub const TIMESTAMP_WITH_TIMEZONE: i32 = 2014;

    /// Upper-case name of a standard code, used in logs and error messages.
    pub fn name_of(code: i32) -> Option<&'static str> {
        let name = match code {
            BIT => "BIT",
            TINYINT => "TINYINT",
            SMALLINT => "SMALLINT",
            INTEGER => "INTEGER",
            BIGINT => "BIGINT",
            FLOAT => "FLOAT",
            REAL => "REAL",
            DOUBLE => "DOUBLE",
            NUMERIC => "NUMERIC",
            DECIMAL => "DECIMAL",
            CHAR => "CHAR",
            VARCHAR => "VARCHAR",
            LONGVARCHAR => "LONGVARCHAR",
            DATE => "DATE",
            TIME => "TIME",
            TIMESTAMP => "TIMESTAMP",
            BINARY => "BINARY",
            VARBINARY => "VARBINARY",
            LONGVARBINARY => "LONGVARBINARY",
            NULL => "NULL",
            OTHER => "OTHER",
            JAVA_OBJECT => "JAVA_OBJECT",
            DISTINCT => "DISTINCT",
            STRUCT => "STRUCT",
            ARRAY => "ARRAY",
            BLOB => "BLOB",
            CLOB => "CLOB",
            REF => "REF",
            BOOLEAN => "BOOLEAN",
            ROWID => "ROWID",
            NCHAR => "NCHAR",
            NVARCHAR => "NVARCHAR",
            LONGNVARCHAR => "LONGNVARCHAR",
            NCLOB => "NCLOB",
            SQLXML => "SQLXML",
            TIME_WITH_TIMEZONE => "TIME_WITH_TIMEZONE",
            TIMESTAMP_WITH_TIMEZONE => "TIMESTAMP_WITH_TIMEZONE",
            _ => return None,
        };
        Some(name)
    }
}

/// Identity key of a vendor type: a type code plus an optional vendor name.
///
/// Names compare case-insensitively, so `(OTHER, "uuid")` and
/// `(OTHER, "UUID")` are the same descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub code: i32,
    pub name: Option<String>,
}

impl TypeDescriptor {
    pub fn new(code: i32) -> Self {
        Self { code, name: None }
    }

    pub fn named(code: i32, name: impl Into<String>) -> Self {
        Self {
            code,
            name: Some(name.into()),
        }
    }

    /// The same descriptor without its vendor name.
    pub fn code_only(&self) -> Self {
        Self::new(self.code)
    }

    fn normalized_name(&self) -> Option<String> {
        self.name.as_ref().map(|n| n.to_ascii_uppercase())
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.normalized_name() == other.normalized_name()
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code.hash(state);
        self.normalized_name().hash(state);
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code_name = sql_types::name_of(self.code)
            .map(str::to_string)
            .unwrap_or_else(|| self.code.to_string());
        match &self.name {
            Some(name) => write!(f, "{code_name}({name})"),
            None => f.write_str(&code_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_descriptor_name_is_case_insensitive() {
        let a = TypeDescriptor::named(sql_types::OTHER, "uuid");
        let b = TypeDescriptor::named(sql_types::OTHER, "UUID");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert!(!set.contains(&TypeDescriptor::new(sql_types::OTHER)));
    }

    #[test]
    fn test_descriptor_display() {
        assert_eq!(TypeDescriptor::new(sql_types::VARCHAR).to_string(), "VARCHAR");
        assert_eq!(
            TypeDescriptor::named(sql_types::DATE, "YEAR").to_string(),
            "DATE(YEAR)"
        );
        assert_eq!(TypeDescriptor::new(4242).to_string(), "4242");
    }
}
