//! Vendor dialects: pagination, identifier quoting, row counting and type
//! overrides.
//!
//! Dialects are resolved from the connection [`Signature`] through
//! [`dialect_resolver`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::catalog::{TypeBehavior, TypeCatalog};
use crate::codec::{CharFormat, YearFormat};
use crate::connection::Connection;
use crate::error::{MigratorError, Result};
use crate::resolver::ServiceResolver;
use crate::signature::Signature;
use crate::split::{BindingMode, QueryLimit};
use crate::types::{sql_types, TypeDescriptor};
use crate::values::{BoundParam, SqlValue, ValueKind};

/// Helper column appended by the wrapping pagination styles.
pub const ROW_NUMBER_COLUMN: &str = "MIGRATOR_RN";

/// Pagination syntax of a vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `LIMIT count OFFSET offset`
    LimitOffset,
    /// `LIMIT offset, count`
    MySqlLimit,
    /// `OFFSET offset ROWS FETCH NEXT count ROWS ONLY`. Some vendors reject
    /// the clause without an ORDER BY.
    OffsetFetch { requires_order_by: bool },
    /// `SELECT TOP (count)` over a `ROW_NUMBER()` projection.
    RowNumber,
    /// Nested `ROWNUM` predicates.
    RowNum,
}

/// A query restricted to one window.
///
/// Bind `start_params`, then the caller's parameters, then `end_params`.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitedQuery {
    pub sql: String,
    pub start_params: Vec<SqlValue>,
    pub end_params: Vec<SqlValue>,
    /// Number of trailing helper columns the caller must hide.
    pub hidden_columns: usize,
}

/// Render a window bound: a placeholder collecting the value, or the value
/// itself in literal mode.
fn bound(value: u64, mode: BindingMode, params: &mut Vec<SqlValue>) -> String {
    match mode {
        BindingMode::Literal => value.to_string(),
        BindingMode::Parameterized => {
            params.push(SqlValue::Int(value as i64));
            "?".to_string()
        }
    }
}

fn has_order_by(query: &str) -> bool {
    let upper = query.to_ascii_uppercase();
    upper
        .split_whitespace()
        .collect::<Vec<_>>()
        .windows(2)
        .any(|pair| pair == ["ORDER", "BY"])
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn keyword_at(query: &str, at: usize, keyword: &str) -> bool {
    let bytes = query.as_bytes();
    let end = at + keyword.len();
    query
        .get(at..end)
        .is_some_and(|word| word.eq_ignore_ascii_case(keyword))
        && (at == 0 || !is_word_byte(bytes[at - 1]))
        && bytes.get(end).map_or(true, |b| !is_word_byte(*b))
}

/// Byte offset of the last `ORDER BY` outside parentheses, string literals
/// and quoted identifiers.
fn trailing_order_by(query: &str) -> Option<usize> {
    let bytes = query.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut found = None;
    for (i, &b) in bytes.iter().enumerate() {
        if let Some(close) = quote {
            if b == close {
                quote = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' => quote = Some(b),
            b'[' => quote = Some(b']'),
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ if depth == 0 && keyword_at(query, i, "ORDER") => {
                let rest = query[i + 5..].trim_start();
                let by_at = query.len() - rest.len();
                if keyword_at(query, by_at, "BY") {
                    found = Some(i);
                }
            }
            _ => {}
        }
    }
    found
}

fn is_simple_identifier(part: &str) -> bool {
    if part.len() > 2 && part.starts_with('[') && part.ends_with(']') {
        return true;
    }
    !part.is_empty()
        && part.bytes().all(is_word_byte)
        && !part.bytes().all(|b| b.is_ascii_digit())
}

/// Rewrite one ORDER BY item against the derived table `q`, keeping only
/// the column name of a qualified reference.
fn derived_order_item(item: &str) -> Option<String> {
    let mut words = item.split_whitespace();
    let column = words.next()?;
    let direction = match words.next() {
        None => None,
        Some(d) if d.eq_ignore_ascii_case("ASC") || d.eq_ignore_ascii_case("DESC") => Some(d),
        Some(_) => return None,
    };
    if words.next().is_some() || !column.split('.').all(is_simple_identifier) {
        return None;
    }
    let name = column.rsplit('.').next()?;
    Some(match direction {
        Some(direction) => format!("q.{name} {direction}"),
        None => format!("q.{name}"),
    })
}

/// Split a trailing ORDER BY off `query` and turn it into the ordering of a
/// `ROW_NUMBER()` window over the derived table `q`.
fn row_number_ordering(query: &str) -> Result<(&str, String)> {
    let Some(at) = trailing_order_by(query) else {
        return Ok((query, "(SELECT NULL)".to_string()));
    };
    let clause = query[at + 5..].trim_start();
    let items = clause.get(2..).unwrap_or_default();
    let ordering = items
        .split(',')
        .map(|item| {
            derived_order_item(item).ok_or_else(|| {
                MigratorError::Sql(format!(
                    "cannot paginate with ROW_NUMBER(): ORDER BY item '{}' is not a column reference",
                    item.trim()
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((query[..at].trim_end(), ordering.join(", ")))
}

impl Pagination {
    /// Restrict `query` to `limit`. Fails when the query cannot be wrapped
    /// by this pagination style.
    pub fn apply(&self, query: &str, limit: &QueryLimit, mode: BindingMode) -> Result<LimitedQuery> {
        let QueryLimit { count, offset } = *limit;
        let mut start_params = Vec::new();
        let mut end_params = Vec::new();
        let mut hidden_columns = 0;

        let sql = match self {
            Pagination::LimitOffset => {
                let count = bound(count, mode, &mut end_params);
                let offset = bound(offset, mode, &mut end_params);
                format!("{query} LIMIT {count} OFFSET {offset}")
            }
            Pagination::MySqlLimit => {
                let offset = bound(offset, mode, &mut end_params);
                let count = bound(count, mode, &mut end_params);
                format!("{query} LIMIT {offset}, {count}")
            }
            Pagination::OffsetFetch { requires_order_by } => {
                let order_by = if *requires_order_by && !has_order_by(query) {
                    " ORDER BY (SELECT NULL)"
                } else {
                    ""
                };
                let offset = bound(offset, mode, &mut end_params);
                let count = bound(count, mode, &mut end_params);
                format!("{query}{order_by} OFFSET {offset} ROWS FETCH NEXT {count} ROWS ONLY")
            }
            Pagination::RowNumber => {
                hidden_columns = 1;
                let (query, ordering) = row_number_ordering(query)?;
                let top = bound(count, mode, &mut start_params);
                let after = bound(offset, mode, &mut end_params);
                format!(
                    "SELECT TOP ({top}) * FROM (SELECT q.*, ROW_NUMBER() OVER (ORDER BY {ordering}) \
                     AS {ROW_NUMBER_COLUMN} FROM ({query}) q) p \
                     WHERE p.{ROW_NUMBER_COLUMN} > {after} ORDER BY p.{ROW_NUMBER_COLUMN}"
                )
            }
            Pagination::RowNum => {
                hidden_columns = 1;
                let upper = bound(offset + count, mode, &mut end_params);
                let lower = bound(offset, mode, &mut end_params);
                format!(
                    "SELECT * FROM (SELECT q.*, ROWNUM {ROW_NUMBER_COLUMN} FROM ({query}) q \
                     WHERE ROWNUM <= {upper}) WHERE {ROW_NUMBER_COLUMN} > {lower}"
                )
            }
        };

        Ok(LimitedQuery {
            sql,
            start_params,
            end_params,
            hidden_columns,
        })
    }
}

/// Computes the number of rows a query returns.
#[async_trait]
pub trait RowCountStrategy: Send + Sync {
    async fn count(
        &self,
        conn: &mut dyn Connection,
        dialect: &dyn Dialect,
        query: &str,
        params: &[BoundParam],
    ) -> Result<u64>;
}

/// Runs `SELECT COUNT(*)` over the query.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactRowCount;

#[async_trait]
impl RowCountStrategy for ExactRowCount {
    async fn count(
        &self,
        conn: &mut dyn Connection,
        dialect: &dyn Dialect,
        query: &str,
        params: &[BoundParam],
    ) -> Result<u64> {
        let sql = dialect.row_count_query(query);
        debug!("Counting rows with: {}", sql);
        let mut cursor = conn.query(&sql, params).await?;
        let row = cursor
            .next_row()
            .await?
            .ok_or_else(|| MigratorError::sql("row count query returned no rows"))?;
        let value = row
            .into_iter()
            .next()
            .ok_or_else(|| MigratorError::sql("row count query returned no columns"))?;
        match value {
            SqlValue::Int(n) => Ok(n.max(0) as u64),
            SqlValue::Decimal(s) | SqlValue::Text(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|e| MigratorError::sql(format!("invalid row count '{s}': {e}"))),
            other => Err(MigratorError::sql(format!(
                "unexpected row count value of kind {}",
                other.kind()
            ))),
        }
    }
}

/// Vendor-specific SQL behavior.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn pagination(&self) -> Pagination {
        Pagination::LimitOffset
    }

    /// Opening and closing identifier quote characters.
    fn quote_chars(&self) -> (char, char) {
        ('"', '"')
    }

    /// Quote an identifier, each dot-separated part separately.
    fn quote_identifier(&self, identifier: &str) -> String {
        let (open, close) = self.quote_chars();
        identifier
            .split('.')
            .map(|part| {
                let escaped = part.replace(close, &format!("{close}{close}"));
                format!("{open}{escaped}{close}")
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn limit_query(&self, query: &str, limit: &QueryLimit, mode: BindingMode) -> Result<LimitedQuery> {
        self.pagination().apply(query, limit, mode)
    }

    fn row_count_query(&self, query: &str) -> String {
        format!("SELECT COUNT(*) FROM ({query}) c")
    }

    fn row_count_strategy(&self) -> Arc<dyn RowCountStrategy> {
        Arc::new(ExactRowCount)
    }

    /// Layer vendor type overrides on top of the standard catalog.
    fn register_types(&self, _catalog: &mut TypeCatalog) {}

    /// Whether `REPLACE INTO` is available for loads that overwrite rows.
    fn supports_replace(&self) -> bool {
        false
    }

    fn table_query(&self, table: &str) -> String {
        format!("SELECT * FROM {}", self.quote_identifier(table))
    }

    fn insert_statement(&self, table: &str, columns: &[String], replace: bool) -> String {
        let verb = if replace && self.supports_replace() {
            "REPLACE"
        } else {
            "INSERT"
        };
        let names = columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "{verb} INTO {} ({names}) VALUES ({placeholders})",
            self.quote_identifier(table)
        )
    }

    /// The run's type catalog: the standard types plus this dialect's
    /// overrides.
    fn type_catalog(&self) -> TypeCatalog {
        let mut catalog = TypeCatalog::standard();
        self.register_types(&mut catalog);
        catalog
    }
}

#[derive(Debug, Default)]
pub struct GenericDialect;

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }
}

#[derive(Debug, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn pagination(&self) -> Pagination {
        Pagination::MySqlLimit
    }

    fn quote_chars(&self) -> (char, char) {
        ('`', '`')
    }

    fn register_types(&self, catalog: &mut TypeCatalog) {
        catalog.add_type(
            TypeDescriptor::named(sql_types::DATE, "YEAR"),
            TypeBehavior::new(ValueKind::Int, YearFormat),
        );
        catalog.add_type(
            TypeDescriptor::named(sql_types::LONGVARCHAR, "JSON"),
            TypeBehavior::new(ValueKind::Text, CharFormat),
        );
    }

    fn supports_replace(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn register_types(&self, catalog: &mut TypeCatalog) {
        for name in ["uuid", "json", "jsonb", "inet", "cidr", "macaddr", "interval"] {
            catalog.add_type(
                TypeDescriptor::named(sql_types::OTHER, name),
                TypeBehavior::new(ValueKind::Text, CharFormat),
            );
        }
    }
}

#[derive(Debug, Default)]
pub struct NuoDbDialect;

impl Dialect for NuoDbDialect {
    fn name(&self) -> &'static str {
        "nuodb"
    }

    fn pagination(&self) -> Pagination {
        Pagination::OffsetFetch {
            requires_order_by: false,
        }
    }

    fn supports_replace(&self) -> bool {
        true
    }
}

/// SQL Server. Versions before 2012 (major 11) paginate with `ROW_NUMBER()`.
#[derive(Debug, Default)]
pub struct SqlServerDialect {
    offset_fetch: bool,
}

impl SqlServerDialect {
    pub fn with_offset_fetch() -> Self {
        Self { offset_fetch: true }
    }
}

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn pagination(&self) -> Pagination {
        if self.offset_fetch {
            Pagination::OffsetFetch {
                requires_order_by: true,
            }
        } else {
            Pagination::RowNumber
        }
    }

    fn quote_chars(&self) -> (char, char) {
        ('[', ']')
    }
}

/// Oracle. Versions before 12c paginate with `ROWNUM`.
#[derive(Debug, Default)]
pub struct OracleDialect {
    offset_fetch: bool,
}

impl OracleDialect {
    pub fn with_offset_fetch() -> Self {
        Self { offset_fetch: true }
    }
}

impl Dialect for OracleDialect {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn pagination(&self) -> Pagination {
        if self.offset_fetch {
            Pagination::OffsetFetch {
                requires_order_by: false,
            }
        } else {
            Pagination::RowNum
        }
    }
}

/// Resolver with every built-in dialect registered and
/// [`GenericDialect`] as the default.
pub fn dialect_resolver() -> ServiceResolver<Arc<dyn Dialect>> {
    let mut resolver: ServiceResolver<Arc<dyn Dialect>> = ServiceResolver::new();
    resolver.set_default(Arc::new(GenericDialect));
    resolver.register(Signature::product("MySQL"), Arc::new(MySqlDialect));
    resolver.register(Signature::product("PostgreSQL"), Arc::new(PostgresDialect));
    resolver.register(Signature::product("NuoDB"), Arc::new(NuoDbDialect));
    resolver.register(
        Signature::product("Microsoft SQL Server"),
        Arc::new(SqlServerDialect::default()),
    );
    resolver.register(
        Signature::product("Microsoft SQL Server").with_major(11),
        Arc::new(SqlServerDialect::with_offset_fetch()),
    );
    resolver.register(Signature::product("Oracle"), Arc::new(OracleDialect::default()));
    resolver.register(
        Signature::product("Oracle").with_major(12),
        Arc::new(OracleDialect::with_offset_fetch()),
    );
    resolver
}
