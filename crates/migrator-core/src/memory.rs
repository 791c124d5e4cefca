//! In-memory backend.
//!
//! Tables live in a shared [`MemoryDatabase`]; every [`MemoryConnection`]
//! opened on it sees committed rows only. The connection understands the SQL
//! the engine generates with the generic dialect:
//!
//! - `SELECT * FROM t [LIMIT n OFFSET m]`
//! - `SELECT COUNT(*) FROM (<select>) c`
//! - `INSERT INTO t (a, b) VALUES (?, ?)` and `REPLACE INTO ...`

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::trace;

use crate::connection::{Connection, ConnectionFactory, Cursor, VecCursor};
use crate::error::{MigratorError, Result};
use crate::signature::Signature;
use crate::types::sql_types;
use crate::values::{BoundParam, ColumnMetadata, Row, SqlValue};

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<ColumnMetadata>,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, MemoryTable>,
    count_queries: usize,
}

/// Shared in-memory database.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
    signature: Signature,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::with_signature(Signature::new("Memory", "1.0", 1, 0))
    }

    /// Database reporting `signature` on its connections.
    pub fn with_signature(signature: Signature) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            signature,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create or replace a table.
    pub fn create_table(&self, name: &str, columns: Vec<ColumnMetadata>, rows: Vec<Row>) {
        self.state()
            .tables
            .insert(name.to_string(), MemoryTable { columns, rows });
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state().tables.get(table).map_or(0, |t| t.rows.len())
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state().tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of row count queries served so far.
    pub fn count_queries(&self) -> usize {
        self.state().count_queries
    }

    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection {
            db: self.clone(),
            manual_commit: false,
            pending: Vec::new(),
        }
    }
}

#[async_trait]
impl ConnectionFactory for MemoryDatabase {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        Ok(Box::new(MemoryDatabase::connect(self)))
    }
}

/// Connection to a [`MemoryDatabase`].
pub struct MemoryConnection {
    db: MemoryDatabase,
    manual_commit: bool,
    pending: Vec<(String, Row)>,
}

fn unquote(identifier: &str) -> String {
    identifier
        .trim()
        .split('.')
        .map(|part| part.trim_matches(|c| matches!(c, '"' | '`' | '[' | ']')))
        .collect::<Vec<_>>()
        .join(".")
}

fn unsupported(sql: &str) -> MigratorError {
    MigratorError::sql(format!("memory backend cannot run: {sql}"))
}

/// Bound values consumed left to right by `?` placeholders.
struct Params<'a> {
    iter: std::slice::Iter<'a, BoundParam>,
}

impl<'a> Params<'a> {
    fn new(params: &'a [BoundParam]) -> Self {
        Self { iter: params.iter() }
    }

    fn next(&mut self) -> Result<SqlValue> {
        self.iter
            .next()
            .map(|p| p.as_value().clone())
            .ok_or_else(|| MigratorError::sql("not enough parameters bound"))
    }

    /// A window bound: `?` or an integer literal.
    fn bound(&mut self, token: Option<&str>) -> Result<usize> {
        let value = match token {
            Some("?") => self.next()?,
            Some(literal) => SqlValue::Int(
                literal
                    .parse()
                    .map_err(|e| MigratorError::sql(format!("invalid bound '{literal}': {e}")))?,
            ),
            None => return Err(MigratorError::sql("missing window bound")),
        };
        value
            .as_i64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| MigratorError::sql(format!("invalid window bound {value}")))
    }
}

impl MemoryConnection {
    fn select(&self, sql: &str, params: &mut Params<'_>) -> Result<(Vec<ColumnMetadata>, Vec<Row>)> {
        let tokens: Vec<&str> = sql.split_whitespace().collect();
        let head: Vec<String> = tokens.iter().take(3).map(|t| t.to_ascii_uppercase()).collect();
        if head != ["SELECT", "*", "FROM"] || tokens.len() < 4 {
            return Err(unsupported(sql));
        }
        let table_name = unquote(tokens[3]);
        let state = self.db.state();
        let table = state
            .tables
            .get(&table_name)
            .ok_or_else(|| MigratorError::sql(format!("no such table: {table_name}")))?;

        let mut rest = tokens[4..].iter().copied();
        let rows = match rest.next().map(str::to_ascii_uppercase).as_deref() {
            None => table.rows.clone(),
            Some("LIMIT") => {
                let count = params.bound(rest.next())?;
                if !rest.next().is_some_and(|t| t.eq_ignore_ascii_case("OFFSET")) {
                    return Err(unsupported(sql));
                }
                let offset = params.bound(rest.next())?;
                table.rows.iter().skip(offset).take(count).cloned().collect()
            }
            Some(_) => return Err(unsupported(sql)),
        };
        Ok((table.columns.clone(), rows))
    }

    fn insert(&mut self, sql: &str, params: &[BoundParam]) -> Result<()> {
        let upper = sql.to_ascii_uppercase();
        let into = upper.find(" INTO ").ok_or_else(|| unsupported(sql))?;
        let open = sql.find('(').ok_or_else(|| unsupported(sql))?;
        let close = sql[open..].find(')').map(|p| p + open).ok_or_else(|| unsupported(sql))?;
        let table_name = unquote(&sql[into + 6..open]);
        let names: Vec<String> = sql[open + 1..close].split(',').map(unquote).collect();

        let row = {
            let state = self.db.state();
            let table = state
                .tables
                .get(&table_name)
                .ok_or_else(|| MigratorError::sql(format!("no such table: {table_name}")))?;
            if params.len() != names.len() {
                return Err(MigratorError::sql(format!(
                    "{} columns but {} parameters",
                    names.len(),
                    params.len()
                )));
            }
            let mut row = vec![SqlValue::Null; table.columns.len()];
            for (name, param) in names.iter().zip(params) {
                let index = table
                    .columns
                    .iter()
                    .position(|c| &c.name == name)
                    .ok_or_else(|| MigratorError::sql(format!("no such column: {name}")))?;
                row[index] = param.as_value().clone();
            }
            row
        };

        if self.manual_commit {
            self.pending.push((table_name, row));
        } else {
            self.apply(vec![(table_name, row)]);
        }
        Ok(())
    }

    fn apply(&self, rows: Vec<(String, Row)>) {
        let mut state = self.db.state();
        for (table, row) in rows {
            if let Some(table) = state.tables.get_mut(&table) {
                table.rows.push(row);
            }
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn signature(&self) -> &Signature {
        &self.db.signature
    }

    async fn query(&mut self, sql: &str, params: &[BoundParam]) -> Result<Box<dyn Cursor>> {
        trace!("memory query: {}", sql);
        let sql = sql.trim();
        let mut params = Params::new(params);
        let upper = sql.to_ascii_uppercase();
        if upper.starts_with("SELECT COUNT(*) FROM (") && upper.ends_with(") C") {
            let inner = &sql["SELECT COUNT(*) FROM (".len()..sql.len() - ") c".len()];
            let (_, rows) = self.select(inner, &mut params)?;
            self.db.state().count_queries += 1;
            return Ok(Box::new(VecCursor::new(
                vec![ColumnMetadata::new("count", sql_types::BIGINT)],
                vec![vec![SqlValue::Int(rows.len() as i64)]],
            )));
        }
        let (columns, rows) = self.select(sql, &mut params)?;
        Ok(Box::new(VecCursor::new(columns, rows)))
    }

    async fn execute(&mut self, sql: &str, params: &[BoundParam]) -> Result<u64> {
        let verb = sql.trim_start().split_whitespace().next().unwrap_or("");
        if verb.eq_ignore_ascii_case("INSERT") || verb.eq_ignore_ascii_case("REPLACE") {
            self.insert(sql, params)?;
            Ok(1)
        } else {
            Err(unsupported(sql))
        }
    }

    async fn execute_batch(&mut self, sql: &str, rows: &[Vec<BoundParam>]) -> Result<u64> {
        let mut affected = 0;
        for params in rows {
            affected += self.execute(sql, params).await?;
        }
        Ok(affected)
    }

    async fn begin(&mut self) -> Result<()> {
        self.manual_commit = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        self.apply(pending);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.pending.clear();
        Ok(())
    }

    async fn table_columns(&mut self, table: &str) -> Result<Vec<ColumnMetadata>> {
        let name = unquote(table);
        self.db
            .state()
            .tables
            .get(&name)
            .map(|t| t.columns.clone())
            .ok_or_else(|| MigratorError::sql(format!("no such table: {name}")))
    }
}
