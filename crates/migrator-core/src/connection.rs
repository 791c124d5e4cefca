//! Database access seam.
//!
//! Backends implement [`Connection`] and hand out [`Cursor`]s over result
//! sets. Connections follow the auto-commit-off model once [`Connection::begin`]
//! has been called: every later statement joins the current transaction, and
//! a new one starts right after each commit.

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::error::Result;
use crate::signature::Signature;
use crate::values::{BoundParam, ColumnMetadata, Row};

/// Forward-only result set.
#[async_trait]
pub trait Cursor: Send {
    fn columns(&self) -> &[ColumnMetadata];

    /// Next row, or `None` once the result set is exhausted.
    async fn next_row(&mut self) -> Result<Option<Row>>;
}

#[async_trait]
pub trait Connection: Send {
    fn signature(&self) -> &Signature;

    async fn query(&mut self, sql: &str, params: &[BoundParam]) -> Result<Box<dyn Cursor>>;

    /// Execute a statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[BoundParam]) -> Result<u64>;

    /// Execute one statement once per parameter row.
    async fn execute_batch(&mut self, sql: &str, rows: &[Vec<BoundParam>]) -> Result<u64>;

    /// Turn auto-commit off.
    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Column metadata of a table, in declaration order.
    async fn table_columns(&mut self, table: &str) -> Result<Vec<ColumnMetadata>>;
}

/// Opens independent connections, one per worker.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// Cursor over rows already held in memory.
pub struct VecCursor {
    columns: Vec<ColumnMetadata>,
    rows: VecDeque<Row>,
}

impl VecCursor {
    pub fn new(columns: Vec<ColumnMetadata>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }
}

#[async_trait]
impl Cursor for VecCursor {
    fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.pop_front())
    }
}

/// Cursor hiding trailing helper columns added by a pagination wrapper.
pub struct TrimmedCursor {
    inner: Box<dyn Cursor>,
    visible: usize,
}

impl TrimmedCursor {
    pub fn new(inner: Box<dyn Cursor>, hidden: usize) -> Self {
        let visible = inner.columns().len().saturating_sub(hidden);
        Self { inner, visible }
    }
}

#[async_trait]
impl Cursor for TrimmedCursor {
    fn columns(&self) -> &[ColumnMetadata] {
        &self.inner.columns()[..self.visible]
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.inner.next_row().await?.map(|mut row| {
            row.truncate(self.visible);
            row
        }))
    }
}

/// Cursor wrapper with a single-row lookahead buffer.
///
/// [`LookaheadCursor::has_next`] fetches the next row into the buffer when it
/// is empty; [`LookaheadCursor::next`] drains the buffer before reading on.
pub struct LookaheadCursor {
    inner: Box<dyn Cursor>,
    buffered: Option<Row>,
    exhausted: bool,
}

impl LookaheadCursor {
    pub fn new(inner: Box<dyn Cursor>) -> Self {
        Self {
            inner,
            buffered: None,
            exhausted: false,
        }
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        self.inner.columns()
    }

    pub async fn has_next(&mut self) -> Result<bool> {
        if self.buffered.is_none() && !self.exhausted {
            self.buffered = self.inner.next_row().await?;
            self.exhausted = self.buffered.is_none();
        }
        Ok(self.buffered.is_some())
    }

    pub async fn next(&mut self) -> Result<Option<Row>> {
        if self.buffered.is_some() {
            return Ok(self.buffered.take());
        }
        if self.exhausted {
            return Ok(None);
        }
        let row = self.inner.next_row().await?;
        self.exhausted = row.is_none();
        Ok(row)
    }

    /// Peek at the buffered row without consuming it.
    pub async fn peek(&mut self) -> Result<Option<&Row>> {
        self.has_next().await?;
        Ok(self.buffered.as_ref())
    }
}

/// Drain a cursor into a vector.
pub async fn collect_rows(cursor: &mut dyn Cursor) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(row) = cursor.next_row().await? {
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::sql_types;
    use crate::values::SqlValue;

    fn cursor(n: i64) -> Box<dyn Cursor> {
        let rows = (0..n).map(|i| vec![SqlValue::Int(i)]).collect();
        Box::new(VecCursor::new(
            vec![ColumnMetadata::new("id", sql_types::INTEGER)],
            rows,
        ))
    }

    #[tokio::test]
    async fn test_lookahead_buffers_one_row() {
        let mut cursor = LookaheadCursor::new(cursor(2));
        assert!(cursor.has_next().await.unwrap());
        assert!(cursor.has_next().await.unwrap());
        assert_eq!(cursor.peek().await.unwrap(), Some(&vec![SqlValue::Int(0)]));
        assert_eq!(cursor.next().await.unwrap(), Some(vec![SqlValue::Int(0)]));
        assert_eq!(cursor.next().await.unwrap(), Some(vec![SqlValue::Int(1)]));
        assert!(!cursor.has_next().await.unwrap());
        assert_eq!(cursor.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lookahead_on_empty_cursor() {
        let mut cursor = LookaheadCursor::new(cursor(0));
        assert!(!cursor.has_next().await.unwrap());
        assert_eq!(cursor.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_trimmed_cursor_hides_helper_column() {
        let inner = VecCursor::new(
            vec![
                ColumnMetadata::new("id", sql_types::INTEGER),
                ColumnMetadata::new("MIGRATOR_RN", sql_types::BIGINT),
            ],
            vec![vec![SqlValue::Int(7), SqlValue::Int(1)]],
        );
        let mut cursor = TrimmedCursor::new(Box::new(inner), 1);
        assert_eq!(cursor.columns().len(), 1);
        assert_eq!(collect_rows(&mut cursor).await.unwrap(), vec![vec![SqlValue::Int(7)]]);
    }
}
