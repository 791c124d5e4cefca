//! Chunked query splitting.
//!
//! A [`QuerySplitter`] cuts a base query into disjoint row-count windows.
//! The splitter itself is single-owner (`&mut self`); each [`QuerySplit`] it
//! produces is an independent unit of work that can be opened on any
//! connection, which is what lets workers extract chunks in parallel.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::{Connection, Cursor, TrimmedCursor};
use crate::dialect::Dialect;
use crate::error::{MigratorError, Result};
use crate::values::BoundParam;

/// How window bounds reach the database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingMode {
    /// Window bounds are bound as statement parameters.
    #[default]
    Parameterized,
    /// Window bounds are inlined into one-off SQL per split.
    Literal,
}

impl std::str::FromStr for BindingMode {
    type Err = MigratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "parameterized" => Ok(BindingMode::Parameterized),
            "literal" => Ok(BindingMode::Literal),
            other => Err(MigratorError::format(format!("unknown binding mode '{other}'"))),
        }
    }
}

/// A row window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryLimit {
    pub count: u64,
    pub offset: u64,
}

/// Statement of one split, ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitStatement {
    pub sql: String,
    pub params: Vec<BoundParam>,
    hidden_columns: usize,
}

/// One extraction window: consumed once, then discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySplit {
    pub index: u64,
    /// `None` for the single split of an unbounded splitter.
    pub limit: Option<QueryLimit>,
    pub statement: SplitStatement,
}

impl QuerySplit {
    /// Execute the split's statement and return the open result cursor.
    pub async fn open(&self, conn: &mut dyn Connection) -> Result<Box<dyn Cursor>> {
        let cursor = conn
            .query(&self.statement.sql, &self.statement.params)
            .await?;
        if self.statement.hidden_columns > 0 {
            Ok(Box::new(TrimmedCursor::new(
                cursor,
                self.statement.hidden_columns,
            )))
        } else {
            Ok(cursor)
        }
    }
}

/// Partitions a query into windows of at most `chunk_size` rows.
pub struct QuerySplitter {
    dialect: Arc<dyn Dialect>,
    query: String,
    params: Vec<BoundParam>,
    chunk_size: Option<u64>,
    base_offset: u64,
    mode: BindingMode,
    index: u64,
    total: Option<u64>,
}

impl QuerySplitter {
    pub fn new(dialect: Arc<dyn Dialect>, query: impl Into<String>, params: Vec<BoundParam>) -> Self {
        Self {
            dialect,
            query: query.into(),
            params,
            chunk_size: None,
            base_offset: 0,
            mode: BindingMode::default(),
            index: 0,
            total: None,
        }
    }

    /// Rows per split. `None` or zero yields a single split.
    pub fn with_chunk_size(mut self, chunk_size: Option<u64>) -> Self {
        self.chunk_size = chunk_size.filter(|size| *size > 0);
        self
    }

    pub fn with_base_offset(mut self, base_offset: u64) -> Self {
        self.base_offset = base_offset;
        self
    }

    pub fn with_binding_mode(mut self, mode: BindingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    fn is_unbounded(&self) -> bool {
        self.chunk_size.is_none() && self.base_offset == 0
    }

    /// Rows past the base offset. Computed once, then cached.
    pub async fn total_row_count(&mut self, conn: &mut dyn Connection) -> Result<u64> {
        if let Some(total) = self.total {
            return Ok(total);
        }
        let strategy = self.dialect.row_count_strategy();
        let count = strategy
            .count(conn, self.dialect.as_ref(), &self.query, &self.params)
            .await?;
        let total = count.saturating_sub(self.base_offset);
        debug!(
            "Query has {} rows past offset {} ({} in total)",
            total, self.base_offset, count
        );
        self.total = Some(total);
        Ok(total)
    }

    pub async fn has_next_split(&mut self, conn: &mut dyn Connection) -> Result<bool> {
        if self.index == 0 {
            return Ok(true);
        }
        match self.chunk_size {
            Some(chunk) if !self.is_unbounded() => {
                let total = self.total_row_count(conn).await?;
                Ok(self.index.saturating_mul(chunk) < total)
            }
            _ => Ok(false),
        }
    }

    /// Build the next split, or `None` once every window has been produced.
    pub async fn next_split(&mut self, conn: &mut dyn Connection) -> Result<Option<QuerySplit>> {
        if !self.has_next_split(conn).await? {
            return Ok(None);
        }
        let index = self.index;
        let split = if self.is_unbounded() {
            QuerySplit {
                index,
                limit: None,
                statement: SplitStatement {
                    sql: self.query.clone(),
                    params: self.params.clone(),
                    hidden_columns: 0,
                },
            }
        } else {
            let total = self.total_row_count(conn).await?;
            let chunk = self.chunk_size.unwrap_or(total);
            let start = index.saturating_mul(chunk);
            let limit = QueryLimit {
                count: chunk.min(total.saturating_sub(start)),
                offset: self.base_offset + start,
            };
            let limited = self.dialect.limit_query(&self.query, &limit, self.mode)?;
            let params = limited
                .start_params
                .into_iter()
                .map(BoundParam::Value)
                .chain(self.params.iter().cloned())
                .chain(limited.end_params.into_iter().map(BoundParam::Value))
                .collect();
            QuerySplit {
                index,
                limit: Some(limit),
                statement: SplitStatement {
                    sql: limited.sql,
                    params,
                    hidden_columns: limited.hidden_columns,
                },
            }
        };
        debug!("Produced split {} with window {:?}", index, split.limit);
        self.index += 1;
        Ok(Some(split))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::collect_rows;
    use crate::dialect::{GenericDialect, SqlServerDialect};
    use crate::memory::MemoryDatabase;
    use crate::types::sql_types;
    use crate::values::{ColumnMetadata, SqlValue};

    fn database(rows: u64) -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.create_table(
            "t",
            vec![ColumnMetadata::new("id", sql_types::BIGINT)],
            (0..rows).map(|i| vec![SqlValue::Int(i as i64)]).collect(),
        );
        db
    }

    async fn windows(total: u64, chunk: u64, base_offset: u64) -> Vec<QueryLimit> {
        let db = database(total + base_offset);
        let mut conn = db.connect();
        let mut splitter = QuerySplitter::new(Arc::new(GenericDialect), "SELECT * FROM t", vec![])
            .with_chunk_size(Some(chunk))
            .with_base_offset(base_offset);
        let mut limits = Vec::new();
        while let Some(split) = splitter.next_split(&mut conn).await.unwrap() {
            limits.push(split.limit.unwrap());
        }
        limits
    }

    #[tokio::test]
    async fn test_windows_tile_the_row_range() {
        let chunk = 10;
        for base_offset in [0, 3] {
            for total in [0, 1, chunk, chunk + 1, 10 * chunk + 7] {
                let limits = windows(total, chunk, base_offset).await;
                let mut next = base_offset;
                for limit in &limits {
                    assert_eq!(limit.offset, next, "gap or overlap for total {total}");
                    assert!(limit.count <= chunk);
                    next += limit.count;
                }
                assert_eq!(next, base_offset + total, "total {total}");
            }
        }
    }

    #[tokio::test]
    async fn test_2007_rows_in_chunks_of_1000() {
        let limits = windows(2007, 1000, 0).await;
        let counts: Vec<u64> = limits.iter().map(|l| l.count).collect();
        let offsets: Vec<u64> = limits.iter().map(|l| l.offset).collect();
        assert_eq!(counts, vec![1000, 1000, 7]);
        assert_eq!(offsets, vec![0, 1000, 2000]);
    }

    #[tokio::test]
    async fn test_row_count_is_queried_once() {
        let db = database(25);
        let mut conn = db.connect();
        let mut splitter = QuerySplitter::new(Arc::new(GenericDialect), "SELECT * FROM t", vec![])
            .with_chunk_size(Some(10));
        while splitter.next_split(&mut conn).await.unwrap().is_some() {}
        assert_eq!(db.count_queries(), 1);
        assert!(!splitter.has_next_split(&mut conn).await.unwrap());
    }

    #[tokio::test]
    async fn test_unbounded_splitter_yields_single_split_without_count() {
        let db = database(5);
        let mut conn = db.connect();
        let mut splitter = QuerySplitter::new(Arc::new(GenericDialect), "SELECT * FROM t", vec![]);
        let split = splitter.next_split(&mut conn).await.unwrap().unwrap();
        assert_eq!(split.limit, None);
        assert!(splitter.next_split(&mut conn).await.unwrap().is_none());
        assert_eq!(db.count_queries(), 0);

        let mut cursor = split.open(&mut conn).await.unwrap();
        assert_eq!(collect_rows(cursor.as_mut()).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_splits_read_disjoint_rows() {
        let db = database(23);
        let mut splitter = QuerySplitter::new(Arc::new(GenericDialect), "SELECT * FROM t", vec![])
            .with_chunk_size(Some(10))
            .with_binding_mode(BindingMode::Literal);
        let mut conn = db.connect();
        let mut splits = Vec::new();
        while let Some(split) = splitter.next_split(&mut conn).await.unwrap() {
            splits.push(split);
        }

        let mut seen = Vec::new();
        for split in splits.iter().rev() {
            let mut worker = db.connect();
            let mut cursor = split.open(&mut worker).await.unwrap();
            for row in collect_rows(cursor.as_mut()).await.unwrap() {
                seen.push(row[0].as_i64().unwrap());
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..23).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_parameter_order_is_start_caller_end() {
        let db = database(3);
        let mut conn = db.connect();
        let caller = BoundParam::Value(SqlValue::text("caller"));
        let mut splitter = QuerySplitter::new(
            Arc::new(SqlServerDialect::default()),
            "SELECT * FROM t WHERE name = ?",
            vec![caller.clone()],
        )
        .with_chunk_size(Some(2));
        // Prime the row count so the unsupported wrapper SQL is never sent.
        splitter.total = Some(3);
        let split = splitter.next_split(&mut conn).await.unwrap().unwrap();
        assert_eq!(
            split.statement.params,
            vec![
                BoundParam::Value(SqlValue::Int(2)),
                caller,
                BoundParam::Value(SqlValue::Int(0)),
            ]
        );
    }
}
