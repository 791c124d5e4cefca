//! Target-side write batching.
//!
//! A commit strategy owns the insert statement of one load worker and decides
//! when rows are sent and committed. It always commits on the connection that
//! ran the statements, and is never shared between workers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::connection::Connection;
use crate::error::{MigratorError, Result};
use crate::values::BoundParam;

#[async_trait]
pub trait CommitStrategy: Send {
    /// Add one row. Returns whether the call flushed and committed.
    async fn execute_row(&mut self, conn: &mut dyn Connection, params: Vec<BoundParam>) -> Result<bool>;

    /// Flush and commit whatever is pending. Calling it again is a no-op.
    async fn finish(&mut self, conn: &mut dyn Connection) -> Result<bool>;

    /// Rows handed to the database so far.
    fn rows_written(&self) -> u64;

    /// Commits issued so far.
    fn commits(&self) -> u64;
}

/// Sends rows in batches of `batch_size`, committing after each batch.
pub struct BatchCommitStrategy {
    sql: String,
    batch_size: usize,
    pending: Vec<Vec<BoundParam>>,
    rows_written: u64,
    commits: u64,
}

impl BatchCommitStrategy {
    pub fn new(sql: impl Into<String>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sql: sql.into(),
            batch_size,
            pending: Vec::with_capacity(batch_size),
            rows_written: 0,
            commits: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    async fn flush(&mut self, conn: &mut dyn Connection) -> Result<()> {
        let rows = std::mem::take(&mut self.pending);
        trace!("Flushing batch of {} rows", rows.len());
        conn.execute_batch(&self.sql, &rows).await?;
        conn.commit().await?;
        self.rows_written += rows.len() as u64;
        self.commits += 1;
        Ok(())
    }
}

#[async_trait]
impl CommitStrategy for BatchCommitStrategy {
    async fn execute_row(&mut self, conn: &mut dyn Connection, params: Vec<BoundParam>) -> Result<bool> {
        self.pending.push(params);
        if self.pending.len() >= self.batch_size {
            self.flush(conn).await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn finish(&mut self, conn: &mut dyn Connection) -> Result<bool> {
        if self.pending.is_empty() {
            return Ok(false);
        }
        self.flush(conn).await?;
        debug!(
            "Finished batch load: {} rows in {} commits",
            self.rows_written, self.commits
        );
        Ok(true)
    }

    fn rows_written(&self) -> u64 {
        self.rows_written
    }

    fn commits(&self) -> u64 {
        self.commits
    }
}

/// Executes each row immediately and commits once at the end.
pub struct SingleCommitStrategy {
    sql: String,
    uncommitted: u64,
    rows_written: u64,
    commits: u64,
}

impl SingleCommitStrategy {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            uncommitted: 0,
            rows_written: 0,
            commits: 0,
        }
    }
}

#[async_trait]
impl CommitStrategy for SingleCommitStrategy {
    async fn execute_row(&mut self, conn: &mut dyn Connection, params: Vec<BoundParam>) -> Result<bool> {
        conn.execute(&self.sql, &params).await?;
        self.uncommitted += 1;
        self.rows_written += 1;
        Ok(false)
    }

    async fn finish(&mut self, conn: &mut dyn Connection) -> Result<bool> {
        if self.uncommitted == 0 {
            return Ok(false);
        }
        conn.commit().await?;
        self.uncommitted = 0;
        self.commits += 1;
        Ok(true)
    }

    fn rows_written(&self) -> u64 {
        self.rows_written
    }

    fn commits(&self) -> u64 {
        self.commits
    }
}

/// Which commit strategy a load uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitMode {
    Single,
    #[default]
    Batch,
}

impl CommitMode {
    pub fn strategy(self, sql: impl Into<String>, batch_size: usize) -> Box<dyn CommitStrategy> {
        match self {
            CommitMode::Single => Box::new(SingleCommitStrategy::new(sql)),
            CommitMode::Batch => Box::new(BatchCommitStrategy::new(sql, batch_size)),
        }
    }
}

impl std::str::FromStr for CommitMode {
    type Err = MigratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(CommitMode::Single),
            "batch" => Ok(CommitMode::Batch),
            other => Err(MigratorError::format(format!("unknown commit mode '{other}'"))),
        }
    }
}

impl std::fmt::Display for CommitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitMode::Single => f.write_str("single"),
            CommitMode::Batch => f.write_str("batch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;
    use crate::types::sql_types;
    use crate::values::{ColumnMetadata, SqlValue};

    const INSERT: &str = "INSERT INTO \"t\" (\"id\") VALUES (?)";

    fn target() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.create_table("t", vec![ColumnMetadata::new("id", sql_types::INTEGER)], vec![]);
        db
    }

    fn row(i: i64) -> Vec<BoundParam> {
        vec![BoundParam::Value(SqlValue::Int(i))]
    }

    #[tokio::test]
    async fn test_flush_count_is_ceil_of_rows_over_batch() {
        for (rows, batch) in [(0u64, 3usize), (1, 3), (3, 3), (7, 3), (9, 3), (10, 1)] {
            let db = target();
            let mut conn = db.connect();
            conn.begin().await.unwrap();
            let mut strategy = BatchCommitStrategy::new(INSERT, batch);
            let mut flushed = 0;
            for i in 0..rows {
                if strategy.execute_row(&mut conn, row(i as i64)).await.unwrap() {
                    flushed += 1;
                }
            }
            assert_eq!(flushed, rows / batch as u64);

            let pending = strategy.pending() > 0;
            assert_eq!(strategy.finish(&mut conn).await.unwrap(), pending);
            assert_eq!(strategy.commits(), rows.div_ceil(batch as u64));
            assert_eq!(db.row_count("t"), rows as usize);

            assert!(!strategy.finish(&mut conn).await.unwrap());
            assert_eq!(strategy.commits(), rows.div_ceil(batch as u64));
        }
    }

    #[tokio::test]
    async fn test_rows_are_invisible_until_committed() {
        let db = target();
        let mut conn = db.connect();
        conn.begin().await.unwrap();
        let mut strategy = BatchCommitStrategy::new(INSERT, 2);
        strategy.execute_row(&mut conn, row(1)).await.unwrap();
        assert_eq!(db.row_count("t"), 0);
        strategy.execute_row(&mut conn, row(2)).await.unwrap();
        assert_eq!(db.row_count("t"), 2);
    }

    #[tokio::test]
    async fn test_single_commit_strategy_commits_once() {
        let db = target();
        let mut conn = db.connect();
        conn.begin().await.unwrap();
        let mut strategy = CommitMode::Single.strategy(INSERT, 100);
        for i in 0..5 {
            assert!(!strategy.execute_row(&mut conn, row(i)).await.unwrap());
        }
        assert_eq!(db.row_count("t"), 0);
        assert!(strategy.finish(&mut conn).await.unwrap());
        assert!(!strategy.finish(&mut conn).await.unwrap());
        assert_eq!(strategy.commits(), 1);
        assert_eq!(db.row_count("t"), 5);
    }

    #[test]
    fn test_commit_mode_parsing() {
        assert_eq!("BATCH".parse::<CommitMode>().unwrap(), CommitMode::Batch);
        assert_eq!("single".parse::<CommitMode>().unwrap(), CommitMode::Single);
        assert!("eventually".parse::<CommitMode>().is_err());
    }
}
