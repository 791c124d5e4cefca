//! [`Connection`] implementation over `tokio-postgres`.
//!
//! Statements use `?` placeholders like every other backend; they are
//! rewritten to PostgreSQL's `$n` form before being prepared. Query results
//! are streamed row by row.

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::StreamExt;
use migrator_core::dialect::PostgresDialect;
use migrator_core::{
    BoundParam, ColumnMetadata, Connection, ConnectionFactory, Cursor, Dialect, MigratorError, Result,
    Row, Signature,
};
use postgres_types::ToSql;
use tokio_postgres::{Client, NoTls, RowStream, Statement};
use tracing::{debug, error};

use crate::forward::PostgreSQLParam;
use crate::reverse::row_to_sql_values;
use crate::schema::column_metadata;

/// Rewrite `?` placeholders to `$1`, `$2`, ...
///
/// Quoted strings and identifiers are left alone, and `??` stands for a
/// literal `?` (the JSONB key-exists operator).
pub fn translate_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            '?' if chars.peek() == Some(&'?') => {
                chars.next();
                out.push('?');
            }
            '?' => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
            }
            _ => out.push(c),
        }
    }
    out
}

/// Opens PostgreSQL connections from a `postgres://` URL.
pub struct PostgresConnectionFactory {
    url: String,
}

impl PostgresConnectionFactory {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ConnectionFactory for PostgresConnectionFactory {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let (client, connection) = tokio_postgres::connect(&self.url, NoTls)
            .await
            .map_err(|e| MigratorError::sql(format!("Failed to connect to PostgreSQL: {e}")))?;

        // Spawn connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Connection error: {e}");
            }
        });

        let row = client
            .query_one("SHOW server_version", &[])
            .await
            .map_err(MigratorError::sql)?;
        let version: String = row.try_get(0).map_err(MigratorError::sql)?;
        let signature = Signature::parse_version("PostgreSQL", &version);
        debug!("Connected to {}", signature);
        Ok(Box::new(PostgresConnection {
            client,
            signature,
            statements: HashMap::new(),
            in_transaction: false,
        }))
    }
}

/// Streaming cursor over a `RowStream`.
pub struct PostgresCursor {
    columns: Vec<ColumnMetadata>,
    rows: Pin<Box<RowStream>>,
}

#[async_trait]
impl Cursor for PostgresCursor {
    fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        match self.rows.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(MigratorError::sql(e)),
            Some(Ok(row)) => Ok(Some(row_to_sql_values(&row)?)),
        }
    }
}

/// One PostgreSQL session.
pub struct PostgresConnection {
    client: Client,
    signature: Signature,
    statements: HashMap<String, Statement>,
    in_transaction: bool,
}

fn to_params(params: &[BoundParam]) -> Vec<PostgreSQLParam> {
    params.iter().map(PostgreSQLParam::from).collect()
}

impl PostgresConnection {
    /// Prepare a statement, reusing earlier preparations of the same SQL.
    async fn prepare(&mut self, sql: &str) -> Result<Statement> {
        if let Some(statement) = self.statements.get(sql) {
            return Ok(statement.clone());
        }
        let statement = self
            .client
            .prepare(&translate_placeholders(sql))
            .await
            .map_err(MigratorError::sql)?;
        self.statements.insert(sql.to_string(), statement.clone());
        Ok(statement)
    }

    async fn execute_prepared(&self, statement: &Statement, params: &[BoundParam]) -> Result<u64> {
        let params = to_params(params);
        self.client
            .execute_raw(statement, params.iter().map(|p| p as &(dyn ToSql + Sync)))
            .await
            .map_err(MigratorError::sql)
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    async fn query(&mut self, sql: &str, params: &[BoundParam]) -> Result<Box<dyn Cursor>> {
        let statement = self.prepare(sql).await?;
        let columns = statement.columns().iter().map(column_metadata).collect();
        let params = to_params(params);
        let rows = self
            .client
            .query_raw(&statement, params.iter().map(|p| p as &(dyn ToSql + Sync)))
            .await
            .map_err(MigratorError::sql)?;
        Ok(Box::new(PostgresCursor {
            columns,
            rows: Box::pin(rows),
        }))
    }

    async fn execute(&mut self, sql: &str, params: &[BoundParam]) -> Result<u64> {
        let statement = self.prepare(sql).await?;
        self.execute_prepared(&statement, params).await
    }

    async fn execute_batch(&mut self, sql: &str, rows: &[Vec<BoundParam>]) -> Result<u64> {
        let statement = self.prepare(sql).await?;
        let mut affected = 0;
        for params in rows {
            affected += self.execute_prepared(&statement, params).await?;
        }
        Ok(affected)
    }

    async fn begin(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.client
                .batch_execute("BEGIN")
                .await
                .map_err(MigratorError::sql)?;
            self.in_transaction = true;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            // stay in manual commit mode
            self.client
                .batch_execute("COMMIT; BEGIN")
                .await
                .map_err(MigratorError::sql)?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.client
                .batch_execute("ROLLBACK; BEGIN")
                .await
                .map_err(MigratorError::sql)?;
        }
        Ok(())
    }

    async fn table_columns(&mut self, table: &str) -> Result<Vec<ColumnMetadata>> {
        let sql = format!("SELECT * FROM {} LIMIT 0", PostgresDialect.quote_identifier(table));
        let statement = self.prepare(&sql).await?;
        Ok(statement.columns().iter().map(column_metadata).collect())
    }
}
