//! [`Connection`] implementation over `mysql_async`.

use async_trait::async_trait;
use migrator_core::dialect::MySqlDialect;
use migrator_core::{
    BoundParam, ColumnMetadata, Connection, ConnectionFactory, Cursor, Dialect, MigratorError, Result,
    Row, Signature, VecCursor,
};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Pool, Value};
use tracing::{debug, info};

use crate::forward::to_params;
use crate::reverse::to_sql_value;
use crate::schema::column_metadata;

/// Opens pooled MySQL connections from a `mysql://` URL.
pub struct MySqlConnectionFactory {
    pool: Pool,
}

impl MySqlConnectionFactory {
    pub fn new(url: &str) -> Result<Self> {
        let pool = Pool::from_url(url).map_err(|e| {
            MigratorError::sql(format!(
                "Failed to create MySQL connection pool from URI '{}': {e}",
                sanitize_connection_string(url)
            ))
        })?;
        Ok(Self { pool })
    }

    pub async fn disconnect(self) -> Result<()> {
        self.pool.disconnect().await.map_err(MigratorError::sql)
    }
}

#[async_trait]
impl ConnectionFactory for MySqlConnectionFactory {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let mut conn = self.pool.get_conn().await.map_err(MigratorError::sql)?;
        let version: Option<String> = conn
            .query_first("SELECT VERSION()")
            .await
            .map_err(MigratorError::sql)?;
        conn.query_drop("SET time_zone = '+00:00'")
            .await
            .map_err(MigratorError::sql)?;
        let signature = Signature::parse_version("MySQL", version.as_deref().unwrap_or_default());
        debug!("Connected to {}", signature);
        Ok(Box::new(MySqlConnection { conn, signature }))
    }
}

/// One MySQL session.
///
/// Result sets are read completely before the cursor is returned; splits keep
/// them bounded by the chunk size.
pub struct MySqlConnection {
    conn: Conn,
    signature: Signature,
}

impl MySqlConnection {
    async fn fetch(&mut self, sql: &str, params: &[BoundParam]) -> Result<(Vec<ColumnMetadata>, Vec<Row>)> {
        let mut result = self
            .conn
            .exec_iter(sql, to_params(params))
            .await
            .map_err(MigratorError::sql)?;
        let columns: Vec<ColumnMetadata> = result.columns_ref().iter().map(column_metadata).collect();
        let raw: Vec<mysql_async::Row> = result.collect().await.map_err(MigratorError::sql)?;
        let mut rows = Vec::with_capacity(raw.len());
        for mut row in raw {
            let values = columns
                .iter()
                .enumerate()
                .map(|(i, column)| to_sql_value(row.take::<Value, _>(i).unwrap_or(Value::NULL), column))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.push(values);
        }
        Ok((columns, rows))
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    async fn query(&mut self, sql: &str, params: &[BoundParam]) -> Result<Box<dyn Cursor>> {
        let (columns, rows) = self.fetch(sql, params).await?;
        Ok(Box::new(VecCursor::new(columns, rows)))
    }

    async fn execute(&mut self, sql: &str, params: &[BoundParam]) -> Result<u64> {
        self.conn
            .exec_drop(sql, to_params(params))
            .await
            .map_err(MigratorError::sql)?;
        Ok(self.conn.affected_rows())
    }

    async fn execute_batch(&mut self, sql: &str, rows: &[Vec<BoundParam>]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.conn
            .exec_batch(sql, rows.iter().map(|row| to_params(row)))
            .await
            .map_err(MigratorError::sql)?;
        Ok(rows.len() as u64)
    }

    async fn begin(&mut self) -> Result<()> {
        self.conn
            .query_drop("SET autocommit = 0")
            .await
            .map_err(MigratorError::sql)
    }

    async fn commit(&mut self) -> Result<()> {
        self.conn.query_drop("COMMIT").await.map_err(MigratorError::sql)
    }

    async fn rollback(&mut self) -> Result<()> {
        self.conn.query_drop("ROLLBACK").await.map_err(MigratorError::sql)
    }

    async fn table_columns(&mut self, table: &str) -> Result<Vec<ColumnMetadata>> {
        let sql = format!("SELECT * FROM {} LIMIT 0", MySqlDialect.quote_identifier(table));
        let (columns, _) = self.fetch(&sql, &[]).await?;
        if columns.is_empty() {
            return Err(MigratorError::sql(format!("table '{table}' has no columns")));
        }
        info!("Table {} has {} columns", table, columns.len());
        Ok(columns)
    }
}

/// Hide the password of a connection URL in log and error output.
pub fn sanitize_connection_string(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.rsplit_once('@') {
        Some((credentials, host)) => {
            let user = credentials.split(':').next().unwrap_or_default();
            format!("{scheme}://{user}:****@{host}")
        }
        None => url.to_string(),
    }
}
