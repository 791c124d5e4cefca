//! PostgreSQL backend for db-migrator.
//!
//! # Modules
//!
//! - [`schema`] - PostgreSQL types → SQL type codes
//! - [`reverse`] - PostgreSQL values → [`migrator_core::SqlValue`]
//! - [`forward`] - bound parameters → PostgreSQL parameters
//! - [`connection`] - [`migrator_core::Connection`] over `tokio-postgres`
//!
//! # Example
//!
//! ```ignore
//! use migrator_core::ConnectionFactory;
//! use postgresql_types::PostgresConnectionFactory;
//!
//! let factory = PostgresConnectionFactory::new("postgres://postgres@localhost/shop");
//! let mut conn = factory.connect().await?;
//! let mut cursor = conn.query("SELECT * FROM orders", &[]).await?;
//! ```

pub mod connection;
pub mod forward;
pub mod reverse;
pub mod schema;

pub use connection::{translate_placeholders, PostgresConnection, PostgresConnectionFactory};
pub use forward::PostgreSQLParam;
pub use reverse::{row_to_sql_values, ConversionError};
pub use schema::{column_metadata, pg_type_to_type_code};
