//! Backend selection from connection URLs.

use std::sync::Arc;

use migrator_core::ConnectionFactory;
use mysql_types::MySqlConnectionFactory;
use postgresql_types::PostgresConnectionFactory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    MySql,
    PostgreSql,
}

impl Backend {
    /// Backend named by the scheme of `url`.
    pub fn from_url(url: &str) -> anyhow::Result<Self> {
        let scheme = url
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .ok_or_else(|| anyhow::anyhow!("Connection URL has no scheme"))?;
        match scheme.as_str() {
            "mysql" => Ok(Backend::MySql),
            "postgres" | "postgresql" => Ok(Backend::PostgreSql),
            other => anyhow::bail!("Unsupported connection URL scheme '{other}'"),
        }
    }
}

/// Open a connection factory for `url`.
pub fn connection_factory(url: &str) -> anyhow::Result<Arc<dyn ConnectionFactory>> {
    let factory: Arc<dyn ConnectionFactory> = match Backend::from_url(url)? {
        Backend::MySql => Arc::new(MySqlConnectionFactory::new(url)?),
        Backend::PostgreSql => Arc::new(PostgresConnectionFactory::new(url)),
    };
    Ok(factory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_scheme() {
        assert_eq!(Backend::from_url("mysql://root@localhost/shop").unwrap(), Backend::MySql);
        assert_eq!(Backend::from_url("postgres://localhost/shop").unwrap(), Backend::PostgreSql);
        assert_eq!(Backend::from_url("PostgreSQL://localhost/shop").unwrap(), Backend::PostgreSql);
        assert!(Backend::from_url("oracle://localhost").is_err());
        assert!(Backend::from_url("localhost:3306").is_err());
    }
}
