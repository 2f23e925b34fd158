//! Driver catalog for explicit dependency injection.
//!
//! The [`DriverCatalog`] maps engine names to dialects and opens connections for
//! them. It is constructed explicitly rather than living in a global registry, so
//! tests can register their own dialects.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::traits::{Dialect, SqlConnection};
use crate::error::{MigrateError, Result};

use super::common::SslMode;
use super::{MssqlDialect, MysqlDialect, PostgresDialect, SqliteDialect};

/// Options applied when opening a connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectOptions {
    /// Overrides whatever TLS setting the connection string carries.
    pub ssl_mode: Option<SslMode>,
}

/// Registry of database dialects keyed by canonical name.
///
/// # Example
///
/// ```rust,ignore
/// let catalog = DriverCatalog::with_builtins();
/// let dialect = catalog.require_dialect("postgresql")?;
/// assert_eq!(dialect.name(), "postgres");
/// ```
#[derive(Default)]
pub struct DriverCatalog {
    dialects: HashMap<String, Arc<dyn Dialect>>,
}

impl DriverCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with PostgreSQL, SQL Server, MySQL and SQLite registered.
    ///
    /// MySQL is registered even without the `mysql` feature so its DDL can be
    /// rendered; connecting to it then fails with a configuration error.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register_dialect(PostgresDialect::new());
        catalog.register_dialect(MssqlDialect::new());
        catalog.register_dialect(MysqlDialect::new());
        catalog.register_dialect(SqliteDialect::new());
        catalog
    }

    /// Register a dialect under its own name.
    pub fn register_dialect(&mut self, dialect: impl Dialect + 'static) {
        self.register_dialect_arc(Arc::new(dialect));
    }

    /// Register a shared dialect under its own name.
    pub fn register_dialect_arc(&mut self, dialect: Arc<dyn Dialect>) {
        self.dialects.insert(dialect.name().to_string(), dialect);
    }

    /// Look up a dialect by canonical name or alias, case-insensitively.
    pub fn get_dialect(&self, name: &str) -> Option<Arc<dyn Dialect>> {
        if let Some(dialect) = self.dialects.get(name) {
            return Some(dialect.clone());
        }
        self.dialects
            .values()
            .find(|d| d.matches_name(name))
            .cloned()
    }

    /// Get a dialect by name, returning an error if not found.
    pub fn require_dialect(&self, name: &str) -> Result<Arc<dyn Dialect>> {
        self.get_dialect(name).ok_or_else(|| {
            MigrateError::Config(format!(
                "Unknown database type: '{}'. Supported types: {}",
                name,
                self.dialect_names().join(", ")
            ))
        })
    }

    /// Check if a dialect is registered under `name` or an alias.
    pub fn has_dialect(&self, name: &str) -> bool {
        self.get_dialect(name).is_some()
    }

    /// All registered canonical names, sorted.
    pub fn dialect_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.dialects.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve `engine` and open a connection to it.
    pub async fn connect(
        &self,
        engine: &str,
        connection_string: &str,
        options: ConnectOptions,
    ) -> Result<(Arc<dyn Dialect>, Box<dyn SqlConnection>)> {
        let dialect = self.require_dialect(engine)?;
        let conn = open_connection(dialect.name(), connection_string, options).await?;
        Ok((dialect, conn))
    }
}

async fn open_connection(
    name: &str,
    connection_string: &str,
    options: ConnectOptions,
) -> Result<Box<dyn SqlConnection>> {
    let conn: Box<dyn SqlConnection> = match name {
        "postgres" => Box::new(
            super::PostgresConnection::connect(connection_string, options.ssl_mode).await?,
        ),
        "mssql" => {
            Box::new(super::MssqlConnection::connect(connection_string, options.ssl_mode).await?)
        }
        #[cfg(feature = "mysql")]
        "mysql" => {
            Box::new(super::MysqlConnection::connect(connection_string, options.ssl_mode).await?)
        }
        #[cfg(not(feature = "mysql"))]
        "mysql" => {
            return Err(MigrateError::Config(
                "MySQL support requires the 'mysql' feature".into(),
            ))
        }
        "sqlite" => Box::new(super::SqliteConnection::connect(connection_string).await?),
        other => {
            return Err(MigrateError::Config(format!(
                "No connector available for database type '{}'",
                other
            )))
        }
    };
    Ok(conn)
}

impl std::fmt::Debug for DriverCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverCatalog")
            .field("dialects", &self.dialect_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_resolve_aliases() {
        let catalog = DriverCatalog::with_builtins();
        assert_eq!(catalog.require_dialect("postgresql").unwrap().name(), "postgres");
        assert_eq!(catalog.require_dialect("PG").unwrap().name(), "postgres");
        assert_eq!(catalog.require_dialect("sqlserver").unwrap().name(), "mssql");
        assert_eq!(catalog.require_dialect("mariadb").unwrap().name(), "mysql");
        assert_eq!(catalog.require_dialect("sqlite").unwrap().name(), "sqlite");
    }

    #[test]
    fn test_unknown_dialect_lists_supported() {
        let catalog = DriverCatalog::with_builtins();
        let err = catalog.require_dialect("oracle").unwrap_err().to_string();
        assert!(err.contains("oracle"));
        assert!(err.contains("mssql, mysql, postgres, sqlite"));
    }

    #[test]
    fn test_register_custom_dialect() {
        let mut catalog = DriverCatalog::new();
        assert!(!catalog.has_dialect("sqlite"));
        catalog.register_dialect(SqliteDialect::new());
        assert!(catalog.has_dialect("sqlite3"));
        assert_eq!(catalog.dialect_names(), vec!["sqlite"]);
    }

    #[tokio::test]
    async fn test_connect_sqlite_in_memory() {
        let catalog = DriverCatalog::with_builtins();
        let (dialect, mut conn) = catalog
            .connect("sqlite", "sqlite::memory:", ConnectOptions::default())
            .await
            .unwrap();
        assert_eq!(dialect.name(), "sqlite");
        assert_eq!(conn.db_type(), "sqlite");
        conn.close().await.unwrap();
    }
}
