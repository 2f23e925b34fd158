//! Database driver implementations.
//!
//! Each engine module provides a [`Dialect`](crate::core::traits::Dialect) and a
//! [`SqlConnection`](crate::core::traits::SqlConnection):
//!
//! - [`postgres`]: PostgreSQL
//! - [`mssql`]: Microsoft SQL Server
//! - [`mysql`]: MySQL/MariaDB (connection behind the `mysql` feature)
//! - [`sqlite`]: SQLite
//! - [`common`]: shared utilities (TLS)
//!
//! # Adding New Databases
//!
//! 1. Create a module under `drivers/` with a dialect and a connection
//! 2. Register the dialect in [`DriverCatalog::with_builtins`]
//! 3. Add its connector to `catalog::open_connection`

mod catalog;
pub mod common;
pub mod mssql;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use catalog::{ConnectOptions, DriverCatalog};
pub use common::SslMode;
pub use mssql::{MssqlConnection, MssqlDialect};
#[cfg(feature = "mysql")]
pub use mysql::MysqlConnection;
pub use mysql::MysqlDialect;
pub use postgres::{PostgresConnection, PostgresDialect};
pub use sqlite::{SqliteConnection, SqliteDialect};
