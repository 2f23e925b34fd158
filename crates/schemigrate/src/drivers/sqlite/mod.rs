//! SQLite driver.
//!
//! - [`SqliteDialect`]: SQL syntax strategy, with table rebuilds for the
//!   `ALTER TABLE` forms SQLite lacks
//! - [`SqliteConnection`]: SQLx session

mod connection;
mod ddl;
mod dialect;

pub use connection::SqliteConnection;
pub use dialect::SqliteDialect;
