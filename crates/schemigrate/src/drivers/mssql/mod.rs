//! Microsoft SQL Server driver.
//!
//! - [`MssqlDialect`]: T-SQL syntax strategy
//! - [`MssqlConnection`]: Tiberius session

mod connection;
mod dialect;

pub use connection::MssqlConnection;
pub use dialect::MssqlDialect;
