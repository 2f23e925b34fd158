//! Core abstractions shared by every engine.
//!
//! - [`schema`]: column, table and constraint descriptors
//! - [`value`]: bound parameter values and result rows
//! - [`traits`]: the [`Dialect`] and [`SqlConnection`] seams
//! - [`identifier`]: identifier validation and quoting
//!
//! Driver modules (`drivers/postgres`, `drivers/mssql`, ...) implement the traits;
//! nothing in here talks to a database.

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{
    Column, ColumnProperties, ColumnProperty, Constraint, ConstraintInfo, ConstraintKind,
    DbType, DefaultValue, ForeignKeyAction, NamedConstraint, Table,
};
pub use traits::{AlterStrategy, CatalogQuery, Dialect, SqlConnection, TableChange};
pub use value::{Row, SqlValue};
