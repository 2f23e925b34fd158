//! # schemigrate
//!
//! Versioned, reversible database schema migrations.
//!
//! Migrations are Rust types implementing [`Migration`], registered with a
//! [`MigrationLoader`] and run by a [`Migrator`] against one database through a
//! [`TransformationProvider`]. Applied versions are recorded in a ledger table
//! (`SchemaInfo` by default) inside the target database.
//!
//! - **Engines**: PostgreSQL, SQL Server, MySQL/MariaDB and SQLite, each a
//!   [`Dialect`] rendering the same abstract operations into native SQL
//! - **Transactions**: a whole run is atomic where the engine has transactional
//!   DDL; elsewhere failures report the last committed version
//! - **Introspection**: existence checks always read the live catalog
//!
//! ## Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use schemigrate::{
//!     Column, DbType, Migration, MigrationLoader, Migrator, Result, TransformationProvider,
//! };
//!
//! struct CreateUsers;
//!
//! #[async_trait]
//! impl Migration for CreateUsers {
//!     fn version(&self) -> i64 {
//!         1
//!     }
//!
//!     async fn up(&self, db: &mut TransformationProvider) -> Result<()> {
//!         db.add_table(
//!             "Users",
//!             vec![
//!                 Column::new("Id", DbType::Int32).primary_key().identity(),
//!                 Column::new("Email", DbType::String).size(255).not_null(),
//!             ],
//!         )
//!         .await
//!     }
//!
//!     async fn down(&self, db: &mut TransformationProvider) -> Result<()> {
//!         db.remove_table("Users").await
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let provider = TransformationProvider::connect("sqlite", "sqlite:app.db").await?;
//!     let mut migrator = Migrator::new(provider, MigrationLoader::new().with(CreateUsers));
//!     let report = migrator.migrate_to_latest().await?;
//!     println!("Now at version {}", report.to_version);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod ledger;
pub mod loader;
pub mod orchestrator;
pub mod provider;

// Re-exports for convenient access
pub use crate::config::{Config, DatabaseConfig, MigrationConfig};
pub use crate::core::{
    Column, ColumnProperty, Constraint, ConstraintKind, DbType, DefaultValue, Dialect,
    ForeignKeyAction, NamedConstraint, Row, SqlConnection, SqlValue, Table,
};
pub use drivers::{ConnectOptions, DriverCatalog, SslMode};
pub use error::{MigrateError, Result};
pub use ledger::{VersionLedger, DEFAULT_LEDGER_TABLE};
pub use loader::{Migration, MigrationLoader};
pub use orchestrator::{
    Direction, MigrationReport, MigrationStatus, MigrationTarget, Migrator, RunState,
};
pub use provider::{ScopedProvider, TransformationProvider};
