//! Transformation provider.
//!
//! [`TransformationProvider`] turns abstract schema and data operations into SQL
//! through its [`Dialect`] and runs them over one [`SqlConnection`]. Operations
//! are split by concern:
//!
//! - `schema`: tables, columns and constraints
//! - `introspection`: existence checks and catalog reads (never cached)
//! - `dml`: typed insert/update/delete/select and the raw escape hatch
//!
//! Transactions are plain `BEGIN`/`COMMIT`/`ROLLBACK` statements rendered by the
//! dialect, wrapped in the dialect's session setup and teardown. The provider
//! only tracks whether one is open.

mod dml;
mod introspection;
mod schema;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::traits::{Dialect, SqlConnection};
use crate::core::value::{Row, SqlValue};
use crate::drivers::{ConnectOptions, DriverCatalog};
use crate::error::{MigrateError, Result};
use crate::ledger::{VersionLedger, DEFAULT_LEDGER_TABLE};

pub use dml::ScopedProvider;

/// Executes schema and data operations against one database.
pub struct TransformationProvider {
    dialect: Arc<dyn Dialect>,
    conn: Box<dyn SqlConnection>,
    in_transaction: bool,
    ledger_table: String,
}

impl TransformationProvider {
    /// Wrap an open connection.
    pub fn new(dialect: Arc<dyn Dialect>, conn: Box<dyn SqlConnection>) -> Self {
        Self {
            dialect,
            conn,
            in_transaction: false,
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }

    /// Resolve `engine` through the built-in catalog and connect.
    pub async fn connect(engine: &str, connection_string: &str) -> Result<Self> {
        Self::connect_with(
            &DriverCatalog::with_builtins(),
            engine,
            connection_string,
            ConnectOptions::default(),
        )
        .await
    }

    /// Connect through an explicit catalog.
    pub async fn connect_with(
        catalog: &DriverCatalog,
        engine: &str,
        connection_string: &str,
        options: ConnectOptions,
    ) -> Result<Self> {
        let (dialect, conn) = catalog.connect(engine, connection_string, options).await?;
        Ok(Self::new(dialect, conn))
    }

    /// Use a ledger table other than `SchemaInfo`.
    pub fn with_ledger_table(mut self, table: impl Into<String>) -> Self {
        self.ledger_table = table.into();
        self
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    pub fn ledger_table(&self) -> &str {
        &self.ledger_table
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    // ===== Execution =====

    pub(crate) async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        debug!("[{}] {}", self.dialect.name(), sql);
        self.conn.execute(sql, params).await
    }

    pub(crate) async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        debug!("[{}] {}", self.dialect.name(), sql);
        self.conn.query(sql, params).await
    }

    /// Run DDL statements in order, reporting driver failures as schema errors.
    async fn execute_ddl(&mut self, operation: &str, statements: &[String]) -> Result<()> {
        for sql in statements {
            self.execute(sql, &[])
                .await
                .map_err(|e| schema_error(operation, e))?;
        }
        Ok(())
    }

    // ===== Transactions =====

    /// Open a transaction. Does nothing when one is already open.
    pub async fn begin_transaction(&mut self) -> Result<()> {
        if self.in_transaction {
            return Ok(());
        }
        let dialect = Arc::clone(&self.dialect);
        for sql in dialect.transaction_setup_sql() {
            self.execute(sql, &[]).await?;
        }
        if let Err(e) = self.execute(dialect.begin_sql(), &[]).await {
            self.restore_session().await;
            return Err(e);
        }
        self.in_transaction = true;
        Ok(())
    }

    /// Commit the open transaction. Succeeds silently when none is open.
    ///
    /// When the integrity check or the commit itself fails, the transaction is
    /// rolled back before the error is returned, so nothing stays open.
    pub async fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        let dialect = Arc::clone(&self.dialect);
        let committed = match self.check_integrity().await {
            Ok(()) => self.execute(dialect.commit_sql(), &[]).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = committed {
            if let Err(rollback) = self.rollback().await {
                warn!("Rollback after failed commit also failed: {}", rollback);
            }
            return Err(e);
        }
        self.in_transaction = false;
        self.restore_session().await;
        Ok(())
    }

    /// Roll back the open transaction. Succeeds silently when none is open.
    pub async fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        let sql = self.dialect.rollback_sql().to_string();
        self.in_transaction = false;
        let result = self.execute(&sql, &[]).await.map(|_| ());
        self.restore_session().await;
        result
    }

    async fn check_integrity(&mut self) -> Result<()> {
        let Some(sql) = self.dialect.integrity_check_sql().map(str::to_string) else {
            return Ok(());
        };
        let violations = self.query(&sql, &[]).await?;
        if let Some(first) = violations.first() {
            return Err(MigrateError::Migration(format!(
                "{} foreign key violation(s) before commit, first in table '{}' referencing '{}'",
                violations.len(),
                first.text(0).unwrap_or_default(),
                first.text(2).unwrap_or_default()
            )));
        }
        Ok(())
    }

    async fn restore_session(&mut self) {
        let dialect = Arc::clone(&self.dialect);
        for sql in dialect.transaction_teardown_sql() {
            if let Err(e) = self.execute(sql, &[]).await {
                warn!("Failed to restore session setting '{}': {}", sql, e);
            }
        }
    }

    /// Roll back anything still open and release the connection.
    pub async fn close(&mut self) -> Result<()> {
        if self.in_transaction {
            warn!("Closing connection with an open transaction; rolling back");
            self.rollback().await?;
        }
        self.conn.close().await
    }

    // ===== Ledger =====

    /// Applied versions, ascending. Creates the ledger table when absent.
    pub async fn applied_migrations(&mut self) -> Result<Vec<i64>> {
        VersionLedger::new(self).applied_migrations().await
    }

    /// Record `version` as applied.
    pub async fn migration_applied(&mut self, version: i64) -> Result<()> {
        VersionLedger::new(self).migration_applied(version).await
    }

    /// Remove `version` from the ledger.
    pub async fn migration_unapplied(&mut self, version: i64) -> Result<()> {
        VersionLedger::new(self).migration_unapplied(version).await
    }
}

impl std::fmt::Debug for TransformationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformationProvider")
            .field("dialect", &self.dialect.name())
            .field("in_transaction", &self.in_transaction)
            .field("ledger_table", &self.ledger_table)
            .finish()
    }
}

/// Driver errors become [`MigrateError::Schema`]; errors raised locally pass through.
fn schema_error(operation: &str, error: MigrateError) -> MigrateError {
    match error {
        MigrateError::Postgres(_) | MigrateError::Mssql(_) | MigrateError::Sqlx(_) => {
            MigrateError::schema(operation, error)
        }
        other => other,
    }
}
