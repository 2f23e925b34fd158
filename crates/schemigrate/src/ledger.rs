//! Version ledger.
//!
//! Applied migration versions live in a one-column table (`SchemaInfo` by
//! default) inside the target database. The table is created on first use, in
//! whatever transaction the caller has open.

use tracing::info;

use crate::core::schema::{Column, DbType, Table};
use crate::core::value::SqlValue;
use crate::error::{MigrateError, Result};
use crate::provider::TransformationProvider;

/// Ledger table name used unless configured otherwise.
pub const DEFAULT_LEDGER_TABLE: &str = "SchemaInfo";

/// The ledger's only column.
pub const VERSION_COLUMN: &str = "Version";

/// Ledger operations over a borrowed provider.
pub struct VersionLedger<'p> {
    provider: &'p mut TransformationProvider,
}

impl<'p> VersionLedger<'p> {
    pub fn new(provider: &'p mut TransformationProvider) -> Self {
        Self { provider }
    }

    fn table(&self) -> String {
        self.provider.ledger_table().to_string()
    }

    async fn ensure_table(&mut self) -> Result<()> {
        let table = self.table();
        if self.provider.table_exists(&table).await? {
            return Ok(());
        }
        info!("Creating ledger table {}", table);
        let definition =
            Table::new(&table).column(Column::new(VERSION_COLUMN, DbType::Int64).not_null());
        self.provider.create_table(&definition).await
    }

    /// Recorded versions, ascending. Always read from the database.
    pub async fn applied_migrations(&mut self) -> Result<Vec<i64>> {
        self.ensure_table().await?;
        let dialect = self.provider.dialect().clone();
        let column = dialect.quote_ident(VERSION_COLUMN)?;
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            column,
            dialect.quote_ident(&self.table())?,
            column
        );
        let rows = self.provider.query(&sql, &[]).await?;
        rows.iter()
            .map(|row| {
                row.at(0).as_i64().ok_or_else(|| {
                    MigrateError::Migration(format!(
                        "ledger contains a non-integer version: {}",
                        row.at(0).to_display_string()
                    ))
                })
            })
            .collect()
    }

    /// Insert a row for `version`. Calling it twice records two rows.
    pub async fn migration_applied(&mut self, version: i64) -> Result<()> {
        self.ensure_table().await?;
        let table = self.table();
        self.provider
            .insert(&table, &[VERSION_COLUMN], vec![SqlValue::I64(version)])
            .await?;
        Ok(())
    }

    /// Delete the rows for `version`, if any.
    pub async fn migration_unapplied(&mut self, version: i64) -> Result<()> {
        self.ensure_table().await?;
        let table = self.table();
        self.provider
            .delete(&table, &[VERSION_COLUMN], vec![SqlValue::I64(version)])
            .await?;
        Ok(())
    }
}
