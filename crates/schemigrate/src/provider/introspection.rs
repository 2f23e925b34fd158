//! Catalog reads. Every call queries the database; nothing is cached.

use crate::core::schema::{Column, ConstraintInfo, ConstraintKind};
use crate::error::Result;

use super::TransformationProvider;

/// Name MySQL gives every primary key.
const MYSQL_PRIMARY: &str = "PRIMARY";

impl TransformationProvider {
    /// User tables in catalog order.
    pub async fn get_tables(&mut self) -> Result<Vec<String>> {
        let sql = self.dialect.tables_query();
        let rows = self.query(&sql, &[]).await?;
        Ok(rows.iter().filter_map(|row| row.text(0)).collect())
    }

    pub async fn table_exists(&mut self, table: &str) -> Result<bool> {
        Ok(self
            .get_tables()
            .await?
            .iter()
            .any(|t| t.eq_ignore_ascii_case(table)))
    }

    /// Columns of `table` in ordinal order, empty when the table does not exist.
    pub async fn get_columns(&mut self, table: &str) -> Result<Vec<Column>> {
        let (sql, params) = self.dialect.columns_query(table)?;
        let rows = self.query(&sql, &params).await?;
        rows.iter().map(|row| self.dialect.parse_column(row)).collect()
    }

    pub async fn get_column_by_name(&mut self, table: &str, column: &str) -> Result<Option<Column>> {
        Ok(self
            .get_columns(table)
            .await?
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(column)))
    }

    pub async fn column_exists(&mut self, table: &str, column: &str) -> Result<bool> {
        if !self.table_exists(table).await? {
            return Ok(false);
        }
        Ok(self.get_column_by_name(table, column).await?.is_some())
    }

    /// Named constraints on `table`.
    pub async fn get_constraints(&mut self, table: &str) -> Result<Vec<ConstraintInfo>> {
        let (sql, params) = self.dialect.constraints_query(table)?;
        let rows = self.query(&sql, &params).await?;
        Ok(self.dialect.parse_constraints(&rows))
    }

    pub async fn constraint_exists(&mut self, table: &str, name: &str) -> Result<bool> {
        if !self.table_exists(table).await? {
            return Ok(false);
        }
        Ok(self
            .get_constraints(table)
            .await?
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(name)))
    }

    /// Whether `table` has a primary key called `name`. MySQL names every
    /// primary key `PRIMARY`, so there any primary key matches.
    pub async fn primary_key_exists(&mut self, table: &str, name: &str) -> Result<bool> {
        if !self.table_exists(table).await? {
            return Ok(false);
        }
        Ok(self.get_constraints(table).await?.iter().any(|c| {
            c.kind == ConstraintKind::PrimaryKey
                && (c.name.eq_ignore_ascii_case(name) || c.name == MYSQL_PRIMARY)
        }))
    }
}
