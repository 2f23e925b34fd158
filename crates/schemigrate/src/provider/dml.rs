//! Data operations and raw SQL.
//!
//! Values are always bound as parameters. Only `where_clause` arguments and the
//! `execute_*` methods take SQL text as-is.

use tracing::debug;

use crate::core::value::{Row, SqlValue};
use crate::error::{MigrateError, Result};

use super::TransformationProvider;

impl TransformationProvider {
    /// Insert one row and return the affected row count.
    pub async fn insert(
        &mut self,
        table: &str,
        columns: &[&str],
        values: Vec<SqlValue>,
    ) -> Result<u64> {
        check_arity(table, columns, &values)?;
        let placeholders = (1..=values.len())
            .map(|i| self.dialect.param_placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.dialect.quote_ident(table)?,
            self.quote_columns(columns)?,
            placeholders
        );
        self.execute(&sql, &values).await
    }

    /// Set `columns` to `values` on every row matching `where_clause` (all rows
    /// when `None`).
    pub async fn update(
        &mut self,
        table: &str,
        columns: &[&str],
        values: Vec<SqlValue>,
        where_clause: Option<&str>,
    ) -> Result<u64> {
        check_arity(table, columns, &values)?;
        let assignments = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                Ok(format!(
                    "{} = {}",
                    self.dialect.quote_ident(c)?,
                    self.dialect.param_placeholder(i + 1)
                ))
            })
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.dialect.quote_ident(table)?,
            assignments
        );
        if let Some(clause) = where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(clause);
        }
        self.execute(&sql, &values).await
    }

    /// Delete rows where every column equals its value (`IS NULL` for
    /// [`SqlValue::Null`]). No columns deletes every row.
    pub async fn delete(
        &mut self,
        table: &str,
        columns: &[&str],
        values: Vec<SqlValue>,
    ) -> Result<u64> {
        check_arity(table, columns, &values)?;
        let mut predicates = Vec::with_capacity(columns.len());
        let mut params = Vec::with_capacity(values.len());
        for (column, value) in columns.iter().zip(values) {
            let column = self.dialect.quote_ident(column)?;
            if value.is_null() {
                predicates.push(format!("{} IS NULL", column));
            } else {
                params.push(value);
                predicates.push(format!(
                    "{} = {}",
                    column,
                    self.dialect.param_placeholder(params.len())
                ));
            }
        }
        let mut sql = format!("DELETE FROM {}", self.dialect.quote_ident(table)?);
        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }
        self.execute(&sql, &params).await
    }

    /// `SELECT what FROM from [WHERE where_clause]`, where `what` is `*` or a
    /// comma-separated column list.
    pub async fn select(
        &mut self,
        what: &str,
        from: &str,
        where_clause: Option<&str>,
    ) -> Result<Vec<Row>> {
        let projection = what
            .split(',')
            .map(str::trim)
            .map(|c| {
                if c == "*" {
                    Ok(c.to_string())
                } else {
                    self.dialect.quote_ident(c)
                }
            })
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let mut sql = format!(
            "SELECT {} FROM {}",
            projection,
            self.dialect.quote_ident(from)?
        );
        if let Some(clause) = where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(clause);
        }
        self.query(&sql, &[]).await
    }

    // ===== Raw SQL =====

    /// Run SQL text unchanged and return the affected row count.
    pub async fn execute_non_query(&mut self, sql: &str) -> Result<u64> {
        self.execute(sql, &[]).await
    }

    /// First column of the first row, or [`SqlValue::Null`] when there are no rows.
    pub async fn execute_scalar(&mut self, sql: &str) -> Result<SqlValue> {
        let rows = self.query(sql, &[]).await?;
        Ok(rows.first().map(|r| r.at(0).clone()).unwrap_or(SqlValue::Null))
    }

    pub async fn execute_query(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.query(sql, &[]).await
    }

    /// Raw SQL that only runs when this provider targets `dialect`.
    ///
    /// ```rust,ignore
    /// provider
    ///     .for_dialect("postgres")
    ///     .execute_non_query("CREATE EXTENSION IF NOT EXISTS pgcrypto")
    ///     .await?;
    /// ```
    pub fn for_dialect(&mut self, dialect: &str) -> ScopedProvider<'_> {
        ScopedProvider {
            provider: self,
            dialect: dialect.to_string(),
        }
    }

    fn quote_columns(&self, columns: &[&str]) -> Result<String> {
        Ok(columns
            .iter()
            .map(|c| self.dialect.quote_ident(c))
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }
}

fn check_arity(table: &str, columns: &[&str], values: &[SqlValue]) -> Result<()> {
    if columns.len() != values.len() {
        return Err(MigrateError::Migration(format!(
            "'{}': {} columns but {} values",
            table,
            columns.len(),
            values.len()
        )));
    }
    Ok(())
}

/// Provider view returned by [`TransformationProvider::for_dialect`].
pub struct ScopedProvider<'a> {
    provider: &'a mut TransformationProvider,
    dialect: String,
}

impl ScopedProvider<'_> {
    /// Whether statements issued through this view will run.
    pub fn is_active(&self) -> bool {
        self.provider.dialect.matches_name(&self.dialect)
    }

    /// Run `sql` when the dialect matches; otherwise skip it and return 0.
    pub async fn execute_non_query(&mut self, sql: &str) -> Result<u64> {
        if !self.is_active() {
            debug!(
                "Skipping {}-only statement on {}",
                self.dialect,
                self.provider.dialect.name()
            );
            return Ok(0);
        }
        self.provider.execute_non_query(sql).await
    }
}
