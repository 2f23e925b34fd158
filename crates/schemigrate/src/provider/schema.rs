//! Table, column and constraint operations.

use tracing::{debug, info};

use crate::core::schema::{
    Column, Constraint, ConstraintKind, ForeignKeyAction, NamedConstraint, Table,
};
use crate::core::traits::{AlterStrategy, TableChange};
use crate::error::{MigrateError, Result};

use super::TransformationProvider;

impl TransformationProvider {
    // ===== Tables =====

    /// `CREATE TABLE` with the given columns. Several primary key columns make a
    /// compound `PK_<table>` constraint.
    ///
    /// An existing table is reported by the database as [`MigrateError::Schema`].
    pub async fn add_table(&mut self, name: &str, columns: Vec<Column>) -> Result<()> {
        self.create_table(&Table::new(name).columns(columns)).await
    }

    /// `CREATE TABLE` from a full definition, table-level constraints included.
    pub async fn create_table(&mut self, table: &Table) -> Result<()> {
        let statements = self.dialect.create_table_sql(table)?;
        self.execute_ddl(&format!("add table '{}'", table.name), &statements)
            .await?;
        info!("Created table {}", table.name);
        Ok(())
    }

    /// Drop `name`. Does nothing when the table does not exist.
    pub async fn remove_table(&mut self, name: &str) -> Result<()> {
        if !self.table_exists(name).await? {
            debug!("Table {} does not exist, nothing to remove", name);
            return Ok(());
        }
        let sql = self.dialect.drop_table_sql(name)?;
        self.execute_ddl(&format!("remove table '{}'", name), &[sql])
            .await
    }

    pub async fn rename_table(&mut self, old: &str, new: &str) -> Result<()> {
        if !self.table_exists(old).await? {
            return Err(MigrateError::Migration(format!(
                "Cannot rename table '{}': it does not exist",
                old
            )));
        }
        if self.table_exists(new).await? {
            return Err(MigrateError::Migration(format!(
                "Cannot rename table '{}' to '{}': a table with that name already exists",
                old, new
            )));
        }
        let sql = self.dialect.rename_table_sql(old, new)?;
        self.execute_ddl(&format!("rename table '{}'", old), &[sql])
            .await
    }

    // ===== Columns =====

    pub async fn add_column(&mut self, table: &str, column: Column) -> Result<()> {
        column.validate()?;
        let statements = self.dialect.add_column_sql(table, &column)?;
        self.execute_ddl(
            &format!("add column '{}.{}'", table, column.name),
            &statements,
        )
        .await
    }

    /// Drop `column` with the indexes and constraints that depend on it. Does
    /// nothing when the table or column does not exist.
    pub async fn remove_column(&mut self, table: &str, column: &str) -> Result<()> {
        if !self.column_exists(table, column).await? {
            debug!("Column {}.{} does not exist, nothing to remove", table, column);
            return Ok(());
        }
        let change = TableChange::DropColumn(column.to_string());
        if self.dialect.alter_strategy(&change) == AlterStrategy::Rebuild {
            return self.rebuild_table(table, &change).await;
        }
        self.drop_dependent_objects(table, column).await?;
        let sql = self.dialect.drop_column_sql(table, column)?;
        self.execute_ddl(&format!("remove column '{}.{}'", table, column), &[sql])
            .await
    }

    pub async fn rename_column(&mut self, table: &str, old: &str, new: &str) -> Result<()> {
        if !self.column_exists(table, old).await? {
            return Err(MigrateError::Migration(format!(
                "Cannot rename column '{}.{}': it does not exist",
                table, old
            )));
        }
        if self.column_exists(table, new).await? {
            return Err(MigrateError::Migration(format!(
                "Cannot rename column '{}.{}' to '{}': a column with that name already exists",
                table, old, new
            )));
        }
        let sql = self.dialect.rename_column_sql(table, old, new)?;
        self.execute_ddl(&format!("rename column '{}.{}'", table, old), &[sql])
            .await
    }

    /// Change the type, nullability and default of an existing column.
    pub async fn change_column(&mut self, table: &str, column: Column) -> Result<()> {
        column.validate()?;
        if !self.column_exists(table, &column.name).await? {
            return Err(MigrateError::Migration(format!(
                "Cannot change column '{}.{}': it does not exist",
                table, column.name
            )));
        }

        let change = TableChange::ReplaceColumn(column.clone());
        if self.dialect.alter_strategy(&change) == AlterStrategy::Rebuild {
            return self.rebuild_table(table, &change).await;
        }
        let mut recreate = self.drop_dependent_objects(table, &column.name).await?;
        let operation = format!("change column '{}.{}'", table, column.name);
        let mut statements = self.dialect.change_column_sql(table, &column)?;
        recreate.reverse();
        statements.extend(recreate);
        self.execute_ddl(&operation, &statements).await
    }

    /// Drop the engine objects (SQL Server defaults, indexes, keys and checks)
    /// that block changing or dropping `column`. Returns the statements that put
    /// them back, in drop order.
    async fn drop_dependent_objects(&mut self, table: &str, column: &str) -> Result<Vec<String>> {
        let Some((sql, params)) = self.dialect.dependent_objects_query(table, column) else {
            return Ok(Vec::new());
        };
        let rows = self.query(&sql, &params).await?;

        let mut recreate = Vec::new();
        for row in &rows {
            let (Some(name), Some(drop)) = (row.text(0), row.text(1)) else {
                continue;
            };
            debug!("Dropping {} which depends on {}.{}", name, table, column);
            self.execute_ddl(&format!("drop '{}'", name), &[drop]).await?;
            recreate.extend(row.text(2));
        }
        Ok(recreate)
    }

    // ===== Constraints =====

    /// Add a constraint, deriving its name when none is given.
    pub async fn add_constraint(&mut self, constraint: NamedConstraint) -> Result<()> {
        let operation = format!(
            "add constraint '{}' on '{}'",
            constraint.name(),
            constraint.table
        );
        let change = TableChange::AddConstraint(constraint.clone());
        if self.dialect.alter_strategy(&change) == AlterStrategy::Rebuild {
            return self.rebuild_table(&constraint.table, &change).await;
        }
        let statements = self.dialect.add_constraint_sql(&constraint)?;
        self.execute_ddl(&operation, &statements).await
    }

    pub async fn add_primary_key(
        &mut self,
        name: Option<&str>,
        table: &str,
        columns: &[&str],
    ) -> Result<()> {
        self.add_constraint(NamedConstraint::new(
            name,
            table,
            Constraint::PrimaryKey {
                columns: owned(columns),
            },
        ))
        .await
    }

    /// Foreign key from `table(columns)` to `ref_table(ref_columns)`.
    pub async fn add_foreign_key(
        &mut self,
        name: Option<&str>,
        table: &str,
        columns: &[&str],
        ref_table: &str,
        ref_columns: &[&str],
    ) -> Result<()> {
        self.add_foreign_key_with_action(
            name,
            table,
            columns,
            ref_table,
            ref_columns,
            ForeignKeyAction::NoAction,
        )
        .await
    }

    pub async fn add_foreign_key_with_action(
        &mut self,
        name: Option<&str>,
        table: &str,
        columns: &[&str],
        ref_table: &str,
        ref_columns: &[&str],
        on_delete: ForeignKeyAction,
    ) -> Result<()> {
        if columns.is_empty() || columns.len() != ref_columns.len() {
            return Err(MigrateError::Migration(format!(
                "Foreign key on '{}' needs matching column lists ({} vs {})",
                table,
                columns.len(),
                ref_columns.len()
            )));
        }
        self.add_constraint(NamedConstraint::new(
            name,
            table,
            Constraint::ForeignKey {
                columns: owned(columns),
                ref_table: ref_table.to_string(),
                ref_columns: owned(ref_columns),
                on_delete,
            },
        ))
        .await
    }

    pub async fn add_unique_constraint(
        &mut self,
        name: Option<&str>,
        table: &str,
        columns: &[&str],
    ) -> Result<()> {
        self.add_constraint(NamedConstraint::new(
            name,
            table,
            Constraint::Unique {
                columns: owned(columns),
            },
        ))
        .await
    }

    pub async fn add_check_constraint(
        &mut self,
        name: Option<&str>,
        table: &str,
        expression: &str,
    ) -> Result<()> {
        self.add_constraint(NamedConstraint::new(
            name,
            table,
            Constraint::Check {
                expression: expression.to_string(),
            },
        ))
        .await
    }

    /// Drop a foreign key. Does nothing when the table or key does not exist.
    pub async fn remove_foreign_key(&mut self, table: &str, name: &str) -> Result<()> {
        self.remove_constraint(table, name).await
    }

    /// Drop any named constraint. Does nothing when the table or constraint does
    /// not exist.
    pub async fn remove_constraint(&mut self, table: &str, name: &str) -> Result<()> {
        if !self.table_exists(table).await? {
            debug!("Table {} does not exist, no constraint to remove", table);
            return Ok(());
        }
        let Some(found) = self
            .get_constraints(table)
            .await?
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
        else {
            debug!("Constraint {} does not exist on {}", name, table);
            return Ok(());
        };

        let change = TableChange::DropConstraint {
            name: found.name.clone(),
            kind: found.kind,
        };
        if self.dialect.alter_strategy(&change) == AlterStrategy::Rebuild {
            return self.rebuild_table(table, &change).await;
        }
        let sql = self
            .dialect
            .drop_constraint_sql(table, &found.name, Some(found.kind))?;
        self.execute_ddl(
            &format!("remove constraint '{}' on '{}'", found.name, table),
            &[sql],
        )
        .await
    }

    /// Drop the primary key of `table` whatever its name. Does nothing when there is none.
    pub async fn remove_primary_key(&mut self, table: &str) -> Result<()> {
        if !self.table_exists(table).await? {
            return Ok(());
        }
        let found = self
            .get_constraints(table)
            .await?
            .into_iter()
            .find(|c| c.kind == ConstraintKind::PrimaryKey);
        match found {
            Some(pk) => self.remove_constraint(table, &pk.name).await,
            None => Ok(()),
        }
    }

    // ===== Rebuild =====

    /// Apply `change` by recreating `table`, inside the caller's transaction or
    /// in one of its own.
    async fn rebuild_table(&mut self, table: &str, change: &TableChange) -> Result<()> {
        let (sql, params) = self
            .dialect
            .table_ddl_query(table)
            .ok_or_else(|| MigrateError::unsupported(self.dialect.name(), "table rebuild"))?;
        let rows = self.query(&sql, &params).await?;

        let mut current_ddl = None;
        let mut indexes = Vec::new();
        for row in &rows {
            match (row.text(0), row.text(1)) {
                (Some(kind), Some(sql)) if kind.eq_ignore_ascii_case("table") => {
                    current_ddl = Some(sql)
                }
                (Some(_), Some(sql)) => indexes.push(sql),
                _ => {}
            }
        }
        let current_ddl = current_ddl.ok_or_else(|| {
            MigrateError::Migration(format!("Table '{}' does not exist", table))
        })?;

        let statements = self
            .dialect
            .rebuild_table_sql(table, &current_ddl, &indexes, change)?;
        let operation = format!("rebuild table '{}'", table);
        debug!("Rebuilding {} with {} statements", table, statements.len());

        let owns_transaction = !self.in_transaction;
        if owns_transaction {
            self.begin_transaction().await?;
        }
        match self.execute_ddl(&operation, &statements).await {
            Ok(()) if owns_transaction => self.commit().await,
            Ok(()) => Ok(()),
            Err(e) => {
                if owns_transaction {
                    self.rollback().await?;
                }
                Err(e)
            }
        }
    }
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}
