//! Engine seams.
//!
//! - [`Dialect`]: pure SQL rendering and catalog interpretation for one engine
//! - [`SqlConnection`]: a live driver connection that executes rendered SQL
//!
//! # Design Patterns
//!
//! - **Strategy**: one `Dialect` per engine, chosen at startup by name
//! - **Template Method**: the default methods below render standard SQL and
//!   engines override only the statements where they differ

use async_trait::async_trait;

use crate::error::{MigrateError, Result};

use super::identifier::validate_check_expression;
use super::schema::{
    index_name, primary_key_name, Column, ColumnProperty, Constraint, ConstraintInfo,
    ConstraintKind, DbType, DefaultValue, ForeignKeyAction, NamedConstraint, Table,
};
use super::value::{Row, SqlValue};

/// A catalog query and its bound parameters.
pub type CatalogQuery = (String, Vec<SqlValue>);

/// How an engine applies constraint and column-type changes to an existing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlterStrategy {
    /// `ALTER TABLE` supports the change directly.
    InPlace,
    /// The table is recreated from its stored definition and the rows copied over.
    Rebuild,
}

/// A change applied by rebuilding a table.
#[derive(Debug, Clone, PartialEq)]
pub enum TableChange {
    AddConstraint(NamedConstraint),
    DropConstraint { name: String, kind: ConstraintKind },
    ReplaceColumn(Column),
    /// Drop a column together with the indexes and table constraints over it.
    DropColumn(String),
}

/// SQL rendering strategy for one engine.
///
/// Implementations are stateless and never touch a connection. Every rendered
/// identifier goes through [`Dialect::quote_ident`], which validates it first.
pub trait Dialect: Send + Sync + std::fmt::Debug {
    /// Dialect identifier (e.g. "postgres", "mssql").
    fn name(&self) -> &str;

    /// Other names this dialect answers to in configuration and scoped execution.
    fn aliases(&self) -> &[&str] {
        &[]
    }

    fn matches_name(&self, name: &str) -> bool {
        self.name().eq_ignore_ascii_case(name)
            || self.aliases().iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    /// Validate and quote an identifier.
    fn quote_ident(&self, name: &str) -> Result<String>;

    /// Parameter placeholder for the given 1-based index.
    fn param_placeholder(&self, index: usize) -> String;

    /// Native type name for an abstract type.
    ///
    /// Fails with [`MigrateError::InvalidColumn`] when a size is required and missing.
    fn type_name(&self, db_type: DbType, size: Option<u32>, scale: Option<u32>) -> Result<String>;

    /// Map a native type name read from the catalog back to an abstract type.
    fn db_type_from_native(&self, native: &str) -> DbType;

    /// Whether DDL participates in transactions.
    fn supports_transactional_ddl(&self) -> bool;

    /// How `change` is applied to an existing table.
    fn alter_strategy(&self, _change: &TableChange) -> AlterStrategy {
        AlterStrategy::InPlace
    }

    // ===== Column rendering =====

    /// Type used in place of [`Dialect::type_name`] for identity columns.
    fn identity_type(&self, _db_type: DbType) -> Option<String> {
        None
    }

    /// Clause placed after the type of an identity column.
    fn identity_clause(&self) -> Option<&str> {
        None
    }

    /// Inline primary key clause. `table` is `None` when the column is rendered
    /// outside a `CREATE TABLE`.
    fn inline_primary_key(&self, table: Option<&str>, _column: &Column) -> Result<String> {
        match table {
            Some(table) => Ok(format!(
                "CONSTRAINT {} PRIMARY KEY",
                self.quote_ident(&primary_key_name(table))?
            )),
            None => Ok("PRIMARY KEY".to_string()),
        }
    }

    /// Full column definition as used in `CREATE TABLE` and `ADD COLUMN`.
    fn column_sql(&self, column: &Column) -> Result<String> {
        self.column_definition(None, column)
    }

    /// Column definition whose inline primary key is named after `table`.
    fn column_sql_for_table(&self, table: &str, column: &Column) -> Result<String> {
        self.column_definition(Some(table), column)
    }

    fn column_definition(&self, table: Option<&str>, column: &Column) -> Result<String> {
        column.validate()?;

        let mut parts = vec![self.quote_ident(&column.name)?];

        let identity = column.is_identity();
        let native = match identity.then(|| self.identity_type(column.db_type)).flatten() {
            Some(t) => t,
            None => self.type_name(column.db_type, column.size, column.scale)?,
        };
        parts.push(native);

        if identity {
            if let Some(clause) = self.identity_clause() {
                parts.push(clause.to_string());
            }
        }

        if column.is_not_null() {
            parts.push("NOT NULL".to_string());
        } else if column.has(ColumnProperty::Null) || column.has(ColumnProperty::ForeignKey) {
            parts.push("NULL".to_string());
        }

        if let Some(default) = &column.default {
            parts.push(format!(
                "DEFAULT {}",
                self.default_expression(default, column.db_type)
            ));
        }

        if column.is_primary_key() {
            parts.push(self.inline_primary_key(table, column)?);
        } else if column.has(ColumnProperty::Unique) {
            parts.push("UNIQUE".to_string());
        }

        Ok(parts.join(" "))
    }

    // ===== Literals =====

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    /// Single-quoted string literal with embedded quotes doubled.
    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// SQL expression for a column default.
    fn default_expression(&self, value: &DefaultValue, _db_type: DbType) -> String {
        match value {
            DefaultValue::Null => "NULL".to_string(),
            DefaultValue::Bool(v) => self.bool_literal(*v).to_string(),
            DefaultValue::Int(v) => v.to_string(),
            DefaultValue::Float(v) => v.to_string(),
            DefaultValue::Decimal(v) => v.to_string(),
            DefaultValue::Text(v) => self.string_literal(v),
            DefaultValue::Raw(v) => v.clone(),
        }
    }

    // ===== DDL =====

    /// Statements creating a table, its table-level constraints and indexes.
    fn create_table_sql(&self, table: &Table) -> Result<Vec<String>> {
        table.validate()?;

        let compound = table.has_compound_primary_key();
        let mut defs = Vec::with_capacity(table.columns.len() + table.constraints.len() + 1);
        for column in &table.columns {
            if compound && column.is_primary_key() {
                let mut inner = column.clone();
                inner.properties.remove(&ColumnProperty::PrimaryKey);
                inner.properties.insert(ColumnProperty::NotNull);
                defs.push(self.column_sql_for_table(&table.name, &inner)?);
            } else {
                defs.push(self.column_sql_for_table(&table.name, column)?);
            }
        }

        if compound {
            let pk = NamedConstraint::new(
                None,
                table.name.clone(),
                Constraint::PrimaryKey {
                    columns: table.primary_key().into_iter().map(String::from).collect(),
                },
            );
            defs.push(self.table_constraint_sql(&pk)?);
        }

        for constraint in &table.constraints {
            defs.push(self.table_constraint_sql(constraint)?);
        }

        let mut statements = vec![format!(
            "CREATE TABLE {} ({})",
            self.quote_ident(&table.name)?,
            defs.join(", ")
        )];

        for column in table.columns.iter().filter(|c| c.has(ColumnProperty::Indexed)) {
            statements.push(self.create_index_sql(
                &table.name,
                &index_name(&table.name, &column.name),
                &[column.name.as_str()],
                false,
            )?);
        }

        Ok(statements)
    }

    fn drop_table_sql(&self, table: &str) -> Result<String> {
        Ok(format!("DROP TABLE {}", self.quote_ident(table)?))
    }

    fn rename_table_sql(&self, old: &str, new: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_ident(old)?,
            self.quote_ident(new)?
        ))
    }

    /// Keyword between the table name and the column in `ADD COLUMN`.
    fn add_column_keyword(&self) -> &str {
        "ADD COLUMN"
    }

    fn add_column_sql(&self, table: &str, column: &Column) -> Result<Vec<String>> {
        let mut statements = vec![format!(
            "ALTER TABLE {} {} {}",
            self.quote_ident(table)?,
            self.add_column_keyword(),
            self.column_sql_for_table(table, column)?
        )];
        if column.has(ColumnProperty::Indexed) {
            statements.push(self.create_index_sql(
                table,
                &index_name(table, &column.name),
                &[column.name.as_str()],
                false,
            )?);
        }
        Ok(statements)
    }

    fn drop_column_sql(&self, table: &str, column: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_ident(table)?,
            self.quote_ident(column)?
        ))
    }

    fn rename_column_sql(&self, table: &str, old: &str, new: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_ident(table)?,
            self.quote_ident(old)?,
            self.quote_ident(new)?
        ))
    }

    /// Statements changing a column's type, nullability and default in place.
    fn change_column_sql(&self, table: &str, column: &Column) -> Result<Vec<String>>;

    /// `PRIMARY KEY (...)`, `FOREIGN KEY (...) REFERENCES ...`, `UNIQUE (...)`, `CHECK (...)`.
    fn constraint_body_sql(&self, constraint: &Constraint) -> Result<String> {
        match constraint {
            Constraint::PrimaryKey { columns } => {
                Ok(format!("PRIMARY KEY ({})", self.quote_list(columns)?))
            }
            Constraint::ForeignKey {
                columns,
                ref_table,
                ref_columns,
                on_delete,
            } => {
                let mut sql = format!(
                    "FOREIGN KEY ({}) REFERENCES {} ({})",
                    self.quote_list(columns)?,
                    self.quote_ident(ref_table)?,
                    self.quote_list(ref_columns)?
                );
                if let Some(action) = self.on_delete_clause(*on_delete) {
                    sql.push_str(" ON DELETE ");
                    sql.push_str(action);
                }
                Ok(sql)
            }
            Constraint::Unique { columns } => Ok(format!("UNIQUE ({})", self.quote_list(columns)?)),
            Constraint::Check { expression } => {
                validate_check_expression(expression)?;
                Ok(format!("CHECK ({})", expression))
            }
        }
    }

    fn on_delete_clause(&self, action: ForeignKeyAction) -> Option<&'static str> {
        match action {
            ForeignKeyAction::NoAction => None,
            other => Some(other.as_sql()),
        }
    }

    /// `CONSTRAINT <name> <body>` as used inside `CREATE TABLE`.
    fn table_constraint_sql(&self, constraint: &NamedConstraint) -> Result<String> {
        Ok(format!(
            "CONSTRAINT {} {}",
            self.quote_ident(&constraint.name())?,
            self.constraint_body_sql(&constraint.constraint)?
        ))
    }

    fn add_constraint_sql(&self, constraint: &NamedConstraint) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} ADD {}",
            self.quote_ident(&constraint.table)?,
            self.table_constraint_sql(constraint)?
        )])
    }

    /// Drop a named constraint. `kind` is `None` for engine-internal objects such
    /// as SQL Server default constraints.
    fn drop_constraint_sql(
        &self,
        table: &str,
        name: &str,
        _kind: Option<ConstraintKind>,
    ) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_ident(table)?,
            self.quote_ident(name)?
        ))
    }

    fn create_index_sql(
        &self,
        table: &str,
        name: &str,
        columns: &[&str],
        unique: bool,
    ) -> Result<String> {
        let columns = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        Ok(format!(
            "CREATE {}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            self.quote_ident(name)?,
            self.quote_ident(table)?,
            columns
        ))
    }

    /// Statements applying `change` by recreating `table` from `current_ddl`,
    /// then recreating its `indexes` from their stored definitions.
    fn rebuild_table_sql(
        &self,
        _table: &str,
        _current_ddl: &str,
        _indexes: &[String],
        _change: &TableChange,
    ) -> Result<Vec<String>> {
        Err(MigrateError::unsupported(self.name(), "table rebuild"))
    }

    fn quote_list(&self, names: &[String]) -> Result<String> {
        Ok(names
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }

    // ===== Transactions =====

    fn begin_sql(&self) -> &str {
        "BEGIN"
    }

    fn commit_sql(&self) -> &str {
        "COMMIT"
    }

    fn rollback_sql(&self) -> &str {
        "ROLLBACK"
    }

    /// Session settings applied before `BEGIN`.
    fn transaction_setup_sql(&self) -> &[&str] {
        &[]
    }

    /// Session settings restored after `COMMIT` or `ROLLBACK`.
    fn transaction_teardown_sql(&self) -> &[&str] {
        &[]
    }

    /// Query run before `COMMIT`; any returned row is an integrity violation.
    fn integrity_check_sql(&self) -> Option<&str> {
        None
    }

    // ===== Catalog =====

    /// Query returning one row per user table, table name in the first column.
    fn tables_query(&self) -> String;

    /// Query returning one row per column of `table`, in ordinal order:
    /// `(name, data_type, char_length, precision, scale, is_nullable, default, is_identity)`.
    fn columns_query(&self, table: &str) -> Result<CatalogQuery>;

    /// Query returning `(constraint_name, constraint_type)` rows for `table`.
    fn constraints_query(&self, table: &str) -> Result<CatalogQuery>;

    /// Query returning `(name, drop_sql, recreate_sql)` rows, in drop order, for
    /// objects that block changing or dropping `column`. `recreate_sql` is NULL
    /// for objects the new column definition replaces.
    fn dependent_objects_query(&self, _table: &str, _column: &str) -> Option<CatalogQuery> {
        None
    }

    /// Query returning `(type, sql)` rows for the stored `CREATE TABLE` text and
    /// the table's index definitions, table first (rebuild engines only).
    fn table_ddl_query(&self, _table: &str) -> Option<CatalogQuery> {
        None
    }

    /// Build a [`Column`] from a row of [`Dialect::columns_query`].
    fn parse_column(&self, row: &Row) -> Result<Column> {
        let name = row
            .text(0)
            .ok_or_else(|| MigrateError::Migration("catalog returned a column without a name".into()))?;
        let native = row.text(1).unwrap_or_default();
        let mut db_type = self.db_type_from_native(&native);
        let char_len = row.at(2).as_i64();
        let precision = row.at(3).as_i64();
        let scale = row.at(4).as_i64();
        let nullable = row.at(5).as_bool().unwrap_or(true);
        let identity = row.at(7).as_bool().unwrap_or(false);

        // (max) columns report a length of -1
        if char_len.is_some_and(|len| len < 0) {
            db_type = match db_type {
                DbType::Binary => DbType::Blob,
                _ => DbType::Text,
            };
        }

        let (size, scale) = match db_type {
            DbType::Decimal => (to_u32(precision), to_u32(scale)),
            t if t.requires_size() => (to_u32(char_len), None),
            _ => (None, None),
        };

        let mut column = Column::new(name, db_type);
        column.size = size;
        column.scale = scale;
        column.properties.insert(if nullable {
            ColumnProperty::Null
        } else {
            ColumnProperty::NotNull
        });
        if identity {
            column.properties.insert(ColumnProperty::Identity);
        } else {
            column.default = row.text(6).map(DefaultValue::Raw);
        }
        Ok(column)
    }

    /// Build [`ConstraintInfo`] values from the rows of [`Dialect::constraints_query`].
    fn parse_constraints(&self, rows: &[Row]) -> Vec<ConstraintInfo> {
        rows.iter()
            .filter_map(|row| {
                let name = row.text(0)?;
                let kind = ConstraintKind::from_catalog(&row.text(1)?)?;
                Some(ConstraintInfo { name, kind })
            })
            .collect()
    }
}

fn to_u32(value: Option<i64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok()).filter(|v| *v > 0)
}

/// A live connection to one database.
///
/// Statements run in the order they are awaited; no implementation pipelines or
/// pools work behind the caller's back.
#[async_trait]
pub trait SqlConnection: Send {
    /// Execute a statement and return the number of affected rows.
    ///
    /// With no parameters the text may hold several statements.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Run a query and collect its rows.
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Engine identifier (e.g. "postgres", "sqlite").
    fn db_type(&self) -> &str;

    /// Release the connection. Further calls fail.
    async fn close(&mut self) -> Result<()>;
}
