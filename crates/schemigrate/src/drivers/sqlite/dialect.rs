//! SQLite SQL dialect (Strategy pattern).

use crate::core::identifier::quote_delimited;
use crate::core::schema::{
    index_name, Column, ColumnProperty, Constraint, ConstraintInfo, ConstraintKind, DbType,
    DefaultValue, NamedConstraint,
};
use crate::core::traits::{AlterStrategy, CatalogQuery, Dialect, TableChange};
use crate::core::value::{Row, SqlValue};
use crate::error::{MigrateError, Result};

use super::ddl::{
    column_name, created_index_name, first_group_mentions, named_constraints,
    parse_declared_type, split_definitions,
};

/// Suffix of the scratch table used while rebuilding.
const REBUILD_SUFFIX: &str = "__rebuild";

/// SQLite dialect implementation.
///
/// `ALTER TABLE` can add, rename and drop columns but cannot touch constraints
/// or column types. Those changes rebuild the table: the stored definition is
/// edited, a copy is created and filled, the original is dropped and the copy
/// renamed into place. Unique constraints are unique indexes.
///
/// Transactions run with `foreign_keys` off so a rebuilt parent table keeps
/// its children; `PRAGMA foreign_key_check` must come back empty before commit.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Create a new SQLite dialect instance.
    pub fn new() -> Self {
        Self
    }

    fn unsupported(&self, operation: &str) -> MigrateError {
        MigrateError::unsupported(self.name(), operation)
    }

    /// Apply `change` to the definition list of `table`.
    fn edit_definitions(
        &self,
        table: &str,
        mut definitions: Vec<String>,
        change: &TableChange,
    ) -> Result<Vec<String>> {
        match change {
            TableChange::AddConstraint(constraint) => {
                definitions.push(self.table_constraint_sql(constraint)?);
            }
            TableChange::DropConstraint { name, .. } => {
                let mut dropped = false;
                definitions.retain_mut(|definition| {
                    let Some((_, _, offset)) = named_constraints(definition)
                        .into_iter()
                        .find(|(n, _, _)| n.eq_ignore_ascii_case(name))
                    else {
                        return true;
                    };
                    dropped = true;
                    if offset == 0 {
                        // table-level entry
                        return false;
                    }
                    // inline column constraint runs to the end of the entry
                    definition.truncate(offset);
                    let trimmed = definition.trim_end().len();
                    definition.truncate(trimmed);
                    true
                });
                if !dropped {
                    return Err(MigrateError::Migration(format!(
                        "constraint '{}' not found on table '{}'",
                        name, table
                    )));
                }
            }
            TableChange::ReplaceColumn(column) => {
                let rendered = self.column_sql_for_table(table, column)?;
                let slot = definitions
                    .iter_mut()
                    .find(|d| {
                        column_name(d).is_some_and(|n| n.eq_ignore_ascii_case(&column.name))
                    })
                    .ok_or_else(|| {
                        MigrateError::Migration(format!(
                            "column '{}' not found on table '{}'",
                            column.name, table
                        ))
                    })?;
                *slot = rendered;
            }
            TableChange::DropColumn(column) => {
                let is_column = |d: &String| {
                    column_name(d).is_some_and(|n| n.eq_ignore_ascii_case(column))
                };
                if !definitions.iter().any(is_column) {
                    return Err(MigrateError::Migration(format!(
                        "column '{}' not found on table '{}'",
                        column, table
                    )));
                }
                definitions.retain(|d| match column_name(d) {
                    Some(name) => !name.eq_ignore_ascii_case(column),
                    None => !first_group_mentions(d, column),
                });
            }
        }
        Ok(definitions)
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn aliases(&self) -> &[&str] {
        &["sqlite3"]
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_delimited(name, '"', '"')
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn type_name(&self, db_type: DbType, size: Option<u32>, scale: Option<u32>) -> Result<String> {
        Ok(match db_type {
            DbType::Boolean => "BOOLEAN".to_string(),
            DbType::Byte => "TINYINT".to_string(),
            DbType::Int16 => "SMALLINT".to_string(),
            DbType::Int32 => "INTEGER".to_string(),
            DbType::Int64 => "BIGINT".to_string(),
            DbType::Single => "REAL".to_string(),
            DbType::Double => "DOUBLE".to_string(),
            DbType::Decimal => {
                let precision = db_type.required_size(size)?;
                format!("DECIMAL({},{})", precision, scale.unwrap_or(0))
            }
            DbType::Currency => "DECIMAL(19,4)".to_string(),
            DbType::String | DbType::AnsiString => {
                format!("VARCHAR({})", db_type.required_size(size)?)
            }
            DbType::StringFixedLength => format!("CHAR({})", db_type.required_size(size)?),
            DbType::Text => "TEXT".to_string(),
            DbType::Binary => format!("BLOB({})", db_type.required_size(size)?),
            DbType::Blob => "BLOB".to_string(),
            DbType::Date => "DATE".to_string(),
            DbType::Time => "TIME".to_string(),
            DbType::DateTime => "DATETIME".to_string(),
            DbType::DateTimeOffset => "DATETIMEOFFSET".to_string(),
            DbType::Guid => "UUID".to_string(),
        })
    }

    fn db_type_from_native(&self, native: &str) -> DbType {
        let (base, size, _) = parse_declared_type(native);
        match base.as_str() {
            "BOOLEAN" | "BOOL" => DbType::Boolean,
            "TINYINT" => DbType::Byte,
            "SMALLINT" => DbType::Int16,
            "INTEGER" | "INT" => DbType::Int32,
            "BIGINT" => DbType::Int64,
            "REAL" | "FLOAT" => DbType::Single,
            "DOUBLE" => DbType::Double,
            "DECIMAL" | "NUMERIC" => DbType::Decimal,
            "VARCHAR" | "NVARCHAR" => DbType::String,
            "CHAR" | "NCHAR" => DbType::StringFixedLength,
            "BLOB" if size.is_some() => DbType::Binary,
            "BLOB" => DbType::Blob,
            "DATE" => DbType::Date,
            "TIME" => DbType::Time,
            "DATETIME" | "TIMESTAMP" => DbType::DateTime,
            "DATETIMEOFFSET" => DbType::DateTimeOffset,
            "UUID" => DbType::Guid,
            _ => DbType::Text,
        }
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn transaction_setup_sql(&self) -> &[&str] {
        &["PRAGMA foreign_keys = OFF"]
    }

    fn transaction_teardown_sql(&self) -> &[&str] {
        &["PRAGMA foreign_keys = ON"]
    }

    fn integrity_check_sql(&self) -> Option<&str> {
        Some("PRAGMA foreign_key_check")
    }

    fn alter_strategy(&self, change: &TableChange) -> AlterStrategy {
        // a dropped unique constraint may live in the table definition or be an
        // index; rebuild_table_sql tells them apart
        match change {
            TableChange::AddConstraint(NamedConstraint {
                constraint: Constraint::Unique { .. },
                ..
            }) => AlterStrategy::InPlace,
            _ => AlterStrategy::Rebuild,
        }
    }

    fn identity_type(&self, _db_type: DbType) -> Option<String> {
        // AUTOINCREMENT is only accepted on INTEGER PRIMARY KEY
        Some("INTEGER".to_string())
    }

    fn inline_primary_key(&self, table: Option<&str>, column: &Column) -> Result<String> {
        let mut clause = match table {
            Some(table) => format!(
                "CONSTRAINT {} PRIMARY KEY",
                self.quote_ident(&crate::core::schema::primary_key_name(table))?
            ),
            None => "PRIMARY KEY".to_string(),
        };
        if column.is_identity() {
            clause.push_str(" AUTOINCREMENT");
        }
        Ok(clause)
    }

    /// `ADD COLUMN` cannot carry `UNIQUE`; the constraint becomes a unique index.
    fn add_column_sql(&self, table: &str, column: &Column) -> Result<Vec<String>> {
        let mut plain = column.clone();
        let unique = plain.properties.remove(&ColumnProperty::Unique);
        let mut statements = vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_ident(table)?,
            self.column_sql_for_table(table, &plain)?
        )];
        if plain.has(ColumnProperty::Indexed) {
            statements.push(self.create_index_sql(
                table,
                &index_name(table, &plain.name),
                &[plain.name.as_str()],
                false,
            )?);
        }
        if unique {
            let constraint = NamedConstraint::new(
                None,
                table,
                Constraint::Unique {
                    columns: vec![plain.name.clone()],
                },
            );
            statements.extend(self.add_constraint_sql(&constraint)?);
        }
        Ok(statements)
    }

    fn change_column_sql(&self, _table: &str, _column: &Column) -> Result<Vec<String>> {
        Err(self.unsupported("ALTER COLUMN (changes are applied by rebuilding the table)"))
    }

    fn add_constraint_sql(&self, constraint: &NamedConstraint) -> Result<Vec<String>> {
        match &constraint.constraint {
            Constraint::Unique { columns } => {
                let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
                Ok(vec![self.create_index_sql(
                    &constraint.table,
                    &constraint.name(),
                    &columns,
                    true,
                )?])
            }
            _ => Err(self.unsupported("ADD CONSTRAINT (applied by rebuilding the table)")),
        }
    }

    fn drop_constraint_sql(
        &self,
        _table: &str,
        name: &str,
        kind: Option<ConstraintKind>,
    ) -> Result<String> {
        match kind {
            Some(ConstraintKind::Unique) => Ok(format!("DROP INDEX {}", self.quote_ident(name)?)),
            _ => Err(self.unsupported("DROP CONSTRAINT (applied by rebuilding the table)")),
        }
    }

    fn rebuild_table_sql(
        &self,
        table: &str,
        current_ddl: &str,
        indexes: &[String],
        change: &TableChange,
    ) -> Result<Vec<String>> {
        if let TableChange::DropConstraint { name, .. } = change {
            let is_index = indexes
                .iter()
                .filter_map(|sql| created_index_name(sql))
                .any(|index| index.eq_ignore_ascii_case(name));
            if is_index {
                return Ok(vec![format!("DROP INDEX {}", self.quote_ident(name)?)]);
            }
        }

        let definitions = self.edit_definitions(table, split_definitions(current_ddl)?, change)?;

        let columns = definitions
            .iter()
            .filter_map(|d| column_name(d))
            .map(|c| self.quote_ident(&c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");

        let quoted = self.quote_ident(table)?;
        let scratch = self.quote_ident(&format!("{}{}", table, REBUILD_SUFFIX))?;

        let mut statements = vec![
            format!("CREATE TABLE {} ({})", scratch, definitions.join(", ")),
            format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                scratch, columns, columns, quoted
            ),
            format!("DROP TABLE {}", quoted),
            format!("ALTER TABLE {} RENAME TO {}", scratch, quoted),
        ];
        let dropped = match change {
            TableChange::DropColumn(column) => Some(column.as_str()),
            _ => None,
        };
        statements.extend(
            indexes
                .iter()
                .filter(|sql| dropped.map_or(true, |column| !first_group_mentions(sql, column)))
                .cloned(),
        );
        Ok(statements)
    }

    fn tables_query(&self) -> String {
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
         ORDER BY name"
            .to_string()
    }

    fn columns_query(&self, table: &str) -> Result<CatalogQuery> {
        let sql = "SELECT name, type, NULL, NULL, NULL, \
                   CASE WHEN \"notnull\" = 0 THEN 'YES' ELSE 'NO' END, dflt_value, pk \
                   FROM pragma_table_info(?) ORDER BY cid";
        Ok((sql.to_string(), vec![SqlValue::from(table)]))
    }

    fn constraints_query(&self, table: &str) -> Result<CatalogQuery> {
        let sql = "SELECT type, name, sql FROM sqlite_master \
                   WHERE tbl_name = ? AND type IN ('table', 'index') AND sql IS NOT NULL";
        Ok((sql.to_string(), vec![SqlValue::from(table)]))
    }

    fn table_ddl_query(&self, table: &str) -> Option<CatalogQuery> {
        let sql = "SELECT type, sql FROM sqlite_master \
                   WHERE tbl_name = ? AND type IN ('table', 'index') AND sql IS NOT NULL \
                   ORDER BY type = 'index'";
        Some((sql.to_string(), vec![SqlValue::from(table)]))
    }

    /// The declared type carries size and scale; column 7 is the primary key position.
    fn parse_column(&self, row: &Row) -> Result<Column> {
        let name = row
            .text(0)
            .ok_or_else(|| MigrateError::Migration("catalog returned a column without a name".into()))?;
        let declared = row.text(1).unwrap_or_default();
        let db_type = self.db_type_from_native(&declared);
        let (_, size, scale) = parse_declared_type(&declared);
        let primary_key = row.at(7).as_i64().unwrap_or(0) > 0;
        let nullable = !primary_key && row.at(5).as_bool().unwrap_or(true);

        let mut column = Column::new(name, db_type);
        if db_type.requires_size() {
            column.size = size;
            column.scale = scale;
        }
        column.properties.insert(if nullable {
            ColumnProperty::Null
        } else {
            ColumnProperty::NotNull
        });
        if primary_key {
            column.properties.insert(ColumnProperty::PrimaryKey);
        }
        column.default = row.text(6).map(DefaultValue::Raw);
        Ok(column)
    }

    /// Named constraints come from the stored table text, unique constraints from indexes.
    fn parse_constraints(&self, rows: &[Row]) -> Vec<ConstraintInfo> {
        let mut found = Vec::new();
        for row in rows {
            let (Some(kind), Some(name), Some(sql)) = (row.text(0), row.text(1), row.text(2)) else {
                continue;
            };
            if kind.eq_ignore_ascii_case("index") {
                if sql.trim_start().to_uppercase().starts_with("CREATE UNIQUE INDEX") {
                    found.push(ConstraintInfo {
                        name,
                        kind: ConstraintKind::Unique,
                    });
                }
                continue;
            }
            let Ok(definitions) = split_definitions(&sql) else {
                continue;
            };
            for definition in &definitions {
                found.extend(
                    named_constraints(definition)
                        .into_iter()
                        .map(|(name, kind, _)| ConstraintInfo { name, kind }),
                );
            }
        }
        found
    }
}
