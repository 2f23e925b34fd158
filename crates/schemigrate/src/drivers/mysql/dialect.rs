//! MySQL/MariaDB SQL dialect (Strategy pattern).

use crate::core::identifier::quote_delimited;
use crate::core::schema::{Column, ColumnProperty, ConstraintKind, DbType};
use crate::core::traits::{CatalogQuery, Dialect};
use crate::core::value::SqlValue;
use crate::error::Result;

/// Largest `varchar(n)` rendered before switching to `longtext` (utf8mb4 row limit).
const MAX_VARCHAR: u32 = 16383;

/// MySQL/MariaDB dialect implementation.
///
/// DDL commits implicitly, so runs on this engine are not atomic. Constraint
/// drops use kind-specific syntax, and the primary key is always named `PRIMARY`.
/// Compatible with MySQL 8.0+ and MariaDB 10.5+.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn aliases(&self) -> &[&str] {
        &["mariadb"]
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_delimited(name, '`', '`')
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn type_name(&self, db_type: DbType, size: Option<u32>, scale: Option<u32>) -> Result<String> {
        Ok(match db_type {
            DbType::Boolean => "tinyint(1)".to_string(),
            DbType::Byte => "tinyint unsigned".to_string(),
            DbType::Int16 => "smallint".to_string(),
            DbType::Int32 => "int".to_string(),
            DbType::Int64 => "bigint".to_string(),
            DbType::Single => "float".to_string(),
            DbType::Double => "double".to_string(),
            DbType::Decimal => {
                let precision = db_type.required_size(size)?;
                format!("decimal({},{})", precision, scale.unwrap_or(0))
            }
            DbType::Currency => "decimal(19,4)".to_string(),
            DbType::String | DbType::AnsiString => match db_type.required_size(size)? {
                n if n > MAX_VARCHAR => "longtext".to_string(),
                n => format!("varchar({})", n),
            },
            DbType::StringFixedLength => format!("char({})", db_type.required_size(size)?),
            DbType::Text => "longtext".to_string(),
            DbType::Binary => format!("varbinary({})", db_type.required_size(size)?),
            DbType::Blob => "longblob".to_string(),
            DbType::Date => "date".to_string(),
            DbType::Time => "time".to_string(),
            DbType::DateTime => "datetime".to_string(),
            DbType::DateTimeOffset => "timestamp".to_string(),
            DbType::Guid => "char(36)".to_string(),
        })
    }

    /// Accepts `COLUMN_TYPE` spellings such as `varchar(50)` or `int unsigned`.
    fn db_type_from_native(&self, native: &str) -> DbType {
        let lower = native.trim().to_lowercase();
        if lower.starts_with("tinyint(1)") || lower == "boolean" || lower == "bool" {
            return DbType::Boolean;
        }
        let base = lower
            .split(|c: char| c == '(' || c == ' ')
            .next()
            .unwrap_or_default();
        match base {
            "tinyint" => DbType::Byte,
            "smallint" => DbType::Int16,
            "mediumint" | "int" | "integer" => DbType::Int32,
            "bigint" => DbType::Int64,
            "float" => DbType::Single,
            "double" | "real" => DbType::Double,
            "decimal" | "numeric" => DbType::Decimal,
            "varchar" => DbType::String,
            "char" if lower == "char(36)" => DbType::Guid,
            "char" => DbType::StringFixedLength,
            "varbinary" | "binary" => DbType::Binary,
            "blob" | "mediumblob" | "longblob" | "tinyblob" => DbType::Blob,
            "date" => DbType::Date,
            "time" => DbType::Time,
            "datetime" => DbType::DateTime,
            "timestamp" => DbType::DateTimeOffset,
            _ => DbType::Text,
        }
    }

    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    fn identity_clause(&self) -> Option<&str> {
        Some("AUTO_INCREMENT")
    }

    fn inline_primary_key(&self, _table: Option<&str>, _column: &Column) -> Result<String> {
        // Inline keys cannot carry a constraint name
        Ok("PRIMARY KEY".to_string())
    }

    fn change_column_sql(&self, table: &str, column: &Column) -> Result<Vec<String>> {
        let mut modified = column.clone();
        if modified.properties.remove(&ColumnProperty::PrimaryKey) {
            modified.properties.insert(ColumnProperty::NotNull);
        }
        Ok(vec![format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            self.quote_ident(table)?,
            self.column_sql(&modified)?
        )])
    }

    fn drop_constraint_sql(
        &self,
        table: &str,
        name: &str,
        kind: Option<ConstraintKind>,
    ) -> Result<String> {
        let table = self.quote_ident(table)?;
        Ok(match kind {
            Some(ConstraintKind::PrimaryKey) => format!("ALTER TABLE {} DROP PRIMARY KEY", table),
            Some(ConstraintKind::ForeignKey) => format!(
                "ALTER TABLE {} DROP FOREIGN KEY {}",
                table,
                self.quote_ident(name)?
            ),
            Some(ConstraintKind::Unique) => {
                format!("ALTER TABLE {} DROP INDEX {}", table, self.quote_ident(name)?)
            }
            Some(ConstraintKind::Check) => {
                format!("ALTER TABLE {} DROP CHECK {}", table, self.quote_ident(name)?)
            }
            None => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                table,
                self.quote_ident(name)?
            ),
        })
    }

    fn begin_sql(&self) -> &str {
        "START TRANSACTION"
    }

    fn tables_query(&self) -> String {
        "SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
         ORDER BY TABLE_NAME"
            .to_string()
    }

    fn columns_query(&self, table: &str) -> Result<CatalogQuery> {
        // CAST to CHAR: MySQL 8 reports some catalog columns with a binary collation
        let sql = "SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME, \
                   CAST(COLUMN_TYPE AS CHAR(255)) AS COLUMN_TYPE, \
                   CAST(CASE WHEN CHARACTER_MAXIMUM_LENGTH > 2147483647 THEN -1 \
                        ELSE CHARACTER_MAXIMUM_LENGTH END AS SIGNED) AS max_length, \
                   CAST(NUMERIC_PRECISION AS SIGNED) AS num_precision, \
                   CAST(NUMERIC_SCALE AS SIGNED) AS num_scale, \
                   CAST(IS_NULLABLE AS CHAR(3)) AS IS_NULLABLE, \
                   CAST(COLUMN_DEFAULT AS CHAR) AS COLUMN_DEFAULT, \
                   IF(EXTRA LIKE '%auto_increment%', 1, 0) AS is_identity \
                   FROM information_schema.COLUMNS \
                   WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
                   ORDER BY ORDINAL_POSITION";
        Ok((sql.to_string(), vec![SqlValue::from(table)]))
    }

    fn constraints_query(&self, table: &str) -> Result<CatalogQuery> {
        let sql = "SELECT CAST(CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME, \
                   CAST(CONSTRAINT_TYPE AS CHAR(32)) AS CONSTRAINT_TYPE \
                   FROM information_schema.TABLE_CONSTRAINTS \
                   WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?";
        Ok((sql.to_string(), vec![SqlValue::from(table)]))
    }
}
