//! MSSQL SQL dialect (Strategy pattern).

use crate::core::identifier::quote_delimited;
use crate::core::schema::{Column, DbType, ForeignKeyAction};
use crate::core::traits::{CatalogQuery, Dialect};
use crate::core::value::SqlValue;
use crate::error::Result;

/// Largest `nvarchar(n)` before falling back to `nvarchar(max)`.
const MAX_NVARCHAR: u32 = 4000;

/// Largest `varchar(n)` / `varbinary(n)` before falling back to `(max)`.
const MAX_VARCHAR: u32 = 8000;

/// Microsoft SQL Server dialect implementation.
///
/// Renames go through `sp_rename`. Column defaults are named constraints, so
/// changing or dropping a column first drops the default bound to it.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MSSQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    fn default_constraint_name(table: &str, column: &str) -> String {
        format!("DF_{}_{}", table, column)
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn aliases(&self) -> &[&str] {
        &["sqlserver", "sql_server"]
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_delimited(name, '[', ']')
    }

    fn param_placeholder(&self, index: usize) -> String {
        // MSSQL uses @P1, @P2, etc. (1-based)
        format!("@P{}", index)
    }

    fn type_name(&self, db_type: DbType, size: Option<u32>, scale: Option<u32>) -> Result<String> {
        Ok(match db_type {
            DbType::Boolean => "bit".to_string(),
            DbType::Byte => "tinyint".to_string(),
            DbType::Int16 => "smallint".to_string(),
            DbType::Int32 => "int".to_string(),
            DbType::Int64 => "bigint".to_string(),
            DbType::Single => "real".to_string(),
            DbType::Double => "float".to_string(),
            DbType::Decimal => {
                let precision = db_type.required_size(size)?;
                format!("decimal({},{})", precision, scale.unwrap_or(0))
            }
            DbType::Currency => "money".to_string(),
            DbType::String => match db_type.required_size(size)? {
                n if n > MAX_NVARCHAR => "nvarchar(max)".to_string(),
                n => format!("nvarchar({})", n),
            },
            DbType::StringFixedLength => format!("nchar({})", db_type.required_size(size)?),
            DbType::AnsiString => match db_type.required_size(size)? {
                n if n > MAX_VARCHAR => "varchar(max)".to_string(),
                n => format!("varchar({})", n),
            },
            DbType::Text => "nvarchar(max)".to_string(),
            DbType::Binary => match db_type.required_size(size)? {
                n if n > MAX_VARCHAR => "varbinary(max)".to_string(),
                n => format!("varbinary({})", n),
            },
            DbType::Blob => "varbinary(max)".to_string(),
            DbType::Date => "date".to_string(),
            DbType::Time => "time".to_string(),
            DbType::DateTime => "datetime2".to_string(),
            DbType::DateTimeOffset => "datetimeoffset".to_string(),
            DbType::Guid => "uniqueidentifier".to_string(),
        })
    }

    fn db_type_from_native(&self, native: &str) -> DbType {
        match native.trim().to_lowercase().as_str() {
            "bit" => DbType::Boolean,
            "tinyint" => DbType::Byte,
            "smallint" => DbType::Int16,
            "int" => DbType::Int32,
            "bigint" => DbType::Int64,
            "real" => DbType::Single,
            "float" => DbType::Double,
            "decimal" | "numeric" => DbType::Decimal,
            "money" | "smallmoney" => DbType::Currency,
            "nvarchar" => DbType::String,
            "nchar" | "char" => DbType::StringFixedLength,
            "varchar" => DbType::AnsiString,
            "varbinary" | "binary" => DbType::Binary,
            "image" => DbType::Blob,
            "date" => DbType::Date,
            "time" => DbType::Time,
            "datetime" | "datetime2" | "smalldatetime" => DbType::DateTime,
            "datetimeoffset" => DbType::DateTimeOffset,
            "uniqueidentifier" => DbType::Guid,
            _ => DbType::Text,
        }
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn identity_clause(&self) -> Option<&str> {
        Some("IDENTITY(1,1)")
    }

    fn string_literal(&self, value: &str) -> String {
        format!("N'{}'", value.replace('\'', "''"))
    }

    fn on_delete_clause(&self, action: ForeignKeyAction) -> Option<&'static str> {
        // RESTRICT is spelled NO ACTION here
        match action {
            ForeignKeyAction::NoAction | ForeignKeyAction::Restrict => None,
            other => Some(other.as_sql()),
        }
    }

    fn rename_table_sql(&self, old: &str, new: &str) -> Result<String> {
        Ok(format!(
            "EXEC sp_rename {}, {}",
            self.string_literal(&self.quote_ident(old)?),
            self.string_literal(new)
        ))
    }

    fn rename_column_sql(&self, table: &str, old: &str, new: &str) -> Result<String> {
        let object = format!("{}.{}", self.quote_ident(table)?, self.quote_ident(old)?);
        Ok(format!(
            "EXEC sp_rename {}, {}, N'COLUMN'",
            self.string_literal(&object),
            self.string_literal(new)
        ))
    }

    fn add_column_keyword(&self) -> &str {
        "ADD"
    }

    fn change_column_sql(&self, table: &str, column: &Column) -> Result<Vec<String>> {
        column.validate()?;
        let quoted_table = self.quote_ident(table)?;
        let col = self.quote_ident(&column.name)?;
        let native = self.type_name(column.db_type, column.size, column.scale)?;
        let nullability = if column.is_not_null() { "NOT NULL" } else { "NULL" };

        let mut statements = vec![format!(
            "ALTER TABLE {} ALTER COLUMN {} {} {}",
            quoted_table, col, native, nullability
        )];
        if let Some(default) = &column.default {
            statements.push(format!(
                "ALTER TABLE {} ADD CONSTRAINT {} DEFAULT {} FOR {}",
                quoted_table,
                self.quote_ident(&Self::default_constraint_name(table, &column.name))?,
                self.default_expression(default, column.db_type),
                col
            ));
        }
        Ok(statements)
    }

    fn begin_sql(&self) -> &str {
        "BEGIN TRANSACTION"
    }

    fn commit_sql(&self) -> &str {
        "COMMIT TRANSACTION"
    }

    fn rollback_sql(&self) -> &str {
        "ROLLBACK TRANSACTION"
    }

    fn tables_query(&self) -> String {
        "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_SCHEMA = SCHEMA_NAME() \
         ORDER BY TABLE_NAME"
            .to_string()
    }

    fn columns_query(&self, table: &str) -> Result<CatalogQuery> {
        let sql = "SELECT c.COLUMN_NAME, c.DATA_TYPE, c.CHARACTER_MAXIMUM_LENGTH, \
                   CAST(c.NUMERIC_PRECISION AS int), c.NUMERIC_SCALE, c.IS_NULLABLE, c.COLUMN_DEFAULT, \
                   COLUMNPROPERTY(OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)), \
                   c.COLUMN_NAME, 'IsIdentity') \
                   FROM INFORMATION_SCHEMA.COLUMNS c \
                   WHERE c.TABLE_SCHEMA = SCHEMA_NAME() AND c.TABLE_NAME = @P1 \
                   ORDER BY c.ORDINAL_POSITION";
        Ok((sql.to_string(), vec![SqlValue::from(table)]))
    }

    fn constraints_query(&self, table: &str) -> Result<CatalogQuery> {
        let sql = "SELECT CONSTRAINT_NAME, CONSTRAINT_TYPE \
                   FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS \
                   WHERE TABLE_SCHEMA = SCHEMA_NAME() AND TABLE_NAME = @P1";
        Ok((sql.to_string(), vec![SqlValue::from(table)]))
    }

    /// Foreign keys on either side of the column, then check constraints, then
    /// indexes (primary key and unique constraints included), then the default.
    fn dependent_objects_query(&self, table: &str, column: &str) -> Option<CatalogQuery> {
        let object = self.quote_ident(table).ok()?;
        Some((
            DEPENDENT_OBJECTS_SQL.to_string(),
            vec![SqlValue::from(object), SqlValue::from(column)],
        ))
    }
}

/// `(name, drop_sql, recreate_sql)` for everything bound to column `@P2` of `@P1`.
const DEPENDENT_OBJECTS_SQL: &str = "\
WITH target AS (
    SELECT c.object_id, c.column_id,
           QUOTENAME(OBJECT_SCHEMA_NAME(c.object_id)) + '.' + QUOTENAME(OBJECT_NAME(c.object_id)) AS tbl
    FROM sys.columns c
    WHERE c.object_id = OBJECT_ID(@P1) AND c.name = @P2
)
SELECT fk.name AS name,
       'ALTER TABLE ' + QUOTENAME(OBJECT_SCHEMA_NAME(fk.parent_object_id)) + '.'
           + QUOTENAME(OBJECT_NAME(fk.parent_object_id)) + ' DROP CONSTRAINT ' + QUOTENAME(fk.name) AS drop_sql,
       'ALTER TABLE ' + QUOTENAME(OBJECT_SCHEMA_NAME(fk.parent_object_id)) + '.'
           + QUOTENAME(OBJECT_NAME(fk.parent_object_id)) + ' ADD CONSTRAINT ' + QUOTENAME(fk.name)
           + ' FOREIGN KEY (' + (SELECT STRING_AGG(QUOTENAME(COL_NAME(k.parent_object_id, k.parent_column_id)), ', ')
                                  WITHIN GROUP (ORDER BY k.constraint_column_id)
                                 FROM sys.foreign_key_columns k WHERE k.constraint_object_id = fk.object_id)
           + ') REFERENCES ' + QUOTENAME(OBJECT_SCHEMA_NAME(fk.referenced_object_id)) + '.'
           + QUOTENAME(OBJECT_NAME(fk.referenced_object_id))
           + ' (' + (SELECT STRING_AGG(QUOTENAME(COL_NAME(k.referenced_object_id, k.referenced_column_id)), ', ')
                      WITHIN GROUP (ORDER BY k.constraint_column_id)
                     FROM sys.foreign_key_columns k WHERE k.constraint_object_id = fk.object_id)
           + ') ON DELETE ' + REPLACE(fk.delete_referential_action_desc, '_', ' ') AS recreate_sql,
       1 AS ord
FROM sys.foreign_keys fk
WHERE EXISTS (
    SELECT 1 FROM sys.foreign_key_columns k JOIN target t
      ON (k.parent_object_id = t.object_id AND k.parent_column_id = t.column_id)
      OR (k.referenced_object_id = t.object_id AND k.referenced_column_id = t.column_id)
    WHERE k.constraint_object_id = fk.object_id)
UNION ALL
SELECT cc.name,
       'ALTER TABLE ' + t.tbl + ' DROP CONSTRAINT ' + QUOTENAME(cc.name),
       'ALTER TABLE ' + t.tbl + ' ADD CONSTRAINT ' + QUOTENAME(cc.name) + ' CHECK ' + cc.definition,
       2
FROM sys.check_constraints cc JOIN target t ON cc.parent_object_id = t.object_id
WHERE cc.parent_column_id = t.column_id
   OR CHARINDEX(QUOTENAME(@P2), cc.definition) > 0
UNION ALL
SELECT i.name,
       CASE WHEN i.is_primary_key = 1 OR i.is_unique_constraint = 1
            THEN 'ALTER TABLE ' + t.tbl + ' DROP CONSTRAINT ' + QUOTENAME(i.name)
            ELSE 'DROP INDEX ' + QUOTENAME(i.name) + ' ON ' + t.tbl END,
       CASE WHEN i.is_primary_key = 1 THEN 'ALTER TABLE ' + t.tbl + ' ADD CONSTRAINT ' + QUOTENAME(i.name) + ' PRIMARY KEY'
            WHEN i.is_unique_constraint = 1 THEN 'ALTER TABLE ' + t.tbl + ' ADD CONSTRAINT ' + QUOTENAME(i.name) + ' UNIQUE'
            ELSE 'CREATE ' + CASE WHEN i.is_unique = 1 THEN 'UNIQUE ' ELSE '' END
                 + 'INDEX ' + QUOTENAME(i.name) + ' ON ' + t.tbl END
           + ' (' + (SELECT STRING_AGG(QUOTENAME(COL_NAME(ic.object_id, ic.column_id)), ', ')
                      WITHIN GROUP (ORDER BY ic.key_ordinal)
                     FROM sys.index_columns ic
                     WHERE ic.object_id = i.object_id AND ic.index_id = i.index_id
                       AND ic.is_included_column = 0) + ')',
       3
FROM sys.indexes i JOIN target t ON i.object_id = t.object_id
WHERE i.index_id > 0 AND EXISTS (
    SELECT 1 FROM sys.index_columns ic
    WHERE ic.object_id = i.object_id AND ic.index_id = i.index_id AND ic.column_id = t.column_id)
UNION ALL
SELECT dc.name,
       'ALTER TABLE ' + t.tbl + ' DROP CONSTRAINT ' + QUOTENAME(dc.name),
       NULL,
       4
FROM sys.default_constraints dc JOIN target t
  ON dc.parent_object_id = t.object_id AND dc.parent_column_id = t.column_id
ORDER BY ord";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{ConstraintKind, Table};

    #[test]
    fn test_quote_ident() {
        let dialect = MssqlDialect::new();
        assert_eq!(dialect.quote_ident("table").unwrap(), "[table]");
        assert_eq!(dialect.quote_ident("a]b").unwrap(), "[a]]b]");
    }

    #[test]
    fn test_param_placeholder() {
        let dialect = MssqlDialect::new();
        assert_eq!(dialect.param_placeholder(1), "@P1");
        assert_eq!(dialect.param_placeholder(3), "@P3");
    }

    #[test]
    fn test_string_size_falls_back_to_max() {
        let dialect = MssqlDialect::new();
        assert_eq!(
            dialect.type_name(DbType::String, Some(50), None).unwrap(),
            "nvarchar(50)"
        );
        assert_eq!(
            dialect.type_name(DbType::String, Some(5000), None).unwrap(),
            "nvarchar(max)"
        );
        assert_eq!(dialect.type_name(DbType::Text, None, None).unwrap(), "nvarchar(max)");
    }

    #[test]
    fn test_identity_primary_key() {
        let dialect = MssqlDialect::new();
        let table = Table::new("Test").column(
            Column::new("Id", DbType::Int32)
                .primary_key_with_identity()
                .build()
                .unwrap(),
        );
        assert_eq!(
            dialect.create_table_sql(&table).unwrap(),
            vec!["CREATE TABLE [Test] ([Id] int IDENTITY(1,1) NOT NULL CONSTRAINT [PK_Test] PRIMARY KEY)"
                .to_string()]
        );
    }

    #[test]
    fn test_unicode_string_default() {
        let dialect = MssqlDialect::new();
        let col = Column::new("Name", DbType::String).size(10).default("it's");
        assert_eq!(
            dialect.column_sql(&col).unwrap(),
            "[Name] nvarchar(10) DEFAULT N'it''s'"
        );
        let flag = Column::new("Active", DbType::Boolean).not_null().default(false);
        assert_eq!(
            dialect.column_sql(&flag).unwrap(),
            "[Active] bit NOT NULL DEFAULT 0"
        );
    }

    #[test]
    fn test_renames_use_sp_rename() {
        let dialect = MssqlDialect::new();
        assert_eq!(
            dialect.rename_table_sql("Test", "Test_Rename").unwrap(),
            "EXEC sp_rename N'[Test]', N'Test_Rename'"
        );
        assert_eq!(
            dialect.rename_column_sql("Test", "Title", "Name").unwrap(),
            "EXEC sp_rename N'[Test].[Title]', N'Name', N'COLUMN'"
        );
    }

    #[test]
    fn test_change_column_readds_default() {
        let dialect = MssqlDialect::new();
        let col = Column::new("Flag", DbType::Boolean).not_null().default(true);
        assert_eq!(
            dialect.change_column_sql("Test", &col).unwrap(),
            vec![
                "ALTER TABLE [Test] ALTER COLUMN [Flag] bit NOT NULL".to_string(),
                "ALTER TABLE [Test] ADD CONSTRAINT [DF_Test_Flag] DEFAULT 1 FOR [Flag]".to_string(),
            ]
        );
    }

    #[test]
    fn test_dependent_objects_cover_keys_checks_and_indexes() {
        let dialect = MssqlDialect::new();
        let (sql, params) = dialect.dependent_objects_query("Test", "Flag").unwrap();
        for catalog in [
            "sys.foreign_key_columns",
            "sys.check_constraints",
            "sys.index_columns",
            "sys.default_constraints",
        ] {
            assert!(sql.contains(catalog), "missing {}", catalog);
        }
        // foreign keys drop first; defaults have nothing to recreate
        assert!(sql.find("sys.foreign_keys").unwrap() < sql.find("sys.indexes").unwrap());
        assert!(sql.trim_end().ends_with("ORDER BY ord"));
        assert_eq!(params[0].as_str(), Some("[Test]"));
        assert_eq!(params[1].as_str(), Some("Flag"));
        assert_eq!(
            dialect
                .drop_constraint_sql("Test", "DF_Test_Flag", None)
                .unwrap(),
            "ALTER TABLE [Test] DROP CONSTRAINT [DF_Test_Flag]"
        );
        assert_eq!(
            dialect
                .drop_constraint_sql("Test", "FK_X", Some(ConstraintKind::ForeignKey))
                .unwrap(),
            "ALTER TABLE [Test] DROP CONSTRAINT [FK_X]"
        );
    }

    #[test]
    fn test_transaction_statements() {
        let dialect = MssqlDialect::new();
        assert_eq!(dialect.begin_sql(), "BEGIN TRANSACTION");
        assert_eq!(dialect.rollback_sql(), "ROLLBACK TRANSACTION");
    }
}
