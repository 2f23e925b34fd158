//! PostgreSQL SQL dialect (Strategy pattern).

use crate::core::identifier::quote_delimited;
use crate::core::schema::{Column, DbType};
use crate::core::traits::{CatalogQuery, Dialect};
use crate::core::value::SqlValue;
use crate::error::Result;

/// PostgreSQL dialect implementation.
///
/// DDL is transactional, identity columns are `serial`/`bigserial`, and the
/// catalog is read from `information_schema` scoped to `current_schema()`.
///
/// `bytea` has no length, so a sized [`DbType::Binary`] column is created as
/// plain `bytea` and reads back as [`DbType::Blob`] without a size.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn aliases(&self) -> &[&str] {
        &["postgresql", "pg"]
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_delimited(name, '"', '"')
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn type_name(&self, db_type: DbType, size: Option<u32>, scale: Option<u32>) -> Result<String> {
        Ok(match db_type {
            DbType::Boolean => "boolean".to_string(),
            DbType::Byte | DbType::Int16 => "smallint".to_string(),
            DbType::Int32 => "integer".to_string(),
            DbType::Int64 => "bigint".to_string(),
            DbType::Single => "real".to_string(),
            DbType::Double => "double precision".to_string(),
            DbType::Decimal => {
                let precision = db_type.required_size(size)?;
                format!("numeric({},{})", precision, scale.unwrap_or(0))
            }
            DbType::Currency => "numeric(19,4)".to_string(),
            DbType::String | DbType::AnsiString => {
                format!("varchar({})", db_type.required_size(size)?)
            }
            DbType::StringFixedLength => format!("char({})", db_type.required_size(size)?),
            DbType::Text => "text".to_string(),
            DbType::Binary => {
                // size is validated, not stored
                db_type.required_size(size)?;
                "bytea".to_string()
            }
            DbType::Blob => "bytea".to_string(),
            DbType::Date => "date".to_string(),
            DbType::Time => "time".to_string(),
            DbType::DateTime => "timestamp".to_string(),
            DbType::DateTimeOffset => "timestamptz".to_string(),
            DbType::Guid => "uuid".to_string(),
        })
    }

    fn db_type_from_native(&self, native: &str) -> DbType {
        match native.trim().to_lowercase().as_str() {
            "boolean" | "bool" => DbType::Boolean,
            "smallint" | "int2" => DbType::Int16,
            "integer" | "int" | "int4" => DbType::Int32,
            "bigint" | "int8" => DbType::Int64,
            "real" | "float4" => DbType::Single,
            "double precision" | "float8" => DbType::Double,
            "numeric" | "decimal" => DbType::Decimal,
            "money" => DbType::Currency,
            "character varying" | "varchar" => DbType::String,
            "character" | "char" | "bpchar" => DbType::StringFixedLength,
            "bytea" => DbType::Blob,
            "date" => DbType::Date,
            "time" | "time without time zone" => DbType::Time,
            "timestamp" | "timestamp without time zone" => DbType::DateTime,
            "timestamptz" | "timestamp with time zone" => DbType::DateTimeOffset,
            "uuid" => DbType::Guid,
            _ => DbType::Text,
        }
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn identity_type(&self, db_type: DbType) -> Option<String> {
        Some(
            match db_type {
                DbType::Int64 => "bigserial",
                DbType::Byte | DbType::Int16 => "smallserial",
                _ => "serial",
            }
            .to_string(),
        )
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn change_column_sql(&self, table: &str, column: &Column) -> Result<Vec<String>> {
        column.validate()?;
        let col = self.quote_ident(&column.name)?;
        let native = self.type_name(column.db_type, column.size, column.scale)?;

        let mut actions = vec![format!(
            "ALTER COLUMN {col} TYPE {native} USING {col}::{native}"
        )];
        actions.push(if column.is_not_null() {
            format!("ALTER COLUMN {col} SET NOT NULL")
        } else {
            format!("ALTER COLUMN {col} DROP NOT NULL")
        });
        actions.push(match &column.default {
            Some(default) => format!(
                "ALTER COLUMN {col} SET DEFAULT {}",
                self.default_expression(default, column.db_type)
            ),
            None => format!("ALTER COLUMN {col} DROP DEFAULT"),
        });

        Ok(vec![format!(
            "ALTER TABLE {} {}",
            self.quote_ident(table)?,
            actions.join(", ")
        )])
    }

    fn tables_query(&self) -> String {
        "SELECT table_name::text FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
         ORDER BY table_name"
            .to_string()
    }

    fn columns_query(&self, table: &str) -> Result<CatalogQuery> {
        let sql = "SELECT column_name::text, data_type::text, \
                   character_maximum_length::int, numeric_precision::int, numeric_scale::int, \
                   is_nullable::text, column_default::text, \
                   (is_identity = 'YES' OR COALESCE(column_default, '') LIKE 'nextval(%') \
                   FROM information_schema.columns \
                   WHERE table_schema = current_schema() AND table_name = $1 \
                   ORDER BY ordinal_position";
        Ok((sql.to_string(), vec![SqlValue::from(table)]))
    }

    fn constraints_query(&self, table: &str) -> Result<CatalogQuery> {
        // contype 'n' (NOT NULL) is left out
        let sql = "SELECT con.conname::text, \
                   CASE con.contype WHEN 'p' THEN 'PRIMARY KEY' WHEN 'f' THEN 'FOREIGN KEY' \
                   WHEN 'u' THEN 'UNIQUE' ELSE 'CHECK' END \
                   FROM pg_catalog.pg_constraint con \
                   JOIN pg_catalog.pg_class rel ON rel.oid = con.conrelid \
                   JOIN pg_catalog.pg_namespace ns ON ns.oid = rel.relnamespace \
                   WHERE ns.nspname = current_schema() AND rel.relname = $1 \
                   AND con.contype IN ('p', 'f', 'u', 'c')";
        Ok((sql.to_string(), vec![SqlValue::from(table)]))
    }
}
