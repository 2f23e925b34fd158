//! SQLite connection over SQLx.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteRow};
use sqlx::{Column as _, ConnectOptions, Connection, Row as _, TypeInfo, ValueRef};
use tracing::info;

use crate::core::traits::SqlConnection;
use crate::core::value::{Row, SqlValue};
use crate::error::{MigrateError, Result};

/// A single SQLite session.
pub struct SqliteConnection {
    conn: Option<sqlx::SqliteConnection>,
}

impl SqliteConnection {
    /// Open a database file, creating it when missing.
    ///
    /// Accepts a path, a `sqlite://path` URL or `sqlite::memory:`.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(connection_string)?
            .create_if_missing(true)
            .foreign_keys(true);

        let conn = options
            .connect()
            .await
            .map_err(|e| MigrateError::pool(e, "opening SQLite database"))?;

        info!("Opened SQLite database {}", connection_string);
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut sqlx::SqliteConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| MigrateError::pool("connection is closed", "SQLite"))
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::I32(v) => query.bind(*v),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        // stored as text; NUMERIC affinity converts it on insert
        SqlValue::Decimal(v) => query.bind(v.to_string()),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Bytes(v) => query.bind(v.clone()),
        SqlValue::DateTime(v) => query.bind(*v),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::Uuid(v) => query.bind(v.to_string()),
    }
}

#[async_trait]
impl SqlConnection for SqliteConnection {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let conn = self.conn()?;
        if params.is_empty() {
            let result = sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(sql)).await?;
            return Ok(result.rows_affected());
        }
        let query = params.iter().fold(sqlx::query(sql), bind_value);
        Ok(query.execute(&mut *conn).await?.rows_affected())
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let conn = self.conn()?;
        let query = params.iter().fold(sqlx::query(sql), bind_value);
        let rows = query.fetch_all(&mut *conn).await?;
        rows.iter().map(convert_row).collect()
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        Ok(())
    }
}

fn convert_row(row: &SqliteRow) -> Result<Row> {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let mut values = Vec::with_capacity(columns.len());
    for i in 0..columns.len() {
        values.push(read_value(row, i)?);
    }
    Ok(Row::new(columns, values))
}

/// Values are decoded by storage class, not declared type.
fn read_value(row: &SqliteRow, i: usize) -> Result<SqlValue> {
    let raw = row.try_get_raw(i)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let storage = raw.type_info().name().to_string();

    let value = match storage.as_str() {
        "INTEGER" | "BOOLEAN" => SqlValue::I64(row.try_get_unchecked::<i64, _>(i)?),
        "REAL" => SqlValue::F64(row.try_get_unchecked::<f64, _>(i)?),
        "BLOB" => SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(i)?),
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(i)?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_and_query_in_memory() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        conn.execute("CREATE TABLE t (id INTEGER, name TEXT, score REAL, data BLOB)", &[])
            .await
            .unwrap();
        let inserted = conn
            .execute(
                "INSERT INTO t VALUES (?, ?, ?, ?)",
                &[
                    SqlValue::I32(1),
                    SqlValue::from("o'brien"),
                    SqlValue::F64(1.5),
                    SqlValue::Null,
                ],
            )
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let rows = conn.query("SELECT id, name, score, data FROM t", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].at(0), &SqlValue::I64(1));
        assert_eq!(rows[0].text(1).as_deref(), Some("o'brien"));
        assert_eq!(rows[0].at(2), &SqlValue::F64(1.5));
        assert!(rows[0].at(3).is_null());
    }

    #[tokio::test]
    async fn test_multi_statement_execute() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        conn.execute(
            "CREATE TABLE a (x INTEGER); CREATE TABLE b (y INTEGER); INSERT INTO a VALUES (1);",
            &[],
        )
        .await
        .unwrap();
        let rows = conn
            .query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_closed_connection_errors() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        conn.close().await.unwrap();
        assert!(conn.execute("SELECT 1", &[]).await.is_err());
    }
}
