//! PostgreSQL connection.
//!
//! One pooled `tokio-postgres` client obtained through deadpool-postgres, so the
//! TLS and recycling setup match every other PostgreSQL entry point.

use std::error::Error as StdError;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use rust_decimal::Decimal;
use tokio_postgres::config::SslMode as PgSslMode;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Config as PgConfig, NoTls, SimpleQueryMessage};
use tracing::info;

use crate::core::traits::SqlConnection;
use crate::core::value::{Row, SqlValue};
use crate::drivers::common::tls::{postgres_connector, SslMode};
use crate::error::{MigrateError, Result};

/// Connect timeout applied when the connection string sets none.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

type BoxError = Box<dyn StdError + Sync + Send>;

/// A single PostgreSQL session.
pub struct PostgresConnection {
    client: Option<Object>,
}

impl PostgresConnection {
    /// Connect using a libpq key/value string or a `postgres://` URL.
    ///
    /// `ssl_mode` overrides the connection string; without it TLS follows the
    /// string's `sslmode`.
    pub async fn connect(connection_string: &str, ssl_mode: Option<SslMode>) -> Result<Self> {
        let mut pg_config = PgConfig::from_str(connection_string)?;
        if pg_config.get_connect_timeout().is_none() {
            pg_config.connect_timeout(CONNECT_TIMEOUT);
        }

        let mode = match ssl_mode {
            Some(mode) => {
                if mode.requires_tls() {
                    pg_config.ssl_mode(PgSslMode::Require);
                }
                mode
            }
            None => match pg_config.get_ssl_mode() {
                PgSslMode::Disable => SslMode::Disable,
                _ => SslMode::VerifyFull,
            },
        };

        let database = pg_config.get_dbname().unwrap_or("postgres").to_string();
        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let manager = match postgres_connector(mode)? {
            None => Manager::from_config(pg_config, NoTls, mgr_config),
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
        };
        let pool = Pool::builder(manager)
            .max_size(1)
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL pool"))?;

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "connecting to PostgreSQL"))?;

        info!("Connected to PostgreSQL database '{}'", database);
        Ok(Self {
            client: Some(client),
        })
    }

    fn client(&self) -> Result<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| MigrateError::pool("connection is closed", "PostgreSQL"))
    }
}

fn params(values: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

#[async_trait]
impl SqlConnection for PostgresConnection {
    async fn execute(&mut self, sql: &str, params_: &[SqlValue]) -> Result<u64> {
        let client = self.client()?;
        if params_.is_empty() {
            // simple protocol: allows several statements in one call
            let messages = client.simple_query(sql).await?;
            return Ok(messages
                .iter()
                .map(|m| match m {
                    SimpleQueryMessage::CommandComplete(n) => *n,
                    _ => 0,
                })
                .sum());
        }
        Ok(client.execute(sql, &params(params_)).await?)
    }

    async fn query(&mut self, sql: &str, params_: &[SqlValue]) -> Result<Vec<Row>> {
        let client = self.client()?;
        let rows = client.query(sql, &params(params_)).await?;
        rows.iter().map(convert_row).collect()
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&mut self) -> Result<()> {
        // dropping the object returns it to the pool, which closes with it
        self.client.take();
        Ok(())
    }
}

fn convert_row(row: &tokio_postgres::Row) -> Result<Row> {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in row.columns().iter().enumerate() {
        values.push(read_value(row, i, column.type_())?);
    }
    Ok(Row::new(columns, values))
}

fn read_value(row: &tokio_postgres::Row, i: usize, ty: &Type) -> Result<SqlValue> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(i)?.map(SqlValue::Bool),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(i)?
            .map(|v| SqlValue::I32(i32::from(v))),
        Type::INT4 => row.try_get::<_, Option<i32>>(i)?.map(SqlValue::I32),
        Type::INT8 => row.try_get::<_, Option<i64>>(i)?.map(SqlValue::I64),
        Type::OID => row
            .try_get::<_, Option<u32>>(i)?
            .map(|v| SqlValue::I64(i64::from(v))),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(i)?
            .map(|v| SqlValue::F64(f64::from(v))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(i)?.map(SqlValue::F64),
        Type::NUMERIC => row.try_get::<_, Option<Decimal>>(i)?.map(SqlValue::Decimal),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(i)?.map(SqlValue::Bytes),
        Type::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(i)?
            .map(SqlValue::DateTime),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(i)?
            .map(|v| SqlValue::DateTime(v.naive_utc())),
        Type::DATE => row
            .try_get::<_, Option<chrono::NaiveDate>>(i)?
            .map(SqlValue::Date),
        Type::UUID => row.try_get::<_, Option<uuid::Uuid>>(i)?.map(SqlValue::Uuid),
        _ => row.try_get::<_, Option<String>>(i)?.map(SqlValue::Text),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

/// Integers are narrowed or widened to whatever the server expects for the parameter.
fn int_to_sql(v: i64, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(v).to_sql(ty, out),
        Type::BOOL => (v != 0).to_sql(ty, out),
        _ => v.to_sql(ty, out),
    }
}

/// Text is parsed when the parameter's server type is not textual, so
/// string-valued inserts work against numeric and boolean columns.
fn text_to_sql(v: &str, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 => int_to_sql(v.trim().parse::<i64>()?, ty, out),
        Type::FLOAT4 => v.trim().parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => v.trim().parse::<f64>()?.to_sql(ty, out),
        Type::NUMERIC => Decimal::from_str(v.trim())?.to_sql(ty, out),
        Type::BOOL => match v.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" => true.to_sql(ty, out),
            "false" | "f" | "0" | "no" => false.to_sql(ty, out),
            other => Err(format!("invalid boolean literal '{}'", other).into()),
        },
        Type::UUID => uuid::Uuid::parse_str(v.trim())?.to_sql(ty, out),
        _ => v.to_sql(ty, out),
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql(ty, out),
            SqlValue::I32(v) => int_to_sql(i64::from(*v), ty, out),
            SqlValue::I64(v) => int_to_sql(*v, ty, out),
            SqlValue::F64(v) if *ty == Type::FLOAT4 => (*v as f32).to_sql(ty, out),
            SqlValue::F64(v) if *ty == Type::NUMERIC => Decimal::try_from(*v)?.to_sql(ty, out),
            SqlValue::F64(v) => v.to_sql(ty, out),
            SqlValue::Decimal(v) => v.to_sql(ty, out),
            SqlValue::Text(v) => text_to_sql(v, ty, out),
            SqlValue::Bytes(v) => v.to_sql(ty, out),
            SqlValue::DateTime(v) => v.to_sql(ty, out),
            SqlValue::Date(v) => v.to_sql(ty, out),
            SqlValue::Uuid(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
