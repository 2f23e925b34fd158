//! SQL Server connection over Tiberius.

use std::borrow::Cow;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tiberius::{Client, ColumnData, Config, EncryptionLevel, FromSql, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{info, warn};

use crate::core::traits::SqlConnection;
use crate::core::value::{Row, SqlValue};
use crate::drivers::common::tls::SslMode;
use crate::error::{MigrateError, Result};

/// A single SQL Server session.
pub struct MssqlConnection {
    client: Option<Client<Compat<TcpStream>>>,
}

impl MssqlConnection {
    /// Connect using an ADO.NET connection string
    /// (`Server=tcp:host,1433;Database=db;User Id=sa;Password=...`).
    ///
    /// `Encrypt` and `TrustServerCertificate` from the string apply unless
    /// `ssl_mode` is given.
    pub async fn connect(connection_string: &str, ssl_mode: Option<SslMode>) -> Result<Self> {
        let mut config = Config::from_ado_string(connection_string)?;

        if let Some(mode) = ssl_mode {
            if mode.requires_tls() {
                if !mode.verifies_certificate() {
                    config.trust_cert();
                }
                config.encryption(EncryptionLevel::Required);
            } else {
                warn!("SQL Server encryption is disabled. Credentials will be transmitted in plaintext.");
                config.encryption(EncryptionLevel::NotSupported);
            }
        }

        let addr = config.get_addr().to_string();
        let tcp = TcpStream::connect(&addr).await?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(config, tcp.compat_write()).await?;
        info!("Connected to SQL Server at {}", addr);
        Ok(Self {
            client: Some(client),
        })
    }

    fn client(&mut self) -> Result<&mut Client<Compat<TcpStream>>> {
        self.client
            .as_mut()
            .ok_or_else(|| MigrateError::pool("connection is closed", "SQL Server"))
    }
}

/// Transaction control must run as a plain batch; inside `sp_executesql` an
/// unbalanced BEGIN/COMMIT raises error 266.
fn is_transaction_control(sql: &str) -> bool {
    let upper = sql.trim_start().to_uppercase();
    ["BEGIN TRAN", "COMMIT", "ROLLBACK", "SAVE TRAN"]
        .iter()
        .any(|prefix| upper.starts_with(prefix))
}

#[async_trait]
impl SqlConnection for MssqlConnection {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let client = self.client()?;
        if params.is_empty() && is_transaction_control(sql) {
            client.simple_query(sql).await?.into_results().await?;
            return Ok(0);
        }
        let params: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
        let result = client.execute(sql, &params).await?;
        Ok(result.total())
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let client = self.client()?;
        let params: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
        let rows = client.query(sql, &params).await?.into_first_result().await?;
        rows.into_iter().map(convert_row).collect()
    }

    fn db_type(&self) -> &str {
        "mssql"
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.close().await?;
        }
        Ok(())
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            // nvarchar NULL converts implicitly to nearly every column type
            SqlValue::Null => ColumnData::String(None),
            SqlValue::Bool(v) => ColumnData::Bit(Some(*v)),
            SqlValue::I32(v) => ColumnData::I32(Some(*v)),
            SqlValue::I64(v) => ColumnData::I64(Some(*v)),
            SqlValue::F64(v) => ColumnData::F64(Some(*v)),
            SqlValue::Decimal(v) => v.to_sql(),
            SqlValue::Text(v) => ColumnData::String(Some(Cow::Borrowed(v.as_str()))),
            SqlValue::Bytes(v) => ColumnData::Binary(Some(Cow::Borrowed(v.as_slice()))),
            SqlValue::DateTime(v) => v.to_sql(),
            SqlValue::Date(v) => v.to_sql(),
            SqlValue::Uuid(v) => ColumnData::Guid(Some(*v)),
        }
    }
}

fn convert_row(row: tiberius::Row) -> Result<Row> {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = row
        .into_iter()
        .map(|data| convert_value(&data))
        .collect::<Result<Vec<_>>>()?;
    Ok(Row::new(columns, values))
}

fn convert_value(data: &ColumnData<'static>) -> Result<SqlValue> {
    let value = match data {
        ColumnData::U8(v) => v.map(|v| SqlValue::I32(i32::from(v))),
        ColumnData::I16(v) => v.map(|v| SqlValue::I32(i32::from(v))),
        ColumnData::I32(v) => v.map(SqlValue::I32),
        ColumnData::I64(v) => v.map(SqlValue::I64),
        ColumnData::F32(v) => v.map(|v| SqlValue::F64(f64::from(v))),
        ColumnData::F64(v) => v.map(SqlValue::F64),
        ColumnData::Bit(v) => v.map(SqlValue::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| SqlValue::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(SqlValue::Uuid),
        ColumnData::Binary(v) => v.as_ref().map(|b| SqlValue::Bytes(b.to_vec())),
        ColumnData::Numeric(v) => v.map(|n| {
            SqlValue::Decimal(Decimal::from_i128_with_scale(n.value(), u32::from(n.scale())))
        }),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| SqlValue::Text(x.clone().into_owned().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            chrono::NaiveDateTime::from_sql(data)?.map(SqlValue::DateTime)
        }
        ColumnData::Date(_) => chrono::NaiveDate::from_sql(data)?.map(SqlValue::Date),
        ColumnData::Time(_) => {
            chrono::NaiveTime::from_sql(data)?.map(|t| SqlValue::Text(t.to_string()))
        }
        ColumnData::DateTimeOffset(_) => chrono::DateTime::<chrono::Utc>::from_sql(data)?
            .map(|v| SqlValue::DateTime(v.naive_utc())),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}
