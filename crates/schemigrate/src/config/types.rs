//! Configuration types.

use serde::{Deserialize, Serialize};

use crate::drivers::SslMode;
use crate::ledger::DEFAULT_LEDGER_TABLE;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database to migrate.
    pub database: DatabaseConfig,

    /// Runner behavior.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Target database configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Engine name or alias (`postgres`, `mssql`, `mysql`, `sqlite`, ...).
    pub r#type: String,

    /// Driver-native connection string.
    pub connection_string: String,

    /// Overrides whatever TLS settings the connection string carries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_mode: Option<SslMode>,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("type", &self.r#type)
            .field("connection_string", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Table holding applied versions (default: "SchemaInfo").
    #[serde(default = "default_ledger_table")]
    pub ledger_table: String,

    /// Run everything in one transaction where the engine supports it (default: true).
    #[serde(default = "default_true")]
    pub transactional_ddl: bool,

    /// `latest`, `zero`, or a version number (default: "latest").
    #[serde(default = "default_target")]
    pub target: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            ledger_table: default_ledger_table(),
            transactional_ddl: true,
            target: default_target(),
        }
    }
}

fn default_ledger_table() -> String {
    DEFAULT_LEDGER_TABLE.to_string()
}

fn default_target() -> String {
    "latest".to_string()
}

fn default_true() -> bool {
    true
}
