//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The database rejected a schema or data operation.
    ///
    /// Conflicts such as creating a table that already exists are not
    /// pre-checked; the driver's error is wrapped with the attempted operation.
    #[error("Schema operation failed: {operation}")]
    Schema {
        operation: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// A precondition checked before any SQL was issued failed.
    #[error("Migration error: {0}")]
    Migration(String),

    /// The loaded migration set is malformed.
    #[error("Loader error: {0}")]
    Loader(String),

    /// A migration unit failed; nothing from this unit was recorded.
    #[error("Migration {version} failed")]
    MigrationFailed {
        version: i64,
        #[source]
        source: Box<MigrateError>,
    },

    /// A run on an engine without transactional DDL failed after committing units.
    ///
    /// Everything up to `last_committed` is applied and recorded in the ledger;
    /// operators can resume from there.
    #[error("Migration {version} failed after partial commit (last committed version: {last_committed})")]
    PartialMigration {
        version: i64,
        last_committed: i64,
        #[source]
        source: Box<MigrateError>,
    },

    /// Column definition violates the column invariants.
    #[error("Invalid column '{column}': {message}")]
    InvalidColumn { column: String, message: String },

    /// Identifier rejected before quoting.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Operation cannot be expressed on this engine.
    #[error("{dialect} does not support {operation}")]
    Unsupported { dialect: String, operation: String },

    /// PostgreSQL driver error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// SQL Server driver error
    #[error("SQL Server error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    /// MySQL or SQLite driver error
    #[error("SQL error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Wrap a driver error with the operation that triggered it.
    pub fn schema(operation: impl Into<String>, source: MigrateError) -> Self {
        MigrateError::Schema {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    pub fn invalid_column(column: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::InvalidColumn {
            column: column.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(dialect: impl Into<String>, operation: impl Into<String>) -> Self {
        MigrateError::Unsupported {
            dialect: dialect.into(),
            operation: operation.into(),
        }
    }

    /// Version of the unit that failed, if this error came out of a run.
    pub fn failed_version(&self) -> Option<i64> {
        match self {
            MigrateError::MigrationFailed { version, .. }
            | MigrateError::PartialMigration { version, .. } => Some(*version),
            _ => None,
        }
    }

    /// Process exit status for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Io(_) => 2,
            MigrateError::Loader(_) => 3,
            MigrateError::MigrationFailed { .. } => 4,
            MigrateError::PartialMigration { .. } => 5,
            MigrateError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
