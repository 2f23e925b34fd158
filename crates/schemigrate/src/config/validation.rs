//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::drivers::DriverCatalog;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Database validation
    if config.database.r#type.trim().is_empty() {
        return Err(MigrateError::Config("database.type is required".into()));
    }
    let catalog = DriverCatalog::with_builtins();
    if !catalog.has_dialect(&config.database.r#type) {
        return Err(MigrateError::Config(format!(
            "database.type '{}' is not supported (expected one of: {})",
            config.database.r#type,
            catalog.dialect_names().join(", ")
        )));
    }
    if config.database.connection_string.trim().is_empty() {
        return Err(MigrateError::Config(
            "database.connection_string is required".into(),
        ));
    }

    // Migration validation
    if config.migration.ledger_table.trim().is_empty() {
        return Err(MigrateError::Config(
            "migration.ledger_table must not be empty".into(),
        ));
    }
    validate_identifier(&config.migration.ledger_table).map_err(|e| {
        MigrateError::Config(format!("migration.ledger_table is invalid: {}", e))
    })?;
    config.migration.target()?;

    Ok(())
}
