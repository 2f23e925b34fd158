//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use crate::drivers::ConnectOptions;
use crate::error::Result;
use crate::orchestrator::MigrationTarget;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            ssl_mode: self.ssl_mode,
        }
    }
}

impl MigrationConfig {
    /// The configured target, parsed.
    pub fn target(&self) -> Result<MigrationTarget> {
        self.target.parse()
    }
}
