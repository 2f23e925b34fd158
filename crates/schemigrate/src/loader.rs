//! Migration units and their registration.
//!
//! Migrations are ordinary Rust types compiled into the binary and registered
//! with a [`MigrationLoader`]. The loader owns them; a run borrows them.
//!
//! ```rust,ignore
//! struct CreateUsers;
//!
//! #[async_trait]
//! impl Migration for CreateUsers {
//!     fn version(&self) -> i64 { 1 }
//!
//!     async fn up(&self, db: &mut TransformationProvider) -> Result<()> {
//!         db.add_table("Users", vec![Column::new("Id", DbType::Int32).primary_key()]).await
//!     }
//!
//!     async fn down(&self, db: &mut TransformationProvider) -> Result<()> {
//!         db.remove_table("Users").await
//!     }
//! }
//!
//! let loader = MigrationLoader::new().with(CreateUsers);
//! ```

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{MigrateError, Result};
use crate::provider::TransformationProvider;

/// One versioned, reversible schema change.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique, user-assigned version. Migrations run in ascending order.
    fn version(&self) -> i64;

    /// Display name for logs and reports.
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Ignored migrations are left out of every run.
    fn ignored(&self) -> bool {
        false
    }

    async fn up(&self, provider: &mut TransformationProvider) -> Result<()>;

    async fn down(&self, provider: &mut TransformationProvider) -> Result<()>;
}

/// Registry of migration units.
#[derive(Default)]
pub struct MigrationLoader {
    migrations: Vec<Box<dyn Migration>>,
}

impl MigrationLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, migration: impl Migration + 'static) -> &mut Self {
        self.migrations.push(Box::new(migration));
        self
    }

    /// Builder form of [`MigrationLoader::register`].
    pub fn with(mut self, migration: impl Migration + 'static) -> Self {
        self.register(migration);
        self
    }

    pub fn register_boxed(&mut self, migration: Box<dyn Migration>) -> &mut Self {
        self.migrations.push(migration);
        self
    }

    /// The runnable migrations, ascending by version.
    ///
    /// Fails with [`MigrateError::Loader`] on duplicate versions or when nothing
    /// runnable is registered. Ignored migrations are skipped with a warning.
    pub fn load(&self) -> Result<Vec<&dyn Migration>> {
        let mut seen = HashSet::new();
        let mut loaded = Vec::with_capacity(self.migrations.len());

        for migration in &self.migrations {
            if !seen.insert(migration.version()) {
                return Err(MigrateError::Loader(format!(
                    "Duplicate migration version {} ({})",
                    migration.version(),
                    migration.name()
                )));
            }
            if migration.ignored() {
                warn!(
                    "Migration {} ({}) is ignored",
                    migration.version(),
                    migration.name()
                );
                continue;
            }
            loaded.push(migration.as_ref());
        }

        if loaded.is_empty() {
            return Err(MigrateError::Loader("No migrations found".into()));
        }
        loaded.sort_by_key(|m| m.version());
        Ok(loaded)
    }

    /// Highest runnable version.
    pub fn last_version(&self) -> Option<i64> {
        self.migrations
            .iter()
            .filter(|m| !m.ignored())
            .map(|m| m.version())
            .max()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl std::fmt::Debug for MigrationLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let versions: Vec<i64> = self.migrations.iter().map(|m| m.version()).collect();
        f.debug_struct("MigrationLoader")
            .field("versions", &versions)
            .finish()
    }
}
