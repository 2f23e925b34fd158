//! Shared fixtures for the SQLite-backed integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use schemigrate::{
    Column, DbType, MigrateError, Migration, Result, TransformationProvider,
};

/// A fresh in-memory database.
pub async fn sqlite() -> TransformationProvider {
    TransformationProvider::connect("sqlite", "sqlite::memory:")
        .await
        .unwrap()
}

/// Records which steps ran, in order.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// Creates `table` on up and drops it on down.
pub struct CreateTable {
    pub version: i64,
    pub table: &'static str,
    pub journal: Journal,
}

impl CreateTable {
    pub fn new(version: i64, table: &'static str, journal: &Journal) -> Self {
        Self {
            version,
            table,
            journal: journal.clone(),
        }
    }
}

#[async_trait]
impl Migration for CreateTable {
    fn version(&self) -> i64 {
        self.version
    }

    async fn up(&self, db: &mut TransformationProvider) -> Result<()> {
        self.journal.lock().unwrap().push(format!("up {}", self.version));
        db.add_table(
            self.table,
            vec![
                Column::new("Id", DbType::Int32).primary_key_with_identity(),
                Column::new("Name", DbType::String).size(50).null(),
            ],
        )
        .await
    }

    async fn down(&self, db: &mut TransformationProvider) -> Result<()> {
        self.journal.lock().unwrap().push(format!("down {}", self.version));
        db.remove_table(self.table).await
    }
}

/// Creates `table`, then fails.
pub struct FailAfterCreate {
    pub version: i64,
    pub table: &'static str,
}

#[async_trait]
impl Migration for FailAfterCreate {
    fn version(&self) -> i64 {
        self.version
    }

    async fn up(&self, db: &mut TransformationProvider) -> Result<()> {
        db.add_table(self.table, vec![Column::new("Id", DbType::Int32).primary_key()])
            .await?;
        Err(MigrateError::Migration("deliberate failure".into()))
    }

    async fn down(&self, db: &mut TransformationProvider) -> Result<()> {
        db.remove_table(self.table).await
    }
}
