//! Migration runs against in-memory SQLite.

mod common;

use async_trait::async_trait;
use common::{entries, journal, sqlite, CreateTable, FailAfterCreate};
use schemigrate::{
    Column, DbType, Direction, MigrateError, Migration, MigrationLoader, MigrationTarget,
    Migrator, Result, RunState, SqlValue, TransformationProvider,
};
use tokio_util::sync::CancellationToken;

struct CreateT;

#[async_trait]
impl Migration for CreateT {
    fn version(&self) -> i64 {
        1
    }

    async fn up(&self, db: &mut TransformationProvider) -> Result<()> {
        db.add_table("T", vec![Column::new("id", DbType::Int32).primary_key()])
            .await
    }

    async fn down(&self, db: &mut TransformationProvider) -> Result<()> {
        db.remove_table("T").await
    }
}

struct AddName;

#[async_trait]
impl Migration for AddName {
    fn version(&self) -> i64 {
        2
    }

    async fn up(&self, db: &mut TransformationProvider) -> Result<()> {
        db.add_column("T", Column::new("name", DbType::String).size(50).null())
            .await
    }

    async fn down(&self, db: &mut TransformationProvider) -> Result<()> {
        db.remove_column("T", "name").await
    }
}

/// Adds a column, then renames it onto an existing one.
struct AddThenClash;

#[async_trait]
impl Migration for AddThenClash {
    fn version(&self) -> i64 {
        3
    }

    async fn up(&self, db: &mut TransformationProvider) -> Result<()> {
        db.add_column("T", Column::new("extra", DbType::Int32).null())
            .await?;
        db.rename_column("T", "extra", "name").await
    }

    async fn down(&self, db: &mut TransformationProvider) -> Result<()> {
        db.remove_column("T", "extra").await
    }
}

/// Widens `Parent.Title`, a table other rows reference.
struct WidenParentTitle;

#[async_trait]
impl Migration for WidenParentTitle {
    fn version(&self) -> i64 {
        1
    }

    async fn up(&self, db: &mut TransformationProvider) -> Result<()> {
        db.change_column("Parent", Column::new("Title", DbType::String).size(100).null())
            .await
    }

    async fn down(&self, db: &mut TransformationProvider) -> Result<()> {
        db.change_column("Parent", Column::new("Title", DbType::String).size(10).null())
            .await
    }
}

async fn migrator(loader: MigrationLoader) -> Migrator {
    Migrator::new(sqlite().await, loader)
}

#[tokio::test]
async fn test_up_to_latest_then_down_to_zero() {
    let log = journal();
    let loader = MigrationLoader::new()
        .with(CreateTable::new(2, "TestTwo", &log))
        .with(CreateTable::new(1, "Test", &log));
    let mut migrator = migrator(loader).await;

    let report = migrator.migrate_to_latest().await.unwrap();
    assert_eq!(report.direction, Direction::Up);
    assert_eq!(report.applied, vec![1, 2]);
    assert_eq!((report.from_version, report.to_version), (0, 2));
    assert_eq!(migrator.state(), RunState::Committed);

    let db = migrator.provider_mut();
    assert!(db.table_exists("Test").await.unwrap());
    assert!(db.table_exists("TestTwo").await.unwrap());
    assert_eq!(db.applied_migrations().await.unwrap(), vec![1, 2]);

    let report = migrator.migrate_to(MigrationTarget::Zero).await.unwrap();
    assert_eq!(report.direction, Direction::Down);
    assert_eq!(report.reverted, vec![2, 1]);
    assert_eq!(report.to_version, 0);

    let db = migrator.provider_mut();
    assert!(!db.table_exists("Test").await.unwrap());
    assert!(!db.table_exists("TestTwo").await.unwrap());
    assert!(db.applied_migrations().await.unwrap().is_empty());
    assert_eq!(entries(&log), vec!["up 1", "up 2", "down 2", "down 1"]);
}

#[tokio::test]
async fn test_table_then_column_scenario() {
    let mut migrator = migrator(MigrationLoader::new().with(CreateT).with(AddName)).await;
    migrator.migrate_to_latest().await.unwrap();

    let db = migrator.provider_mut();
    assert!(db.table_exists("T").await.unwrap());
    assert!(db.column_exists("T", "name").await.unwrap());
    assert_eq!(db.applied_migrations().await.unwrap(), vec![1, 2]);

    migrator.migrate_to(MigrationTarget::Zero).await.unwrap();
    let db = migrator.provider_mut();
    assert!(!db.table_exists("T").await.unwrap());
    assert!(db.applied_migrations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_rename_discards_added_column() {
    let loader = MigrationLoader::new()
        .with(CreateT)
        .with(AddName)
        .with(AddThenClash);
    let mut migrator = migrator(loader).await;
    migrator
        .migrate_to(MigrationTarget::Version(2))
        .await
        .unwrap();

    let err = migrator.migrate_to_latest().await.unwrap_err();
    assert!(matches!(err, MigrateError::MigrationFailed { version: 3, .. }));
    match err {
        MigrateError::MigrationFailed { source, .. } => {
            assert!(matches!(*source, MigrateError::Migration(_)))
        }
        other => panic!("unexpected error: {}", other),
    }

    let db = migrator.provider_mut();
    assert!(!db.column_exists("T", "extra").await.unwrap());
    assert_eq!(db.applied_migrations().await.unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn test_down_runs_in_descending_order() {
    let log = journal();
    let loader = MigrationLoader::new()
        .with(CreateTable::new(1, "One", &log))
        .with(CreateTable::new(2, "Two", &log))
        .with(CreateTable::new(3, "Three", &log));
    let mut migrator = migrator(loader).await;
    migrator.migrate_to_latest().await.unwrap();

    let report = migrator
        .migrate_to(MigrationTarget::Version(1))
        .await
        .unwrap();
    assert_eq!(report.reverted, vec![3, 2]);
    assert_eq!(report.to_version, 1);
    assert_eq!(
        entries(&log),
        vec!["up 1", "up 2", "up 3", "down 3", "down 2"]
    );
    assert_eq!(
        migrator.provider_mut().applied_migrations().await.unwrap(),
        vec![1]
    );
}

#[tokio::test]
async fn test_applied_versions_never_rerun() {
    let log = journal();
    let loader = MigrationLoader::new().with(CreateTable::new(1, "Test", &log));
    let mut migrator = migrator(loader).await;

    migrator.migrate_to_latest().await.unwrap();
    let again = migrator.migrate_to_latest().await.unwrap();

    assert!(again.applied.is_empty());
    assert_eq!((again.from_version, again.to_version), (1, 1));
    assert_eq!(entries(&log), vec!["up 1"]);
}

#[tokio::test]
async fn test_up_stops_at_target_version() {
    let log = journal();
    let loader = MigrationLoader::new()
        .with(CreateTable::new(1, "One", &log))
        .with(CreateTable::new(2, "Two", &log))
        .with(CreateTable::new(3, "Three", &log));
    let mut migrator = migrator(loader).await;

    let report = migrator
        .migrate_to(MigrationTarget::Version(2))
        .await
        .unwrap();
    assert_eq!(report.applied, vec![1, 2]);

    let status = migrator.status().await.unwrap();
    assert_eq!(status.current_version, 2);
    assert_eq!(status.applied, vec![1, 2]);
    assert_eq!(status.pending, vec![3]);
}

#[tokio::test]
async fn test_failure_rolls_back_whole_run() {
    let log = journal();
    let loader = MigrationLoader::new()
        .with(CreateTable::new(1, "Test", &log))
        .with(FailAfterCreate {
            version: 2,
            table: "Broken",
        });
    let mut migrator = migrator(loader).await;

    let err = migrator.migrate_to_latest().await.unwrap_err();
    assert!(
        matches!(err, MigrateError::MigrationFailed { version: 2, .. }),
        "{}",
        err
    );
    assert_eq!(err.failed_version(), Some(2));
    assert_eq!(migrator.state(), RunState::RolledBack);

    let db = migrator.provider_mut();
    assert!(!db.in_transaction());
    assert!(!db.table_exists("Test").await.unwrap());
    assert!(!db.table_exists("Broken").await.unwrap());
    assert!(!db.table_exists("SchemaInfo").await.unwrap());
}

#[tokio::test]
async fn test_partial_migration_without_transactional_ddl() {
    let log = journal();
    let loader = MigrationLoader::new()
        .with(CreateTable::new(1, "Test", &log))
        .with(FailAfterCreate {
            version: 2,
            table: "Broken",
        });
    let mut migrator = migrator(loader).await.transactional_ddl(false);
    assert!(!migrator.is_transactional());

    let err = migrator.migrate_to_latest().await.unwrap_err();
    assert!(
        matches!(
            err,
            MigrateError::PartialMigration {
                version: 2,
                last_committed: 1,
                ..
            }
        ),
        "{}",
        err
    );

    let db = migrator.provider_mut();
    assert!(db.table_exists("Test").await.unwrap());
    // the failed unit's DDL was not transactional
    assert!(db.table_exists("Broken").await.unwrap());
    assert_eq!(db.applied_migrations().await.unwrap(), vec![1]);
}

#[tokio::test]
async fn test_first_unit_failure_without_transactional_ddl() {
    let loader = MigrationLoader::new().with(FailAfterCreate {
        version: 5,
        table: "Broken",
    });
    let mut migrator = migrator(loader).await.transactional_ddl(false);

    let err = migrator.migrate_to_latest().await.unwrap_err();
    assert!(matches!(err, MigrateError::MigrationFailed { version: 5, .. }));
}

#[tokio::test]
async fn test_duplicate_versions_rejected_before_execution() {
    let log = journal();
    let loader = MigrationLoader::new()
        .with(CreateTable::new(1, "A", &log))
        .with(CreateTable::new(1, "B", &log));
    let mut migrator = migrator(loader).await;

    let err = migrator.migrate_to_latest().await.unwrap_err();
    assert!(matches!(err, MigrateError::Loader(_)));
    assert!(entries(&log).is_empty());
    assert_eq!(migrator.state(), RunState::Idle);
}

#[tokio::test]
async fn test_down_needs_unit_for_every_applied_version() {
    let log = journal();
    let mut migrator = migrator(MigrationLoader::new().with(CreateTable::new(1, "A", &log))).await;
    migrator.provider_mut().migration_applied(9).await.unwrap();

    let err = migrator
        .migrate_to(MigrationTarget::Zero)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::Loader(_)), "{}", err);
}

#[tokio::test]
async fn test_dry_run_executes_nothing() {
    let log = journal();
    let loader = MigrationLoader::new()
        .with(CreateTable::new(1, "One", &log))
        .with(CreateTable::new(2, "Two", &log));
    let mut migrator = migrator(loader).await.dry_run(true);

    let report = migrator.migrate_to_latest().await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.applied, vec![1, 2]);
    assert_eq!(report.to_version, 2);
    assert!(entries(&log).is_empty());

    let db = migrator.provider_mut();
    assert!(!db.table_exists("One").await.unwrap());
    assert!(!db.table_exists("SchemaInfo").await.unwrap());
}

#[tokio::test]
async fn test_cancelled_run_rolls_back() {
    let log = journal();
    let token = CancellationToken::new();
    token.cancel();
    let loader = MigrationLoader::new().with(CreateTable::new(1, "Test", &log));
    let mut migrator = migrator(loader).await.with_cancellation(token);

    let err = migrator.migrate_to_latest().await.unwrap_err();
    assert!(matches!(err, MigrateError::Cancelled));
    assert_eq!(err.exit_code(), 130);
    assert!(entries(&log).is_empty());
    assert!(!migrator.provider_mut().table_exists("Test").await.unwrap());
}

#[tokio::test]
async fn test_custom_ledger_table() {
    let log = journal();
    let provider = sqlite().await.with_ledger_table("schema_versions");
    let mut migrator = Migrator::new(
        provider,
        MigrationLoader::new().with(CreateTable::new(7, "Test", &log)),
    );

    migrator.migrate_to_latest().await.unwrap();
    let db = migrator.provider_mut();
    assert!(db.table_exists("schema_versions").await.unwrap());
    assert!(!db.table_exists("SchemaInfo").await.unwrap());
    assert_eq!(db.applied_migrations().await.unwrap(), vec![7]);
}

#[tokio::test]
async fn test_report_json() {
    let log = journal();
    let mut migrator = migrator(MigrationLoader::new().with(CreateTable::new(1, "A", &log))).await;
    let json = migrator.migrate_to_latest().await.unwrap().to_json().unwrap();
    assert!(json.contains("\"direction\": \"up\""));
    assert!(json.contains("\"to_version\": 1"));
}

#[tokio::test]
async fn test_rebuild_inside_run_keeps_referencing_rows() {
    let mut db = sqlite().await;
    db.add_table(
        "Parent",
        vec![
            Column::new("Id", DbType::Int32).primary_key(),
            Column::new("Title", DbType::String).size(10).null(),
        ],
    )
    .await
    .unwrap();
    db.add_table(
        "Child",
        vec![
            Column::new("Id", DbType::Int32).primary_key(),
            Column::new("ParentId", DbType::Int32).null(),
        ],
    )
    .await
    .unwrap();
    db.add_foreign_key(None, "Child", &["ParentId"], "Parent", &["Id"])
        .await
        .unwrap();
    db.insert("Parent", &["Id", "Title"], vec![SqlValue::I32(1), "a".into()])
        .await
        .unwrap();
    db.insert("Child", &["Id", "ParentId"], vec![SqlValue::I32(1), SqlValue::I32(1)])
        .await
        .unwrap();

    let mut migrator = Migrator::new(db, MigrationLoader::new().with(WidenParentTitle));
    migrator.migrate_to_latest().await.unwrap();
    assert_eq!(migrator.state(), RunState::Committed);

    let db = migrator.provider_mut();
    let title = db.get_column_by_name("Parent", "Title").await.unwrap().unwrap();
    assert_eq!(title.size, Some(100));
    let children = db
        .execute_scalar("SELECT COUNT(*) FROM \"Child\"")
        .await
        .unwrap();
    assert_eq!(children.as_i64(), Some(1));
    assert_eq!(db.applied_migrations().await.unwrap(), vec![1]);
}

#[tokio::test]
async fn test_dropped_ledger_is_recreated_on_read() {
    let log = journal();
    let mut migrator = migrator(MigrationLoader::new().with(CreateTable::new(1, "Test", &log))).await;
    migrator.migrate_to_latest().await.unwrap();

    let db = migrator.provider_mut();
    db.remove_table("SchemaInfo").await.unwrap();
    assert!(db.applied_migrations().await.unwrap().is_empty());
    assert!(db.table_exists("SchemaInfo").await.unwrap());
}

#[tokio::test]
async fn test_recording_a_version_twice_keeps_both_rows() {
    let mut db = sqlite().await;
    db.migration_applied(3).await.unwrap();
    db.migration_applied(3).await.unwrap();
    assert_eq!(db.applied_migrations().await.unwrap(), vec![3, 3]);

    db.migration_unapplied(3).await.unwrap();
    assert!(db.applied_migrations().await.unwrap().is_empty());
}
