//! Transformation provider against in-memory SQLite.

mod common;

use std::sync::Arc;

use common::sqlite;
use schemigrate::core::traits::CatalogQuery;
use schemigrate::drivers::{SqliteConnection, SqliteDialect};
use schemigrate::{
    Column, ColumnProperty, DbType, DefaultValue, Dialect, MigrateError, Result, Row, SqlValue,
    TransformationProvider,
};

fn id() -> Column {
    Column::new("Id", DbType::Int32).primary_key_with_identity()
}

// =============================================================================
// Tables and Columns
// =============================================================================

#[tokio::test]
async fn test_added_column_reads_back() {
    let mut db = sqlite().await;
    db.add_table("Test", vec![id()]).await.unwrap();
    db.add_column("Test", Column::new("Name", DbType::String).size(50).null())
        .await
        .unwrap();

    let column = db.get_column_by_name("Test", "name").await.unwrap().unwrap();
    assert_eq!(column.name, "Name");
    assert_eq!(column.db_type, DbType::String);
    assert_eq!(column.size, Some(50));
    assert!(column.has(ColumnProperty::Null));
    assert!(!column.has(ColumnProperty::NotNull));

    let key = db.get_column_by_name("Test", "Id").await.unwrap().unwrap();
    assert!(key.is_primary_key());
    assert!(key.has(ColumnProperty::NotNull));
}

#[tokio::test]
async fn test_column_definitions_read_back() {
    let mut db = sqlite().await;
    let columns = vec![
        Column::new("Code", DbType::String).size(30).not_null(),
        Column::new("Price", DbType::Decimal).size(10).scale(2).null(),
        Column::new("Active", DbType::Boolean).not_null().default(true),
        Column::new("Hash", DbType::Binary).size(16).null(),
    ];
    let mut definition = vec![id()];
    definition.extend(columns.iter().cloned());
    db.add_table("Test", definition).await.unwrap();

    for expected in &columns {
        let actual = db
            .get_column_by_name("Test", &expected.name)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(actual.db_type, expected.db_type, "{}", expected.name);
        assert_eq!(actual.size, expected.size, "{}", expected.name);
        assert_eq!(actual.scale, expected.scale, "{}", expected.name);
        assert_eq!(actual.is_not_null(), expected.is_not_null(), "{}", expected.name);
    }

    let active = db.get_column_by_name("Test", "Active").await.unwrap().unwrap();
    assert_eq!(active.default, Some(DefaultValue::Raw("1".into())));
}

#[tokio::test]
async fn test_existence_checks_ignore_case() {
    let mut db = sqlite().await;
    db.add_table("Customers", vec![id()]).await.unwrap();

    assert!(db.table_exists("customers").await.unwrap());
    assert!(db.column_exists("CUSTOMERS", "id").await.unwrap());
    assert!(!db.column_exists("Customers", "Missing").await.unwrap());
    assert!(!db.column_exists("Missing", "Id").await.unwrap());
    assert_eq!(db.get_tables().await.unwrap(), vec!["Customers".to_string()]);
}

#[tokio::test]
async fn test_removals_are_idempotent() {
    let mut db = sqlite().await;
    db.add_table("Test", vec![id(), Column::new("Name", DbType::Text).null()])
        .await
        .unwrap();

    db.remove_column("Test", "Name").await.unwrap();
    db.remove_column("Test", "Name").await.unwrap();
    assert!(!db.column_exists("Test", "Name").await.unwrap());

    db.remove_table("Test").await.unwrap();
    db.remove_table("Test").await.unwrap();
    assert!(!db.table_exists("Test").await.unwrap());

    db.remove_foreign_key("Test", "FK_Test_Other").await.unwrap();
    db.remove_constraint("Test", "UQ_Test_Name").await.unwrap();
}

async fn user_index_count(db: &mut TransformationProvider, table: &str) -> Option<i64> {
    db.execute_scalar(&format!(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = '{}' \
         AND name NOT LIKE 'sqlite_%'",
        table
    ))
    .await
    .unwrap()
    .as_i64()
}

#[tokio::test]
async fn test_remove_column_after_add() {
    let cases = vec![
        Column::new("Test", DbType::String).size(50).indexed().null(),
        Column::new("Test", DbType::String).size(50).unique().null(),
        Column::new("Test", DbType::Boolean).not_null().default(false),
        Column::new("Test", DbType::Int32).null(),
    ];

    for column in cases {
        let mut db = sqlite().await;
        db.add_table("TestTwo", vec![id()]).await.unwrap();
        db.execute_non_query("INSERT INTO \"TestTwo\" DEFAULT VALUES")
            .await
            .unwrap();
        db.add_column("TestTwo", column.clone()).await.unwrap();

        db.remove_column("TestTwo", "Test").await.unwrap();
        assert!(!db.column_exists("TestTwo", "Test").await.unwrap(), "{:?}", column);
        assert_eq!(user_index_count(&mut db, "TestTwo").await, Some(0), "{:?}", column);
        let rows = db
            .execute_scalar("SELECT COUNT(*) FROM \"TestTwo\"")
            .await
            .unwrap();
        assert_eq!(rows.as_i64(), Some(1), "{:?}", column);
        assert!(!db.in_transaction());
    }
}

#[tokio::test]
async fn test_remove_column_drops_its_check_and_keeps_other_indexes() {
    let mut db = sqlite().await;
    db.add_table(
        "People",
        vec![
            id(),
            Column::new("Age", DbType::Int32).null(),
            Column::new("Name", DbType::String).size(20).indexed().null(),
        ],
    )
    .await
    .unwrap();
    db.add_check_constraint(Some("CK_People_Age"), "People", "\"Age\" >= 0")
        .await
        .unwrap();

    db.remove_column("People", "Age").await.unwrap();
    assert!(!db.column_exists("People", "Age").await.unwrap());
    assert!(!db.constraint_exists("People", "CK_People_Age").await.unwrap());
    assert_eq!(user_index_count(&mut db, "People").await, Some(1));
}

#[tokio::test]
async fn test_creating_existing_table_is_schema_error() {
    let mut db = sqlite().await;
    db.add_table("Test", vec![id()]).await.unwrap();
    let err = db.add_table("Test", vec![id()]).await.unwrap_err();
    assert!(matches!(err, MigrateError::Schema { .. }), "{}", err);
}

#[tokio::test]
async fn test_rename_preconditions() {
    let mut db = sqlite().await;
    db.add_table("A", vec![id(), Column::new("Old", DbType::Int32).null()])
        .await
        .unwrap();
    db.add_table("B", vec![id()]).await.unwrap();

    let missing = db.rename_table("Nope", "C").await.unwrap_err();
    assert!(matches!(missing, MigrateError::Migration(_)));
    let taken = db.rename_table("A", "B").await.unwrap_err();
    assert!(matches!(taken, MigrateError::Migration(_)));

    db.rename_column("A", "Old", "New").await.unwrap();
    assert!(db.column_exists("A", "New").await.unwrap());
    assert!(!db.column_exists("A", "Old").await.unwrap());

    db.rename_table("A", "C").await.unwrap();
    assert!(db.table_exists("C").await.unwrap());
    assert!(!db.table_exists("A").await.unwrap());
}

#[tokio::test]
async fn test_invalid_column_rejected_before_sql() {
    let mut db = sqlite().await;
    db.add_table("Test", vec![id()]).await.unwrap();
    let err = db
        .add_column("Test", Column::new("Name", DbType::String))
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::InvalidColumn { .. }));
}

#[tokio::test]
async fn test_change_column_keeps_data() {
    let mut db = sqlite().await;
    db.add_table(
        "People",
        vec![id(), Column::new("Name", DbType::String).size(20).null()],
    )
    .await
    .unwrap();
    db.insert("People", &["Name"], vec!["Ann".into()]).await.unwrap();

    db.change_column(
        "People",
        Column::new("Name", DbType::String).size(100).not_null(),
    )
    .await
    .unwrap();

    let column = db.get_column_by_name("People", "Name").await.unwrap().unwrap();
    assert_eq!(column.size, Some(100));
    assert!(column.has(ColumnProperty::NotNull));
    let name = db
        .execute_scalar("SELECT \"Name\" FROM \"People\"")
        .await
        .unwrap();
    assert_eq!(name.as_str(), Some("Ann"));
    assert!(!db.in_transaction());
}

#[tokio::test]
async fn test_change_missing_column_fails() {
    let mut db = sqlite().await;
    db.add_table("People", vec![id()]).await.unwrap();
    let err = db
        .change_column("People", Column::new("Ghost", DbType::Int32).null())
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::Migration(_)));
}

// =============================================================================
// Constraints
// =============================================================================

#[tokio::test]
async fn test_foreign_key_enforced_and_removed() {
    let mut db = sqlite().await;
    db.add_table("Users", vec![id()]).await.unwrap();
    db.add_table(
        "Orders",
        vec![id(), Column::new("UserId", DbType::Int32).foreign_key()],
    )
    .await
    .unwrap();

    db.add_foreign_key(None, "Orders", &["UserId"], "Users", &["Id"])
        .await
        .unwrap();
    assert!(db.constraint_exists("Orders", "FK_Orders_Users").await.unwrap());
    assert!(db
        .insert("Orders", &["UserId"], vec![SqlValue::I32(42)])
        .await
        .is_err());

    db.remove_foreign_key("Orders", "fk_orders_users").await.unwrap();
    assert!(!db.constraint_exists("Orders", "FK_Orders_Users").await.unwrap());
    db.insert("Orders", &["UserId"], vec![SqlValue::I32(42)])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rebuilding_referenced_table_keeps_children() {
    let mut db = sqlite().await;
    db.add_table("Test", vec![id(), Column::new("Title", DbType::String).size(10).null()])
        .await
        .unwrap();
    db.add_table("TestTwo", vec![id(), Column::new("TestId", DbType::Int32).null()])
        .await
        .unwrap();
    db.add_foreign_key(None, "TestTwo", &["TestId"], "Test", &["Id"])
        .await
        .unwrap();
    db.insert("Test", &["Title"], vec!["first".into()]).await.unwrap();
    db.insert("TestTwo", &["TestId"], vec![SqlValue::I32(1)])
        .await
        .unwrap();

    db.change_column("Test", Column::new("Title", DbType::String).size(100).null())
        .await
        .unwrap();
    db.add_check_constraint(Some("CK_Test_Title"), "Test", "\"Title\" <> ''")
        .await
        .unwrap();
    assert!(!db.in_transaction());

    let title = db.get_column_by_name("Test", "Title").await.unwrap().unwrap();
    assert_eq!(title.size, Some(100));
    let children = db
        .execute_scalar("SELECT COUNT(*) FROM \"TestTwo\" WHERE \"TestId\" = 1")
        .await
        .unwrap();
    assert_eq!(children.as_i64(), Some(1));

    // the key still points at the rebuilt table and is enforced again
    assert!(db
        .insert("TestTwo", &["TestId"], vec![SqlValue::I32(99)])
        .await
        .is_err());
    assert!(db
        .delete("Test", &["Id"], vec![SqlValue::I32(1)])
        .await
        .is_err());
}

#[tokio::test]
async fn test_foreign_key_column_lists_must_match() {
    let mut db = sqlite().await;
    let err = db
        .add_foreign_key(None, "Orders", &["A", "B"], "Users", &["Id"])
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::Migration(_)));
}

#[tokio::test]
async fn test_unique_constraint_round_trip() {
    let mut db = sqlite().await;
    db.add_table(
        "Users",
        vec![id(), Column::new("Email", DbType::String).size(100).null()],
    )
    .await
    .unwrap();

    db.add_unique_constraint(None, "Users", &["Email"]).await.unwrap();
    assert!(db.constraint_exists("Users", "UQ_Users_Email").await.unwrap());

    db.insert("Users", &["Email"], vec!["a@example.com".into()])
        .await
        .unwrap();
    assert!(db
        .insert("Users", &["Email"], vec!["a@example.com".into()])
        .await
        .is_err());

    db.remove_constraint("Users", "UQ_Users_Email").await.unwrap();
    assert!(!db.constraint_exists("Users", "UQ_Users_Email").await.unwrap());
    db.insert("Users", &["Email"], vec!["a@example.com".into()])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_check_constraint_enforced() {
    let mut db = sqlite().await;
    db.add_table("People", vec![id(), Column::new("Age", DbType::Int32).null()])
        .await
        .unwrap();
    db.add_check_constraint(Some("CK_People_Age"), "People", "\"Age\" >= 0")
        .await
        .unwrap();

    assert!(db.constraint_exists("People", "CK_People_Age").await.unwrap());
    assert!(db
        .insert("People", &["Age"], vec![SqlValue::I32(-1)])
        .await
        .is_err());
    db.insert("People", &["Age"], vec![SqlValue::I32(30)])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_primary_key_lookup_and_removal() {
    let mut db = sqlite().await;
    db.add_table(
        "Codes",
        vec![Column::new("Code", DbType::String).size(10).primary_key()],
    )
    .await
    .unwrap();

    assert!(db.primary_key_exists("Codes", "PK_Codes").await.unwrap());
    assert!(!db.primary_key_exists("Codes", "PK_Other").await.unwrap());

    db.remove_primary_key("Codes").await.unwrap();
    assert!(!db.primary_key_exists("Codes", "PK_Codes").await.unwrap());
    assert!(db.column_exists("Codes", "Code").await.unwrap());
}

// =============================================================================
// Data and Raw SQL
// =============================================================================

#[tokio::test]
async fn test_dml_binds_quotes_and_nulls() {
    let mut db = sqlite().await;
    db.add_table(
        "Test",
        vec![id(), Column::new("Name", DbType::String).size(50).null()],
    )
    .await
    .unwrap();

    assert_eq!(
        db.insert("Test", &["Name"], vec!["O'Brien".into()])
            .await
            .unwrap(),
        1
    );
    db.insert("Test", &["Name"], vec![SqlValue::Null]).await.unwrap();

    let rows = db
        .select("Name", "Test", Some("\"Name\" = 'O''Brien'"))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].text(0).as_deref(), Some("O'Brien"));

    assert_eq!(
        db.delete("Test", &["Name"], vec![SqlValue::Null]).await.unwrap(),
        1
    );
    assert_eq!(
        db.update("Test", &["Name"], vec!["Smith".into()], None)
            .await
            .unwrap(),
        1
    );

    let count = db
        .execute_scalar("SELECT COUNT(*) FROM \"Test\"")
        .await
        .unwrap();
    assert_eq!(count.as_i64(), Some(1));
    let all = db.select("*", "Test", None).await.unwrap();
    assert_eq!(all[0].text(1).as_deref(), Some("Smith"));
}

#[tokio::test]
async fn test_insert_arity_mismatch() {
    let mut db = sqlite().await;
    let err = db
        .insert("Test", &["A", "B"], vec![SqlValue::I32(1)])
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::Migration(_)));
}

#[tokio::test]
async fn test_scalar_on_empty_result_is_null() {
    let mut db = sqlite().await;
    db.add_table("Empty", vec![id()]).await.unwrap();
    let value = db
        .execute_scalar("SELECT \"Id\" FROM \"Empty\"")
        .await
        .unwrap();
    assert!(value.is_null());
}

#[tokio::test]
async fn test_dialect_scoped_sql() {
    let mut db = sqlite().await;

    let mut postgres_only = db.for_dialect("postgres");
    assert!(!postgres_only.is_active());
    assert_eq!(
        postgres_only
            .execute_non_query("CREATE EXTENSION pgcrypto")
            .await
            .unwrap(),
        0
    );

    db.for_dialect("SQLite3")
        .execute_non_query("CREATE TABLE \"Scoped\" (\"Id\" INTEGER)")
        .await
        .unwrap();
    assert!(db.table_exists("Scoped").await.unwrap());
}

// =============================================================================
// Transactions and Ledger
// =============================================================================

#[tokio::test]
async fn test_rollback_discards_ddl() {
    let mut db = sqlite().await;
    db.begin_transaction().await.unwrap();
    db.add_table("Temp", vec![id()]).await.unwrap();
    assert!(db.in_transaction());
    db.rollback().await.unwrap();

    assert!(!db.in_transaction());
    assert!(!db.table_exists("Temp").await.unwrap());
}

#[tokio::test]
async fn test_commit_twice_is_harmless() {
    let mut db = sqlite().await;
    db.begin_transaction().await.unwrap();
    db.begin_transaction().await.unwrap();
    db.add_table("Kept", vec![id()]).await.unwrap();
    db.commit().await.unwrap();
    db.commit().await.unwrap();
    db.rollback().await.unwrap();

    assert!(db.table_exists("Kept").await.unwrap());
}

#[tokio::test]
async fn test_foreign_key_violation_fails_commit_and_rolls_back() {
    let mut db = sqlite().await;
    db.add_table("Users", vec![id()]).await.unwrap();
    db.add_table("Orders", vec![id(), Column::new("UserId", DbType::Int32).null()])
        .await
        .unwrap();
    db.add_foreign_key(None, "Orders", &["UserId"], "Users", &["Id"])
        .await
        .unwrap();

    db.begin_transaction().await.unwrap();
    db.insert("Orders", &["UserId"], vec![SqlValue::I32(42)])
        .await
        .unwrap();
    let err = db.commit().await.unwrap_err();
    assert!(matches!(err, MigrateError::Migration(_)));
    assert!(err.to_string().contains("Orders"));
    assert!(!db.in_transaction());

    let orders = db
        .execute_scalar("SELECT COUNT(*) FROM \"Orders\"")
        .await
        .unwrap();
    assert_eq!(orders.as_i64(), Some(0));
    assert!(db
        .insert("Orders", &["UserId"], vec![SqlValue::I32(42)])
        .await
        .is_err());
}

#[tokio::test]
async fn test_ledger_records_and_removes_versions() {
    let mut db = sqlite().await;
    assert!(db.applied_migrations().await.unwrap().is_empty());
    assert!(db.table_exists("SchemaInfo").await.unwrap());

    db.migration_applied(2).await.unwrap();
    db.migration_applied(1).await.unwrap();
    assert_eq!(db.applied_migrations().await.unwrap(), vec![1, 2]);

    db.migration_unapplied(2).await.unwrap();
    assert_eq!(db.applied_migrations().await.unwrap(), vec![1]);
}

#[tokio::test]
async fn test_closed_provider_rejects_work() {
    let mut db = sqlite().await;
    db.begin_transaction().await.unwrap();
    db.close().await.unwrap();
    assert!(!db.in_transaction());
    assert!(db.get_tables().await.is_err());
}

// =============================================================================
// Dependent Objects
// =============================================================================

/// SQLite rendering with in-place column changes. Changing or dropping a column
/// that an index covers fails unless the index is dropped first.
#[derive(Debug)]
struct InPlaceSqlite(SqliteDialect);

impl Dialect for InPlaceSqlite {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        self.0.quote_ident(name)
    }

    fn param_placeholder(&self, index: usize) -> String {
        self.0.param_placeholder(index)
    }

    fn type_name(&self, db_type: DbType, size: Option<u32>, scale: Option<u32>) -> Result<String> {
        self.0.type_name(db_type, size, scale)
    }

    fn db_type_from_native(&self, native: &str) -> DbType {
        self.0.db_type_from_native(native)
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn change_column_sql(&self, table: &str, column: &Column) -> Result<Vec<String>> {
        let table = self.quote_ident(table)?;
        Ok(vec![
            format!("ALTER TABLE {} DROP COLUMN {}", table, self.quote_ident(&column.name)?),
            format!("ALTER TABLE {} ADD COLUMN {}", table, self.column_sql(column)?),
        ])
    }

    fn tables_query(&self) -> String {
        self.0.tables_query()
    }

    fn columns_query(&self, table: &str) -> Result<CatalogQuery> {
        self.0.columns_query(table)
    }

    fn constraints_query(&self, table: &str) -> Result<CatalogQuery> {
        self.0.constraints_query(table)
    }

    fn parse_column(&self, row: &Row) -> Result<Column> {
        self.0.parse_column(row)
    }

    fn dependent_objects_query(&self, table: &str, column: &str) -> Option<CatalogQuery> {
        let sql = "SELECT name, 'DROP INDEX \"' || name || '\"', sql FROM sqlite_master \
                   WHERE type = 'index' AND tbl_name = ? AND sql LIKE '%\"' || ? || '\"%'";
        Some((sql.to_string(), vec![table.into(), column.into()]))
    }
}

async fn in_place_sqlite() -> TransformationProvider {
    let conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
    TransformationProvider::new(Arc::new(InPlaceSqlite(SqliteDialect::new())), Box::new(conn))
}

#[tokio::test]
async fn test_change_column_reapplies_dependent_objects() {
    let mut db = in_place_sqlite().await;
    db.add_table(
        "T",
        vec![
            Column::new("Id", DbType::Int32).primary_key(),
            Column::new("Code", DbType::String).size(20).indexed().null(),
        ],
    )
    .await
    .unwrap();

    db.change_column("T", Column::new("Code", DbType::String).size(40).null())
        .await
        .unwrap();

    let code = db.get_column_by_name("T", "Code").await.unwrap().unwrap();
    assert_eq!(code.size, Some(40));
    let index = db
        .execute_scalar("SELECT COUNT(*) FROM sqlite_master WHERE name = 'IX_T_Code'")
        .await
        .unwrap();
    assert_eq!(index.as_i64(), Some(1));
}

#[tokio::test]
async fn test_remove_column_drops_dependent_objects() {
    let mut db = in_place_sqlite().await;
    db.add_table(
        "T",
        vec![
            Column::new("Id", DbType::Int32).primary_key(),
            Column::new("Code", DbType::String).size(20).indexed().null(),
        ],
    )
    .await
    .unwrap();

    db.remove_column("T", "Code").await.unwrap();
    assert!(!db.column_exists("T", "Code").await.unwrap());
    assert_eq!(user_index_count(&mut db, "T").await, Some(0));
}
