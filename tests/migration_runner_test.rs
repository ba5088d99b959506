//! Migration runner tests against in-memory SQLite databases.

use std::fs;
use std::path::Path;
use std::time::Duration;

use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement};
use tempfile::TempDir;

use launchpad::errors::MigrationError;
use launchpad::infra::Database;
use launchpad::services::MigrationRunner;

async fn file_db(path: &Path) -> Database {
    let url = format!("sqlite://{}?mode=rwc", path.display());
    Database::connect(&url.parse().unwrap()).await.unwrap()
}

async fn memory_db() -> Database {
    Database::connect(&"sqlite::memory:".parse().unwrap())
        .await
        .unwrap()
}

fn write_unit(dir: &Path, file: &str, sql: &str) {
    fs::write(dir.join(file), sql).unwrap();
}

/// Three units that each leave a trace in `applied_log`, written to disk in
/// reverse version order.
fn three_units() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_unit(
        dir.path(),
        "003_orders.up.sql",
        "CREATE TABLE orders (id INTEGER PRIMARY KEY);\nINSERT INTO applied_log (unit) VALUES ('003');",
    );
    write_unit(dir.path(), "003_orders.down.sql", "DROP TABLE orders;");
    write_unit(
        dir.path(),
        "002_users.up.sql",
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT);\nINSERT INTO applied_log (unit) VALUES ('002');",
    );
    write_unit(dir.path(), "002_users.down.sql", "DROP TABLE users;");
    write_unit(
        dir.path(),
        "001_log.up.sql",
        "CREATE TABLE applied_log (seq INTEGER PRIMARY KEY AUTOINCREMENT, unit TEXT NOT NULL);\nINSERT INTO applied_log (unit) VALUES ('001');",
    );
    write_unit(dir.path(), "001_log.down.sql", "DROP TABLE applied_log;");
    dir
}

async fn applied_log(conn: &DatabaseConnection) -> Vec<String> {
    conn.query_all(Statement::from_string(
        DatabaseBackend::Sqlite,
        "SELECT unit FROM applied_log ORDER BY seq",
    ))
    .await
    .unwrap()
    .into_iter()
    .map(|row| row.try_get::<String>("", "unit").unwrap())
    .collect()
}

async fn table_exists(conn: &DatabaseConnection, table: &str) -> bool {
    let row = conn
        .query_one(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?",
            [table.into()],
        ))
        .await
        .unwrap()
        .unwrap();
    row.try_get::<i64>("", "n").unwrap() == 1
}

#[tokio::test]
async fn test_applies_units_in_version_order() {
    let dir = three_units();
    let db = memory_db().await;
    let runner = MigrationRunner::new(dir.path());

    let applied = runner.apply_pending(db.connection()).await.unwrap();

    assert_eq!(applied, 3);
    assert_eq!(applied_log(db.connection()).await, vec!["001", "002", "003"]);
}

#[tokio::test]
async fn test_apply_is_idempotent() {
    let dir = three_units();
    let db = memory_db().await;
    let runner = MigrationRunner::new(dir.path());

    assert_eq!(runner.apply_pending(db.connection()).await.unwrap(), 3);
    assert_eq!(runner.apply_pending(db.connection()).await.unwrap(), 0);
    assert_eq!(applied_log(db.connection()).await.len(), 3);

    let status = runner.status(db.connection()).await.unwrap();
    assert!(status.iter().all(|s| s.is_applied()));
}

#[tokio::test]
async fn test_failing_unit_stops_the_run() {
    let dir = three_units();
    write_unit(
        dir.path(),
        "002_users.up.sql",
        "INSERT INTO applied_log (unit) VALUES ('002');\nINSERT INTO no_such_table VALUES (1);",
    );
    let db = memory_db().await;
    let runner = MigrationRunner::new(dir.path());

    let err = runner.apply_pending(db.connection()).await.unwrap_err();

    assert!(matches!(err, MigrationError::Apply { version: 2, .. }));
    assert_eq!(err.version(), Some(2));
    // 001 stays committed, 002 rolled back, 003 never attempted
    assert_eq!(applied_log(db.connection()).await, vec!["001"]);
    assert!(!table_exists(db.connection(), "orders").await);

    let status = runner.status(db.connection()).await.unwrap();
    let applied: Vec<i64> = status.iter().filter(|s| s.is_applied()).map(|s| s.version).collect();
    assert_eq!(applied, vec![1]);
}

#[tokio::test]
async fn test_rollback_last_restores_previous_schema() {
    let dir = three_units();
    let db = memory_db().await;
    let runner = MigrationRunner::new(dir.path());
    runner.apply_pending(db.connection()).await.unwrap();

    let reverted = runner.rollback_last(db.connection()).await.unwrap();

    assert_eq!(reverted.version, 3);
    assert_eq!(reverted.name, "orders");
    assert!(!table_exists(db.connection(), "orders").await);
    assert!(table_exists(db.connection(), "users").await);

    // the reverted unit is pending again
    assert_eq!(runner.apply_pending(db.connection()).await.unwrap(), 1);
    assert!(table_exists(db.connection(), "orders").await);
}

#[tokio::test]
async fn test_rollback_steps_newest_first() {
    let dir = three_units();
    let db = memory_db().await;
    let runner = MigrationRunner::new(dir.path());
    runner.apply_pending(db.connection()).await.unwrap();

    let reverted = runner.rollback(db.connection(), 2).await.unwrap();

    let versions: Vec<i64> = reverted.iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![3, 2]);
    assert!(!table_exists(db.connection(), "users").await);
    assert_eq!(applied_log(db.connection()).await, vec!["001", "002", "003"]);
}

#[tokio::test]
async fn test_failed_rollback_step_reports_units_already_reverted() {
    let dir = three_units();
    fs::remove_file(dir.path().join("002_users.down.sql")).unwrap();
    let db = memory_db().await;
    let runner = MigrationRunner::new(dir.path());
    runner.apply_pending(db.connection()).await.unwrap();

    let err = runner.rollback(db.connection(), 3).await.unwrap_err();

    match &err {
        MigrationError::PartialRollback { reverted, source } => {
            let versions: Vec<i64> = reverted.iter().map(|r| r.version).collect();
            assert_eq!(versions, vec![3]);
            assert!(matches!(**source, MigrationError::MissingDown { version: 2, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.version(), Some(2));
    assert!(!table_exists(db.connection(), "orders").await);
    assert!(table_exists(db.connection(), "users").await);
}

#[tokio::test]
async fn test_rollback_with_nothing_applied() {
    let dir = three_units();
    let db = memory_db().await;
    let runner = MigrationRunner::new(dir.path());

    let err = runner.rollback_last(db.connection()).await.unwrap_err();
    assert!(matches!(err, MigrationError::NothingToRollback));
}

#[tokio::test]
async fn test_rollback_requires_down_script() {
    let dir = tempfile::tempdir().unwrap();
    write_unit(dir.path(), "001_init.up.sql", "CREATE TABLE t (id INTEGER);");
    let db = memory_db().await;
    let runner = MigrationRunner::new(dir.path());
    runner.apply_pending(db.connection()).await.unwrap();

    let err = runner.rollback_last(db.connection()).await.unwrap_err();

    assert!(matches!(err, MigrationError::MissingDown { version: 1, .. }));
    assert!(table_exists(db.connection(), "t").await);
}

#[tokio::test]
async fn test_modified_applied_unit_is_rejected() {
    let dir = three_units();
    let db = memory_db().await;
    let runner = MigrationRunner::new(dir.path());
    runner.apply_pending(db.connection()).await.unwrap();

    write_unit(
        dir.path(),
        "002_users.up.sql",
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT, name TEXT);",
    );

    let err = runner.apply_pending(db.connection()).await.unwrap_err();
    assert!(matches!(err, MigrationError::ChecksumMismatch { version: 2, .. }));
}

#[tokio::test]
async fn test_unit_older_than_latest_applied_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_unit(dir.path(), "001_a.up.sql", "CREATE TABLE a (id INTEGER);");
    write_unit(dir.path(), "003_c.up.sql", "CREATE TABLE c (id INTEGER);");
    let db = memory_db().await;
    let runner = MigrationRunner::new(dir.path());
    assert_eq!(runner.apply_pending(db.connection()).await.unwrap(), 2);

    write_unit(dir.path(), "002_b.up.sql", "CREATE TABLE b (id INTEGER);");

    let err = runner.apply_pending(db.connection()).await.unwrap_err();
    assert!(matches!(
        err,
        MigrationError::OutOfOrder {
            version: 2,
            latest: 3,
            ..
        }
    ));
    assert!(!table_exists(db.connection(), "b").await);
}

#[tokio::test]
async fn test_status_lists_pending_and_applied() {
    let dir = three_units();
    let db = memory_db().await;
    let runner = MigrationRunner::new(dir.path());

    let before = runner.status(db.connection()).await.unwrap();
    assert_eq!(before.len(), 3);
    assert!(before.iter().all(|s| !s.is_applied()));

    runner.apply_pending(db.connection()).await.unwrap();
    runner.rollback_last(db.connection()).await.unwrap();

    let after = runner.status(db.connection()).await.unwrap();
    let flags: Vec<(i64, bool)> = after.iter().map(|s| (s.version, s.is_applied())).collect();
    assert_eq!(flags, vec![(1, true), (2, true), (3, false)]);
}

#[tokio::test]
async fn test_concurrent_runs_on_one_sqlite_file_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let migrations = dir.path().join("migrations");
    fs::create_dir(&migrations).unwrap();
    for version in 1..=5 {
        write_unit(
            &migrations,
            &format!("00{version}_t{version}.up.sql"),
            &format!("CREATE TABLE t{version} (id INTEGER PRIMARY KEY);"),
        );
    }

    for round in 0..5 {
        let path = dir.path().join(format!("app{round}.db"));
        let a = file_db(&path).await;
        let b = file_db(&path).await;
        let runner_a = MigrationRunner::new(&migrations).with_lock_options(200, Duration::from_millis(10));
        let runner_b = runner_a.clone();

        let (left, right) = tokio::join!(
            runner_a.apply_pending(a.connection()),
            runner_b.apply_pending(b.connection())
        );

        let mut counts = vec![left.unwrap(), right.unwrap()];
        counts.sort();
        assert_eq!(counts, vec![0, 5]);
        assert!(runner_a.status(a.connection()).await.unwrap().iter().all(|s| s.is_applied()));
    }
}
