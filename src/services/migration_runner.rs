//! Migration runner - applies and reverts versioned SQL units.
//!
//! Every operation runs under the migration advisory lock on the connection
//! it is given. Each unit runs in its own transaction together with the
//! bookkeeping insert (or delete), so a unit is either fully applied and
//! recorded or not at all.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveValue::Set, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryOrder,
    QuerySelect, Schema, TransactionTrait,
};
use sea_orm_migration::SchemaManager;

use super::launcher::MigrationGate;
use crate::config::{DEFAULT_LOCK_RETRIES, DEFAULT_LOCK_RETRY_DELAY_MS, MIGRATIONS_TABLE};
use crate::domain::{DependencyTarget, MigrationRecord, MigrationStatus, MigrationUnit};
use crate::errors::MigrationError;
use crate::infra::db::entities::schema_migration::{self, Column};
use crate::infra::db::entities::{SchemaMigrationEntity, SchemaMigrationModel};
use crate::infra::{migration_source, AdvisoryLock, Database};

/// Runs the units found in one migrations directory.
#[derive(Debug, Clone)]
pub struct MigrationRunner {
    migrations_dir: PathBuf,
    lock_retries: u32,
    lock_retry_delay: Duration,
}

impl MigrationRunner {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            lock_retries: DEFAULT_LOCK_RETRIES,
            lock_retry_delay: Duration::from_millis(DEFAULT_LOCK_RETRY_DELAY_MS),
        }
    }

    pub fn with_lock_options(mut self, retries: u32, retry_delay: Duration) -> Self {
        self.lock_retries = retries;
        self.lock_retry_delay = retry_delay;
        self
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Units on disk, ascending by version.
    pub fn units(&self) -> Result<Vec<MigrationUnit>, MigrationError> {
        migration_source::discover(&self.migrations_dir)
    }

    /// Apply every pending unit in ascending order and return how many ran.
    ///
    /// Stops at the first failure: earlier units stay committed and later
    /// ones are never attempted.
    pub async fn apply_pending(&self, conn: &DatabaseConnection) -> Result<usize, MigrationError> {
        let units = self.units()?;

        let lock = AdvisoryLock::acquire(conn, self.lock_retries, self.lock_retry_delay).await?;
        let result = self.apply_locked(conn, &units).await;
        unlock(lock, conn, result).await
    }

    /// Revert the most recently applied unit.
    pub async fn rollback_last(
        &self,
        conn: &DatabaseConnection,
    ) -> Result<MigrationRecord, MigrationError> {
        self.rollback(conn, 1)
            .await?
            .pop()
            .ok_or(MigrationError::NothingToRollback)
    }

    /// Revert up to `steps` applied units, newest first.
    pub async fn rollback(
        &self,
        conn: &DatabaseConnection,
        steps: usize,
    ) -> Result<Vec<MigrationRecord>, MigrationError> {
        let units = self.units()?;

        let lock = AdvisoryLock::acquire(conn, self.lock_retries, self.lock_retry_delay).await?;
        let result = self.rollback_locked(conn, &units, steps).await;
        unlock(lock, conn, result).await
    }

    /// Every discovered unit with its application time, plus applied
    /// versions that no longer have a file.
    pub async fn status(
        &self,
        conn: &DatabaseConnection,
    ) -> Result<Vec<MigrationStatus>, MigrationError> {
        let units = self.units()?;

        let manager = SchemaManager::new(conn);
        let mut applied = if manager.has_table(MIGRATIONS_TABLE).await? {
            applied_records(conn).await?
        } else {
            BTreeMap::new()
        };

        let mut status: Vec<MigrationStatus> = units
            .iter()
            .map(|unit| MigrationStatus {
                version: unit.version,
                name: unit.name.clone(),
                applied_at: applied.remove(&unit.version).map(|m| m.applied_at),
            })
            .collect();
        status.extend(applied.into_values().map(|m| MigrationStatus {
            version: m.version,
            name: m.name,
            applied_at: Some(m.applied_at),
        }));
        status.sort_by_key(|s| s.version);

        Ok(status)
    }

    async fn apply_locked(
        &self,
        conn: &DatabaseConnection,
        units: &[MigrationUnit],
    ) -> Result<usize, MigrationError> {
        ensure_table(conn).await?;
        let applied = applied_records(conn).await?;

        for unit in units {
            if let Some(record) = applied.get(&unit.version) {
                if record.checksum != unit.checksum {
                    return Err(MigrationError::ChecksumMismatch {
                        version: unit.version,
                        name: unit.name.clone(),
                    });
                }
            }
        }
        for (version, record) in &applied {
            if !units.iter().any(|u| u.version == *version) {
                tracing::warn!(
                    version,
                    name = %record.name,
                    dir = %self.migrations_dir.display(),
                    "Applied migration has no file"
                );
            }
        }

        let pending: Vec<&MigrationUnit> = units
            .iter()
            .filter(|u| !applied.contains_key(&u.version))
            .collect();

        if let (Some(first), Some(&latest)) = (pending.first(), applied.keys().next_back()) {
            if first.version < latest {
                return Err(MigrationError::OutOfOrder {
                    version: first.version,
                    name: first.name.clone(),
                    latest,
                });
            }
        }

        if pending.is_empty() {
            tracing::info!(applied = applied.len(), "Database schema is up to date");
            return Ok(0);
        }

        tracing::info!(pending = pending.len(), "Applying pending migrations");
        for unit in &pending {
            apply_unit(conn, unit).await?;
        }
        tracing::info!(count = pending.len(), "Migrations applied");

        Ok(pending.len())
    }

    async fn rollback_locked(
        &self,
        conn: &DatabaseConnection,
        units: &[MigrationUnit],
        steps: usize,
    ) -> Result<Vec<MigrationRecord>, MigrationError> {
        ensure_table(conn).await?;

        let newest = SchemaMigrationEntity::find()
            .order_by_desc(Column::Version)
            .limit(steps as u64)
            .all(conn)
            .await?;
        if newest.is_empty() && steps > 0 {
            return Err(MigrationError::NothingToRollback);
        }

        let mut reverted = Vec::with_capacity(newest.len());
        for record in newest {
            if let Err(e) = self.revert_record(conn, units, &record).await {
                if reverted.is_empty() {
                    return Err(e);
                }
                return Err(MigrationError::PartialRollback {
                    reverted,
                    source: Box::new(e),
                });
            }
            reverted.push(MigrationRecord::from(record));
        }

        Ok(reverted)
    }

    async fn revert_record(
        &self,
        conn: &DatabaseConnection,
        units: &[MigrationUnit],
        record: &SchemaMigrationModel,
    ) -> Result<(), MigrationError> {
        let unit = units
            .iter()
            .find(|u| u.version == record.version)
            .ok_or_else(|| MigrationError::MissingUnit {
                version: record.version,
                name: record.name.clone(),
                dir: self.migrations_dir.clone(),
            })?;
        let down = unit
            .down_sql
            .as_deref()
            .ok_or_else(|| MigrationError::MissingDown {
                version: unit.version,
                name: unit.name.clone(),
            })?;

        revert_unit(conn, unit, down).await
    }
}

/// Release `lock`, keeping the operation's error over a release error.
async fn unlock<T>(
    lock: AdvisoryLock,
    conn: &DatabaseConnection,
    result: Result<T, MigrationError>,
) -> Result<T, MigrationError> {
    let released = lock.release(conn).await;
    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), released) => {
            if let Err(release_err) = released {
                tracing::warn!(error = %release_err, "Failed to release migration lock");
            }
            Err(e)
        }
    }
}

async fn ensure_table(conn: &DatabaseConnection) -> Result<(), DbErr> {
    let schema = Schema::new(conn.get_database_backend());
    SchemaManager::new(conn)
        .create_table(
            schema
                .create_table_from_entity(SchemaMigrationEntity)
                .if_not_exists()
                .to_owned(),
        )
        .await
}

async fn applied_records(
    conn: &DatabaseConnection,
) -> Result<BTreeMap<i64, SchemaMigrationModel>, DbErr> {
    Ok(SchemaMigrationEntity::find()
        .all(conn)
        .await?
        .into_iter()
        .map(|m| (m.version, m))
        .collect())
}

async fn apply_unit(conn: &DatabaseConnection, unit: &MigrationUnit) -> Result<(), MigrationError> {
    tracing::info!(migration = %unit.label(), "Applying migration");

    let apply_err = |source: DbErr| MigrationError::Apply {
        version: unit.version,
        name: unit.name.clone(),
        source,
    };

    let txn = conn.begin().await.map_err(apply_err)?;
    let outcome = async {
        txn.execute_unprepared(&unit.up_sql).await?;
        SchemaMigrationEntity::insert(schema_migration::ActiveModel {
            version: Set(unit.version),
            name: Set(unit.name.clone()),
            checksum: Set(unit.checksum.clone()),
            applied_at: Set(Utc::now()),
        })
        .exec_without_returning(&txn)
        .await?;
        Ok::<_, DbErr>(())
    }
    .await;

    match outcome {
        Ok(()) => txn.commit().await.map_err(apply_err),
        Err(source) => {
            if let Err(e) = txn.rollback().await {
                tracing::warn!(version = unit.version, error = %e, "Rollback after failed migration failed");
            }
            tracing::error!(version = unit.version, name = %unit.name, error = %source, "Migration failed");
            Err(apply_err(source))
        }
    }
}

async fn revert_unit(
    conn: &DatabaseConnection,
    unit: &MigrationUnit,
    down_sql: &str,
) -> Result<(), MigrationError> {
    tracing::info!(migration = %unit.label(), "Reverting migration");

    let rollback_err = |source: DbErr| MigrationError::Rollback {
        version: unit.version,
        name: unit.name.clone(),
        source,
    };

    let txn = conn.begin().await.map_err(rollback_err)?;
    let outcome = async {
        txn.execute_unprepared(down_sql).await?;
        SchemaMigrationEntity::delete_by_id(unit.version)
            .exec(&txn)
            .await?;
        Ok::<_, DbErr>(())
    }
    .await;

    match outcome {
        Ok(()) => {
            txn.commit().await.map_err(rollback_err)?;
            tracing::info!(migration = %unit.label(), "Migration reverted");
            Ok(())
        }
        Err(source) => {
            if let Err(e) = txn.rollback().await {
                tracing::warn!(version = unit.version, error = %e, "Rollback of failed revert failed");
            }
            Err(rollback_err(source))
        }
    }
}

/// Brings a database target up to date over its own connection.
#[derive(Debug, Clone)]
pub struct SqlMigrationGate {
    lock_retries: u32,
    lock_retry_delay: Duration,
}

impl SqlMigrationGate {
    pub fn new() -> Self {
        Self {
            lock_retries: DEFAULT_LOCK_RETRIES,
            lock_retry_delay: Duration::from_millis(DEFAULT_LOCK_RETRY_DELAY_MS),
        }
    }
}

impl Default for SqlMigrationGate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MigrationGate for SqlMigrationGate {
    async fn migrate(&self, target: &DependencyTarget) -> Result<usize, MigrationError> {
        let (Some(url), Some(dir)) = (target.database_url(), target.migrations_dir()) else {
            return Err(MigrationError::Discovery(format!(
                "target `{}` is not a database with a migrations directory",
                target.name()
            )));
        };

        let runner =
            MigrationRunner::new(dir).with_lock_options(self.lock_retries, self.lock_retry_delay);
        let db = Database::connect(url).await?;
        let result = runner.apply_pending(db.connection()).await;
        if let Err(e) = db.close().await {
            tracing::warn!(dependency = %target.name(), error = %e, "Failed to close migration connection");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Database as SeaDatabase;
    use std::fs;

    async fn memory_db() -> DatabaseConnection {
        SeaDatabase::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_status_without_bookkeeping_table() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("001_init.up.sql"), "CREATE TABLE a (id INTEGER);").unwrap();
        let conn = memory_db().await;

        let status = MigrationRunner::new(dir.path()).status(&conn).await.unwrap();

        assert_eq!(status.len(), 1);
        assert!(!status[0].is_applied());
        assert!(!SchemaManager::new(&conn).has_table(MIGRATIONS_TABLE).await.unwrap());
    }

    #[tokio::test]
    async fn test_rollback_zero_steps_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let conn = memory_db().await;

        let reverted = MigrationRunner::new(dir.path()).rollback(&conn, 0).await.unwrap();
        assert!(reverted.is_empty());
    }

    #[tokio::test]
    async fn test_gate_migrates_sqlite_file_target() {
        let dir = tempfile::tempdir().unwrap();
        let migrations = dir.path().join("migrations");
        fs::create_dir(&migrations).unwrap();
        fs::write(migrations.join("001_init.up.sql"), "CREATE TABLE a (id INTEGER);").unwrap();

        let db_path = dir.path().join("app.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display())
            .parse()
            .unwrap();
        let target = DependencyTarget::database("db", url).with_migrations(&migrations);

        let gate = SqlMigrationGate::new();
        assert_eq!(gate.migrate(&target).await.unwrap(), 1);
        assert_eq!(gate.migrate(&target).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_gate_rejects_tcp_target() {
        let target = DependencyTarget::tcp("api", "localhost", 80);
        let err = SqlMigrationGate::new().migrate(&target).await.unwrap_err();
        assert!(matches!(err, MigrationError::Discovery(_)));
    }
}
