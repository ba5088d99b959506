//! Lock serializing migration runs.
//!
//! PostgreSQL and MySQL provide session-level cooperative locks. SQLite has
//! none, and its file lock only spans one transaction, so there the lock is a
//! single row in `launchpad_migration_lock` that is inserted on acquire and
//! deleted on release. A run that dies while holding it leaves the row
//! behind; delete it by hand once no runner is active.

use std::time::Duration;

use chrono::Utc;
use sea_orm::{ConnectionTrait, DatabaseBackend, DbErr, Statement, Value};
use tokio::time::sleep;

use crate::config::{MIGRATION_LOCK_KEY, MIGRATION_LOCK_NAME, MIGRATION_LOCK_TABLE};
use crate::errors::MigrationError;

/// A held migration lock. Must be released on the same connection.
#[derive(Debug)]
#[must_use = "the lock is held until `release` is called"]
pub struct AdvisoryLock {
    backend: DatabaseBackend,
}

impl AdvisoryLock {
    /// Acquire the lock, polling up to `max_retries` more times.
    pub async fn acquire<C>(
        conn: &C,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Result<Self, MigrationError>
    where
        C: ConnectionTrait,
    {
        let backend = conn.get_database_backend();
        if backend == DatabaseBackend::Sqlite {
            ensure_lock_table(conn).await?;
        }

        for attempt in 0..=max_retries {
            if Self::try_acquire(conn, backend).await? {
                tracing::debug!(backend = ?backend, attempt, "Migration lock acquired");
                return Ok(Self { backend });
            }

            if attempt == 0 {
                tracing::info!("Another migration run holds the lock, waiting...");
            }
            if attempt < max_retries {
                sleep(retry_delay).await;
            }
        }

        tracing::warn!(attempts = max_retries + 1, "Failed to acquire migration lock");
        Err(MigrationError::LockUnavailable {
            attempts: max_retries + 1,
        })
    }

    async fn try_acquire<C>(conn: &C, backend: DatabaseBackend) -> Result<bool, DbErr>
    where
        C: ConnectionTrait,
    {
        let statement = match backend {
            DatabaseBackend::Postgres => Statement::from_sql_and_values(
                backend,
                "SELECT pg_try_advisory_lock($1) AS locked",
                [Value::from(MIGRATION_LOCK_KEY)],
            ),
            DatabaseBackend::MySql => Statement::from_sql_and_values(
                backend,
                "SELECT GET_LOCK(?, 0) AS locked",
                [Value::from(MIGRATION_LOCK_NAME)],
            ),
            DatabaseBackend::Sqlite => {
                // Read first so waiters never take a write lock while the holder migrates.
                let held = conn
                    .query_one(Statement::from_string(
                        backend,
                        format!("SELECT COUNT(*) AS held FROM {}", MIGRATION_LOCK_TABLE),
                    ))
                    .await?
                    .map(|row| row.try_get::<i64>("", "held"))
                    .transpose()?
                    .unwrap_or(0);
                if held > 0 {
                    return Ok(false);
                }

                let inserted = conn
                    .execute(Statement::from_sql_and_values(
                        backend,
                        format!(
                            "INSERT OR IGNORE INTO {} (id, acquired_at) VALUES (1, ?)",
                            MIGRATION_LOCK_TABLE
                        ),
                        [Value::from(Utc::now().to_rfc3339())],
                    ))
                    .await?;
                return Ok(inserted.rows_affected() == 1);
            }
        };

        let row = conn
            .query_one(statement)
            .await?
            .ok_or_else(|| DbErr::Custom("lock query returned no row".to_string()))?;

        match backend {
            DatabaseBackend::Postgres => row.try_get::<bool>("", "locked"),
            _ => Ok(row.try_get::<Option<i64>>("", "locked")? == Some(1)),
        }
    }

    /// Release the lock.
    pub async fn release<C>(self, conn: &C) -> Result<(), DbErr>
    where
        C: ConnectionTrait,
    {
        let statement = match self.backend {
            DatabaseBackend::Postgres => Statement::from_sql_and_values(
                self.backend,
                "SELECT pg_advisory_unlock($1) AS released",
                [Value::from(MIGRATION_LOCK_KEY)],
            ),
            DatabaseBackend::MySql => Statement::from_sql_and_values(
                self.backend,
                "SELECT RELEASE_LOCK(?) AS released",
                [Value::from(MIGRATION_LOCK_NAME)],
            ),
            DatabaseBackend::Sqlite => {
                conn.execute_unprepared(&format!(
                    "DELETE FROM {} WHERE id = 1",
                    MIGRATION_LOCK_TABLE
                ))
                .await?;
                tracing::debug!("Migration lock released");
                return Ok(());
            }
        };

        conn.query_one(statement).await?;
        tracing::debug!("Migration lock released");
        Ok(())
    }
}

async fn ensure_lock_table<C>(conn: &C) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    conn.execute_unprepared(&format!(
        "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY CHECK (id = 1), acquired_at TEXT NOT NULL)",
        MIGRATION_LOCK_TABLE
    ))
    .await?;
    Ok(())
}
