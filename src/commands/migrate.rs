//! Migrate commands - apply, revert and inspect database migrations.

use std::sync::Arc;

use crate::cli::args::{MigrateArgs, RollbackArgs, StatusArgs};
use crate::config::{Config, DEFAULT_DATABASE_TARGET};
use crate::domain::{DependencyTarget, MigrationRecord};
use crate::errors::{AppError, AppResult, MigrationError};
use crate::infra::{ConnectionCheck, Database};
use crate::services::{HealthProber, MigrationRunner, ProbePolicy};

/// Execute the migrate command
pub async fn execute(args: MigrateArgs, config: &Config) -> AppResult<()> {
    let db = connect(config, args.no_wait).await?;
    let runner = MigrationRunner::new(&config.migrations_dir);

    let result = runner.apply_pending(db.connection()).await;
    close(db).await;

    let applied = result?;
    if applied == 0 {
        println!("Nothing to migrate");
    } else {
        println!("Applied {} migration(s)", applied);
    }
    Ok(())
}

/// Execute the rollback command
pub async fn rollback(args: RollbackArgs, config: &Config) -> AppResult<()> {
    let db = connect(config, args.no_wait).await?;
    let runner = MigrationRunner::new(&config.migrations_dir);

    let result = if args.steps == 1 {
        runner.rollback_last(db.connection()).await.map(|r| vec![r])
    } else {
        runner.rollback(db.connection(), args.steps).await
    };
    close(db).await;

    match result {
        Ok(reverted) => {
            print_reverted(&reverted);
            Ok(())
        }
        Err(MigrationError::PartialRollback { reverted, source }) => {
            print_reverted(&reverted);
            Err((*source).into())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_reverted(records: &[MigrationRecord]) {
    for record in records {
        println!("Reverted {}_{}", record.version, record.name);
    }
}

/// Execute the status command
pub async fn status(args: StatusArgs, config: &Config) -> AppResult<()> {
    let db = connect(config, args.no_wait).await?;
    let runner = MigrationRunner::new(&config.migrations_dir);

    let result = runner.status(db.connection()).await;
    close(db).await;
    let status = result?;

    if args.json {
        let json = serde_json::to_string_pretty(&status)
            .map_err(|e| AppError::internal(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    if status.is_empty() {
        println!("No migrations found in {}", config.migrations_dir.display());
    }
    for entry in status {
        match entry.applied_at {
            Some(at) => println!("{:>16}  {:<40} applied {}", entry.version, entry.name, at.to_rfc3339()),
            None => println!("{:>16}  {:<40} pending", entry.version, entry.name),
        }
    }
    Ok(())
}

/// Wait for the configured database (unless told not to) and open the
/// connection the runner will own.
async fn connect(config: &Config, no_wait: bool) -> AppResult<Database> {
    if !no_wait {
        let target = DependencyTarget::database(DEFAULT_DATABASE_TARGET, config.database.clone());
        let prober = HealthProber::new(Arc::new(ConnectionCheck::new(config.probe_attempt_timeout)));
        prober
            .wait_until_ready(&target, &ProbePolicy::from_config(config)?)
            .await?;
    }

    tracing::info!(database = %config.database, "Connecting to database...");
    Ok(Database::connect(&config.database).await?)
}

async fn close(db: Database) {
    if let Err(e) = db.close().await {
        tracing::warn!(error = %e, "Failed to close database connection");
    }
}
