//! Start command - launch the services declared in the manifest.

use std::sync::Arc;

use crate::config::{Config, Manifest};
use crate::errors::{AppError, AppResult, ConfigError};
use crate::infra::{ConnectionCheck, TokioSpawner};
use crate::services::{HealthProber, ProbePolicy, ServiceLauncher, SqlMigrationGate};

/// Execute the start command
pub async fn execute(config: &Config, manifest: Option<&Manifest>) -> AppResult<()> {
    let manifest = manifest.ok_or_else(|| ConfigError::Io {
        path: config.manifest_path.clone(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "manifest not found"),
    })?;
    let plan = manifest.launch_plan(config)?;
    tracing::debug!(
        services = plan.services().len(),
        targets = plan.targets().len(),
        "Launch plan loaded"
    );

    let launcher = ServiceLauncher::new(
        HealthProber::new(Arc::new(ConnectionCheck::new(config.probe_attempt_timeout))),
        Arc::new(SqlMigrationGate::new()),
        Arc::new(TokioSpawner),
        ProbePolicy::from_config(config)?,
    );

    let mut report = match launcher.launch(&plan).await {
        Ok(report) => report,
        Err(e) => {
            if !e.started().is_empty() {
                tracing::warn!(
                    services = ?e.started(),
                    "Launch aborted; services already started are still running"
                );
            }
            return Err(e.into());
        }
    };

    tracing::info!(services = ?report.started(), "All services started. Press Ctrl+C to stop.");

    // Wait for any service to exit or for Ctrl+C
    let outcome = tokio::select! {
        exited = report.wait_any() => exited,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping services...");
            None
        }
    };

    report.shutdown().await;

    match outcome {
        Some((service, Ok(status))) if status.success() => {
            tracing::info!(service = %service, "Service exited");
            Ok(())
        }
        Some((service, Ok(status))) => Err(AppError::internal(format!(
            "service `{}` exited unexpectedly ({})",
            service, status
        ))),
        Some((service, Err(e))) => Err(AppError::internal(format!(
            "failed to wait for service `{}`: {}",
            service, e
        ))),
        None => Ok(()),
    }
}
