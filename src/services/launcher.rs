//! Service launcher - starts services once their preconditions hold.
//!
//! Services start one at a time in dependency order. Each precondition is
//! evaluated at most once per launch. When a precondition fails the launch
//! stops immediately; services already started keep running and are named in
//! the error.

use std::collections::HashSet;
use std::io;
use std::process::ExitStatus;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::select_all;

use super::prober::{HealthProber, ProbePolicy};
use crate::domain::{DependencyTarget, LaunchPlan, Precondition};
use crate::errors::{LaunchError, MigrationError, PreconditionFailure};
use crate::infra::{ProcessSpawner, RunningService};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Brings a database target's schema up to date.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait MigrationGate: Send + Sync {
    /// Apply pending migrations, returning how many were applied.
    async fn migrate(&self, target: &DependencyTarget) -> Result<usize, MigrationError>;
}

pub struct ServiceLauncher {
    prober: HealthProber,
    gate: Arc<dyn MigrationGate>,
    spawner: Arc<dyn ProcessSpawner>,
    policy: ProbePolicy,
}

impl ServiceLauncher {
    pub fn new(
        prober: HealthProber,
        gate: Arc<dyn MigrationGate>,
        spawner: Arc<dyn ProcessSpawner>,
        policy: ProbePolicy,
    ) -> Self {
        Self {
            prober,
            gate,
            spawner,
            policy,
        }
    }

    /// Start every service in `plan`.
    pub async fn launch(&self, plan: &LaunchPlan) -> Result<LaunchReport, LaunchError> {
        let order = plan.start_order()?;
        tracing::info!(services = order.len(), "Launching services");

        let mut satisfied: HashSet<Precondition> = HashSet::new();
        let mut running: Vec<RunningService> = Vec::with_capacity(order.len());

        for service in order {
            for precondition in &service.after {
                if let Err(source) = self
                    .satisfy(plan, precondition, &mut satisfied, &running)
                    .await
                {
                    tracing::error!(
                        service = %service.name,
                        precondition = %precondition,
                        error = %source,
                        "Precondition failed, not starting service"
                    );
                    return Err(LaunchError::PreconditionFailed {
                        service: service.name.clone(),
                        precondition: precondition.to_string(),
                        started: started_names(&running),
                        source,
                    });
                }
            }

            match self.spawner.spawn(service).await {
                Ok(handle) => running.push(handle),
                Err(source) => {
                    tracing::error!(service = %service.name, error = %source, "Failed to spawn service");
                    return Err(LaunchError::Spawn {
                        service: service.name.clone(),
                        started: started_names(&running),
                        source,
                    });
                }
            }
        }

        Ok(LaunchReport { services: running })
    }

    async fn satisfy(
        &self,
        plan: &LaunchPlan,
        precondition: &Precondition,
        satisfied: &mut HashSet<Precondition>,
        running: &[RunningService],
    ) -> Result<(), PreconditionFailure> {
        if satisfied.contains(precondition) {
            return Ok(());
        }

        match precondition {
            Precondition::Ready(name) => self.ensure_ready(plan, name, satisfied).await?,
            Precondition::Migrated(name) => {
                self.ensure_ready(plan, name, satisfied).await?;

                let applied = self.gate.migrate(known_target(plan, name)?).await?;
                tracing::info!(dependency = %name, applied, "Database migrated");
            }
            Precondition::Started(name) => {
                if !running.iter().any(|s| s.name() == name) {
                    return Err(PreconditionFailure::NotStarted(name.clone()));
                }
            }
        }

        satisfied.insert(precondition.clone());
        Ok(())
    }

    async fn ensure_ready(
        &self,
        plan: &LaunchPlan,
        name: &str,
        satisfied: &mut HashSet<Precondition>,
    ) -> Result<(), PreconditionFailure> {
        let ready = Precondition::Ready(name.to_string());
        if !satisfied.contains(&ready) {
            self.prober
                .wait_until_ready(known_target(plan, name)?, &self.policy)
                .await?;
            satisfied.insert(ready);
        }
        Ok(())
    }
}

fn known_target<'a>(
    plan: &'a LaunchPlan,
    name: &str,
) -> Result<&'a DependencyTarget, PreconditionFailure> {
    plan.target(name)
        .ok_or_else(|| PreconditionFailure::UnknownTarget(name.to_string()))
}

fn started_names(running: &[RunningService]) -> Vec<String> {
    running.iter().map(|s| s.name().to_string()).collect()
}

/// Services started by a successful launch, in start order.
#[derive(Debug)]
pub struct LaunchReport {
    services: Vec<RunningService>,
}

impl LaunchReport {
    pub fn started(&self) -> Vec<&str> {
        self.services.iter().map(RunningService::name).collect()
    }

    /// Resolve when the first service exits, with its name and status.
    pub async fn wait_any(&mut self) -> Option<(String, io::Result<ExitStatus>)> {
        if self.services.is_empty() {
            return None;
        }

        let waits = self.services.iter_mut().map(|service| {
            Box::pin(async move {
                let status = service.wait().await;
                (service.name().to_string(), status)
            })
        });
        let (exited, _, _) = select_all(waits).await;
        Some(exited)
    }

    /// Kill every service, newest first.
    pub async fn shutdown(&mut self) {
        for service in self.services.iter_mut().rev() {
            match service.kill().await {
                Ok(()) => tracing::info!(service = %service.name(), "Service stopped"),
                Err(e) => {
                    tracing::warn!(service = %service.name(), error = %e, "Failed to stop service")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ServiceSpec;
    use crate::errors::{ProbeFailure, TimeoutError};
    use crate::infra::{MockProcessSpawner, MockReadinessCheck};
    use std::sync::Mutex;
    use std::time::Duration;

    fn policy() -> ProbePolicy {
        ProbePolicy::new(Duration::from_millis(10), 3).unwrap()
    }

    fn db_target() -> DependencyTarget {
        DependencyTarget::database("db", "postgres://localhost/app".parse().unwrap())
            .with_migrations("migrations")
    }

    fn recording_spawner(log: Arc<Mutex<Vec<String>>>) -> MockProcessSpawner {
        let mut spawner = MockProcessSpawner::new();
        spawner.expect_spawn().returning(move |spec| {
            log.lock().unwrap().push(spec.name.clone());
            Ok(RunningService::detached(&spec.name, None))
        });
        spawner
    }

    fn launcher(
        check: MockReadinessCheck,
        gate: MockMigrationGate,
        spawner: MockProcessSpawner,
    ) -> ServiceLauncher {
        ServiceLauncher::new(
            HealthProber::new(Arc::new(check)),
            Arc::new(gate),
            Arc::new(spawner),
            policy(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_ready_database_blocks_backend() {
        let mut check = MockReadinessCheck::new();
        check
            .expect_check()
            .times(3)
            .returning(|_| Err(ProbeFailure::new("connection refused")));
        let mut gate = MockMigrationGate::new();
        gate.expect_migrate().times(0);
        let mut spawner = MockProcessSpawner::new();
        spawner.expect_spawn().times(0);

        let plan = LaunchPlan::new(
            vec![db_target()],
            vec![ServiceSpec::new("backend", "uvicorn").after(Precondition::Migrated("db".into()))],
        );

        let err = launcher(check, gate, spawner).launch(&plan).await.unwrap_err();

        match err {
            LaunchError::PreconditionFailed {
                service,
                precondition,
                started,
                source: PreconditionFailure::NotReady(TimeoutError { attempts, .. }),
            } => {
                assert_eq!(service, "backend");
                assert_eq!(precondition, "migrated(db)");
                assert!(started.is_empty());
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_preconditions_are_evaluated_once() {
        let mut check = MockReadinessCheck::new();
        check.expect_check().times(1).returning(|_| Ok(()));
        let mut gate = MockMigrationGate::new();
        gate.expect_migrate().times(1).returning(|_| Ok(2));
        let log = Arc::new(Mutex::new(Vec::new()));

        let plan = LaunchPlan::new(
            vec![db_target()],
            vec![
                ServiceSpec::new("backend", "uvicorn").after(Precondition::Migrated("db".into())),
                ServiceSpec::new("worker", "celery")
                    .after(Precondition::Ready("db".into()))
                    .after(Precondition::Migrated("db".into())),
            ],
        );

        let report = launcher(check, gate, recording_spawner(log.clone()))
            .launch(&plan)
            .await
            .unwrap();

        assert_eq!(report.started(), vec!["backend", "worker"]);
        assert_eq!(*log.lock().unwrap(), vec!["backend", "worker"]);
    }

    #[tokio::test]
    async fn test_started_dependencies_start_first() {
        let check = MockReadinessCheck::new();
        let gate = MockMigrationGate::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let plan = LaunchPlan::new(
            vec![],
            vec![
                ServiceSpec::new("frontend", "npm").after(Precondition::Started("backend".into())),
                ServiceSpec::new("backend", "uvicorn"),
            ],
        );

        launcher(check, gate, recording_spawner(log.clone()))
            .launch(&plan)
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["backend", "frontend"]);
    }

    #[tokio::test]
    async fn test_migration_failure_stops_launch_without_teardown() {
        let mut check = MockReadinessCheck::new();
        check.expect_check().returning(|_| Ok(()));
        let mut gate = MockMigrationGate::new();
        gate.expect_migrate()
            .times(1)
            .returning(|_| Err(MigrationError::NothingToRollback));
        let log = Arc::new(Mutex::new(Vec::new()));

        let plan = LaunchPlan::new(
            vec![db_target()],
            vec![
                ServiceSpec::new("cache", "redis-server"),
                ServiceSpec::new("backend", "uvicorn").after(Precondition::Migrated("db".into())),
                ServiceSpec::new("frontend", "npm").after(Precondition::Started("backend".into())),
            ],
        );

        let err = launcher(check, gate, recording_spawner(log.clone()))
            .launch(&plan)
            .await
            .unwrap_err();

        assert_eq!(err.started(), ["cache".to_string()]);
        assert!(matches!(
            err,
            LaunchError::PreconditionFailed {
                source: PreconditionFailure::Migration(_),
                ..
            }
        ));
        assert_eq!(*log.lock().unwrap(), vec!["cache"]);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let check = MockReadinessCheck::new();
        let gate = MockMigrationGate::new();
        let mut spawner = MockProcessSpawner::new();
        spawner
            .expect_spawn()
            .returning(|_| Err(io::Error::new(io::ErrorKind::NotFound, "no such binary")));

        let plan = LaunchPlan::new(vec![], vec![ServiceSpec::new("backend", "missing")]);

        let err = launcher(check, gate, spawner).launch(&plan).await.unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { ref service, .. } if service == "backend"));
    }

    #[tokio::test]
    async fn test_invalid_plan_is_rejected_before_any_side_effect() {
        let mut check = MockReadinessCheck::new();
        check.expect_check().times(0);
        let mut spawner = MockProcessSpawner::new();
        spawner.expect_spawn().times(0);

        let plan = LaunchPlan::new(
            vec![],
            vec![ServiceSpec::new("backend", "uvicorn").after(Precondition::Ready("db".into()))],
        );

        let err = launcher(check, MockMigrationGate::new(), spawner)
            .launch(&plan)
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::InvalidPlan(_)));
    }

    #[tokio::test]
    async fn test_empty_report_has_nothing_to_wait_for() {
        let mut report = LaunchReport { services: vec![] };
        assert!(report.wait_any().await.is_none());
        report.shutdown().await;
    }
}
