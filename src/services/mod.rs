//! Application services layer - Orchestration use cases.
//!
//! Services combine domain rules with infrastructure behind traits so each
//! stage can be exercised with mocks:
//! - `HealthProber` waits for dependency targets
//! - `MigrationRunner` applies and reverts schema units
//! - `ServiceLauncher` starts services in dependency order

pub mod launcher;
pub mod migration_runner;
pub mod prober;

pub use launcher::{LaunchReport, MigrationGate, ServiceLauncher};
pub use migration_runner::{MigrationRunner, SqlMigrationGate};
pub use prober::{HealthProber, ProbePolicy, ProbeState};

#[cfg(any(test, feature = "test-utils"))]
pub use launcher::MockMigrationGate;
