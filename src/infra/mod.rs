//! Infrastructure layer - External systems integration
//!
//! Everything that touches the outside world lives here:
//! - Database connections, bookkeeping entity and advisory lock
//! - Migration unit discovery on disk
//! - TCP and database readiness checks
//! - Child process spawning

pub mod checks;
pub mod db;
pub mod migration_source;
pub mod process;

pub use checks::{ConnectionCheck, ReadinessCheck};
pub use db::{AdvisoryLock, Database};
pub use process::{ProcessSpawner, RunningService, TokioSpawner};

#[cfg(any(test, feature = "test-utils"))]
pub use checks::MockReadinessCheck;
#[cfg(any(test, feature = "test-utils"))]
pub use process::MockProcessSpawner;
