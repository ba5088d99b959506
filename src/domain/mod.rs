//! Domain layer - Core orchestration concepts
//!
//! Dependency targets, migration units/records and launch plans.
//! Nothing here performs I/O.

pub mod migration;
pub mod plan;
pub mod target;

pub use migration::{MigrationRecord, MigrationStatus, MigrationUnit};
pub use plan::{LaunchPlan, Precondition, ServiceSpec};
pub use target::{DependencyTarget, Endpoint};
