//! launchpad - readiness-gated startup orchestration
//!
//! Waits for dependencies (databases, TCP services) to accept connections,
//! brings database schemas up to date with versioned SQL migrations, and
//! launches long-running services in dependency order. A thin task runner
//! wraps the project's everyday tooling.
//!
//! # Architecture Layers
//!
//! - **cli**: Command-line interface
//! - **commands**: CLI command implementations
//! - **config**: Environment configuration, launch manifest and constants
//! - **domain**: Targets, migration units and launch plans
//! - **services**: Health prober, migration runner and service launcher
//! - **infra**: Database, readiness checks and process spawning
//! - **utils**: Templates for generated files
//! - **errors**: Centralized error handling
//!
//! # CLI Usage
//!
//! ```bash
//! # Wait for the database, then apply pending migrations
//! launchpad migrate
//!
//! # Revert the last two migrations
//! launchpad rollback --steps 2
//!
//! # Launch everything declared in launchpad.toml
//! launchpad start
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod infra;
pub mod services;
pub mod utils;

// Re-export commonly used types at crate root
pub use config::Config;
pub use domain::{DependencyTarget, LaunchPlan, MigrationUnit, Precondition, ServiceSpec};
pub use errors::{AppError, AppResult, LaunchError, MigrationError, TimeoutError};
pub use services::{HealthProber, MigrationRunner, ProbePolicy, ServiceLauncher};
