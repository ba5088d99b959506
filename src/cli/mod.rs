//! CLI module - Command-line interface for the application.
//!
//! Provides commands for:
//! - `install`, `format`, `lint`, `test` - Project tooling passthroughs
//! - `build`, `up`, `down`, `restart`, `logs` - Container stack passthroughs
//! - `dbshell` - Interactive database client
//! - `migrate`, `rollback`, `status` - Database migrations
//! - `wait`, `start` - Readiness probing and service launch
//! - `generate` - Migration scaffolding

pub mod args;

pub use args::{Cli, Commands};
