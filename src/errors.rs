//! Centralized error handling.
//!
//! Each orchestration stage has its own error type so callers can match on
//! the failing stage; `AppError` folds them together for the CLI and maps
//! every variant to a stable code and process exit status.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::MigrationRecord;

/// A dependency never reported ready within its probe budget.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "dependency `{target}` not ready after {attempts} attempt(s){}",
    timeout_detail(.deadline_exceeded, .last_error)
)]
pub struct TimeoutError {
    pub target: String,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub deadline_exceeded: bool,
}

fn timeout_detail(deadline_exceeded: &bool, last_error: &Option<String>) -> String {
    let mut detail = String::new();
    if *deadline_exceeded {
        detail.push_str(" (deadline exceeded)");
    }
    if let Some(e) = last_error {
        detail.push_str(": ");
        detail.push_str(e);
    }
    detail
}

/// A single readiness check came back negative.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ProbeFailure(pub String);

impl ProbeFailure {
    pub fn new(msg: impl Into<String>) -> Self {
        ProbeFailure(msg.into())
    }
}

/// A schema-change unit failed to apply or roll back, or the migration set
/// on disk is inconsistent with the database.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("failed to read migrations from {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid migration set: {0}")]
    Discovery(String),

    #[error("migration {version}_{name} failed to apply: {source}")]
    Apply {
        version: i64,
        name: String,
        #[source]
        source: sea_orm::DbErr,
    },

    #[error("migration {version}_{name} failed to roll back: {source}")]
    Rollback {
        version: i64,
        name: String,
        #[source]
        source: sea_orm::DbErr,
    },

    #[error("migration {version}_{name} has no down script")]
    MissingDown { version: i64, name: String },

    #[error("applied migration {version} ({name}) has no unit in {}", .dir.display())]
    MissingUnit {
        version: i64,
        name: String,
        dir: PathBuf,
    },

    #[error("no applied migrations to roll back")]
    NothingToRollback,

    #[error("rolled back {} migration(s), then {source}", .reverted.len())]
    PartialRollback {
        reverted: Vec<MigrationRecord>,
        #[source]
        source: Box<MigrationError>,
    },

    #[error("applied migration {version}_{name} was modified after it was applied")]
    ChecksumMismatch { version: i64, name: String },

    #[error("migration {version}_{name} is older than the latest applied migration {latest}")]
    OutOfOrder {
        version: i64,
        name: String,
        latest: i64,
    },

    #[error("could not acquire migration lock after {attempts} attempt(s)")]
    LockUnavailable { attempts: u32 },

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl MigrationError {
    /// Version of the unit this error is about, if any.
    pub fn version(&self) -> Option<i64> {
        match self {
            MigrationError::Apply { version, .. }
            | MigrationError::Rollback { version, .. }
            | MigrationError::MissingDown { version, .. }
            | MigrationError::MissingUnit { version, .. }
            | MigrationError::ChecksumMismatch { version, .. }
            | MigrationError::OutOfOrder { version, .. } => Some(*version),
            MigrationError::PartialRollback { source, .. } => source.version(),
            _ => None,
        }
    }
}

/// Why a service precondition could not be satisfied.
#[derive(Error, Debug)]
pub enum PreconditionFailure {
    #[error(transparent)]
    NotReady(#[from] TimeoutError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("service `{0}` has not been started")]
    NotStarted(String),

    #[error("unknown target `{0}`")]
    UnknownTarget(String),
}

/// A service failed to start or one of its preconditions failed.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("invalid launch plan: {0}")]
    InvalidPlan(String),

    #[error("service `{service}` not started: precondition `{precondition}` failed: {source}")]
    PreconditionFailed {
        service: String,
        precondition: String,
        /// Services already running when the failure occurred
        started: Vec<String>,
        #[source]
        source: PreconditionFailure,
    },

    #[error("service `{service}` failed to start: {source}")]
    Spawn {
        service: String,
        started: Vec<String>,
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    /// Services left running when the launch failed.
    pub fn started(&self) -> &[String] {
        match self {
            LaunchError::InvalidPlan(_) => &[],
            LaunchError::PreconditionFailed { started, .. } | LaunchError::Spawn { started, .. } => {
                started
            }
        }
    }
}

/// Configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("failed to run `{program}`: {source}")]
    Task {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Stable identifier for logs and scripts
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Timeout(_) => "TIMEOUT_ERROR",
            AppError::Migration(_) => "MIGRATION_ERROR",
            AppError::Launch(_) => "LAUNCH_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Task { .. } => "TASK_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Process exit status for the CLI
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) => 2,
            AppError::Timeout(_) => 3,
            AppError::Migration(_) => 4,
            AppError::Launch(_) => 5,
            AppError::Database(_) | AppError::Task { .. } | AppError::Internal(_) => 1,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;
