//! Passthrough tasks - thin wrappers around external developer tools.
//!
//! Each task resolves to one command line, runs it with inherited stdio and
//! exits with the tool's own status. The manifest's `[tasks]` table replaces
//! the built-in command line of a task; trailing CLI arguments are appended
//! either way.

use std::process::ExitStatus;

use sea_orm::DatabaseBackend;
use tokio::process::Command;

use crate::config::{Config, Manifest, REGISTRY_TOKEN_ENV};
use crate::errors::{AppError, AppResult};

/// Tasks that delegate to an external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Install,
    Format,
    Lint,
    Test,
    Build,
    Up,
    Down,
    Restart,
    Logs,
    Dbshell,
}

impl Task {
    /// Name used for manifest overrides
    pub fn name(&self) -> &'static str {
        match self {
            Task::Install => "install",
            Task::Format => "format",
            Task::Lint => "lint",
            Task::Test => "test",
            Task::Build => "build",
            Task::Up => "up",
            Task::Down => "down",
            Task::Restart => "restart",
            Task::Logs => "logs",
            Task::Dbshell => "dbshell",
        }
    }

    /// Whether the private registry token is handed to the tool.
    fn needs_registry_token(&self) -> bool {
        matches!(self, Task::Install | Task::Build)
    }

    fn default_command(&self, config: &Config) -> TaskCommand {
        let compose = |action: &[&str]| {
            let mut argv = vec![
                "docker".to_string(),
                "compose".to_string(),
                "-f".to_string(),
                config.environment.compose_file().to_string(),
            ];
            argv.extend(action.iter().map(|a| a.to_string()));
            TaskCommand::new(argv)
        };
        let poetry = |args: &[&str]| {
            let mut argv = vec!["poetry".to_string()];
            argv.extend(args.iter().map(|a| a.to_string()));
            TaskCommand::new(argv)
        };

        match self {
            Task::Install => poetry(&["install"]),
            Task::Format => poetry(&["run", "ruff", "format", "."]),
            Task::Lint => poetry(&["run", "ruff", "check", "."]),
            Task::Test => poetry(&["run", "pytest"]),
            Task::Build => compose(&["build"]),
            Task::Up => compose(&["up", "-d"]),
            Task::Down => compose(&["down"]),
            Task::Restart => compose(&["restart"]),
            Task::Logs => compose(&["logs", "-f"]),
            Task::Dbshell => dbshell_command(config),
        }
    }
}

/// A resolved command line plus extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCommand {
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl TaskCommand {
    fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            env: Vec::new(),
        }
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

fn dbshell_command(config: &Config) -> TaskCommand {
    let db = &config.database;
    match db.backend() {
        DatabaseBackend::Postgres => {
            TaskCommand::new(vec!["psql".to_string(), db.as_str().to_string()])
        }
        DatabaseBackend::MySql => {
            let mut argv = vec!["mysql".to_string()];
            if let Some(host) = db.host() {
                argv.extend(["-h".to_string(), host.to_string()]);
            }
            if let Some(port) = db.port() {
                argv.extend(["-P".to_string(), port.to_string()]);
            }
            if let Some(user) = db.user() {
                argv.extend(["-u".to_string(), user.to_string()]);
            }
            argv.extend(db.database());

            let mut command = TaskCommand::new(argv);
            if let Some(password) = db.password() {
                command.env.push(("MYSQL_PWD".to_string(), password.to_string()));
            }
            command
        }
        DatabaseBackend::Sqlite => {
            let mut argv = vec!["sqlite3".to_string()];
            argv.extend(db.database());
            TaskCommand::new(argv)
        }
    }
}

/// Resolve the full command line for `task`.
pub fn resolve(
    task: Task,
    config: &Config,
    manifest: Option<&Manifest>,
    extra_args: &[String],
) -> TaskCommand {
    let mut command = match manifest.and_then(|m| m.task_override(task.name())) {
        Some(argv) => TaskCommand::new(argv.to_vec()),
        None => task.default_command(config),
    };
    command.argv.extend(extra_args.iter().cloned());

    if task.needs_registry_token() {
        if let Some(token) = config.registry_token() {
            command
                .env
                .push((REGISTRY_TOKEN_ENV.to_string(), token.to_string()));
        }
    }

    command
}

/// Run `task` and return the tool's exit code.
pub async fn execute(
    task: Task,
    extra_args: &[String],
    config: &Config,
    manifest: Option<&Manifest>,
) -> AppResult<u8> {
    let command = resolve(task, config, manifest, extra_args);
    tracing::debug!(task = task.name(), program = %command.program(), "Running task");

    let status = Command::new(command.program())
        .args(&command.argv[1..])
        .envs(command.env.iter().map(|(k, v)| (k, v)))
        .status()
        .await
        .map_err(|source| AppError::Task {
            program: command.program().to_string(),
            source,
        })?;

    Ok(exit_code(status))
}

fn exit_code(status: ExitStatus) -> u8 {
    match status.code() {
        Some(code) => u8::try_from(code).unwrap_or(1),
        None => 1,
    }
}
