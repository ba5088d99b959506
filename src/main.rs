//! launchpad - Application entry point
//!
//! CLI-based entry point that dispatches to the individual commands.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use launchpad::{
    cli::{Cli, Commands},
    commands::{self, tasks::Task},
    config::{Config, LogFormat, Manifest, DEFAULT_LOG_LEVEL},
    errors::{AppError, AppResult},
};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration; logging settings come from it when available
    let config = Config::from_env();
    match &config {
        Ok(config) => init_tracing(cli.verbose, &config.log_level, config.log_format),
        Err(_) => init_tracing(cli.verbose, DEFAULT_LOG_LEVEL, LogFormat::Pretty),
    }

    let mut config = match config {
        Ok(config) => config,
        Err(e) => return fail(AppError::from(e)),
    };
    if let Some(path) = cli.manifest {
        config.manifest_path = path.into();
    }
    tracing::debug!(config = ?config, "Configuration loaded");

    // Execute command
    match run(cli.command, &config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => fail(e),
    }
}

async fn run(command: Commands, config: &Config) -> AppResult<u8> {
    let manifest = if command.reads_manifest() {
        Manifest::load(&config.manifest_path)?
    } else {
        None
    };
    let manifest = manifest.as_ref();

    let (task, args) = match command {
        Commands::Install(args) => (Task::Install, args),
        Commands::Format(args) => (Task::Format, args),
        Commands::Lint(args) => (Task::Lint, args),
        Commands::Test(args) => (Task::Test, args),
        Commands::Build(args) => (Task::Build, args),
        Commands::Up(args) => (Task::Up, args),
        Commands::Down(args) => (Task::Down, args),
        Commands::Restart(args) => (Task::Restart, args),
        Commands::Logs(args) => (Task::Logs, args),
        Commands::Dbshell(args) => (Task::Dbshell, args),
        Commands::Migrate(args) => return commands::migrate::execute(args, config).await.map(|_| 0),
        Commands::Rollback(args) => return commands::migrate::rollback(args, config).await.map(|_| 0),
        Commands::Status(args) => return commands::migrate::status(args, config).await.map(|_| 0),
        Commands::Wait(args) => {
            return commands::wait::execute(args, config, manifest).await.map(|_| 0)
        }
        Commands::Start => return commands::start::execute(config, manifest).await.map(|_| 0),
        Commands::Generate(args) => {
            return commands::generate::execute(args, config).await.map(|_| 0)
        }
    };

    commands::tasks::execute(task, &args.args, config, manifest).await
}

fn fail(e: AppError) -> ExitCode {
    tracing::error!(code = e.code(), "Command failed: {}", e);
    ExitCode::from(e.exit_code())
}

/// Initialize tracing subscriber
fn init_tracing(verbose: bool, default_level: &str, format: LogFormat) {
    let filter = if verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string())
    };

    let registry = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(filter));
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}
