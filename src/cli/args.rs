//! CLI argument definitions.
//!
//! Uses clap derive macros for type-safe argument parsing.

use clap::{Args, Parser, Subcommand};

/// launchpad - probe dependencies, run migrations, launch services
#[derive(Parser, Debug)]
#[command(name = "launchpad")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Launch manifest path
    #[arg(short, long, global = true, env = "LAUNCHPAD_MANIFEST")]
    pub manifest: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install project dependencies
    Install(PassthroughArgs),

    /// Format the code base
    Format(PassthroughArgs),

    /// Run the linter
    Lint(PassthroughArgs),

    /// Run the test suite
    Test(PassthroughArgs),

    /// Build container images
    Build(PassthroughArgs),

    /// Start the container stack
    Up(PassthroughArgs),

    /// Stop the container stack
    Down(PassthroughArgs),

    /// Restart the container stack
    Restart(PassthroughArgs),

    /// Follow container logs
    Logs(PassthroughArgs),

    /// Open an interactive database shell
    Dbshell(PassthroughArgs),

    /// Apply pending migrations
    Migrate(MigrateArgs),

    /// Revert applied migrations
    Rollback(RollbackArgs),

    /// Show migration status
    Status(StatusArgs),

    /// Wait until a dependency is ready
    Wait(WaitArgs),

    /// Launch the services declared in the manifest
    Start,

    /// Generate project components
    Generate(GenerateArgs),
}

impl Commands {
    /// Whether the command reads `launchpad.toml`.
    pub fn reads_manifest(&self) -> bool {
        match self {
            Commands::Migrate(_)
            | Commands::Rollback(_)
            | Commands::Status(_)
            | Commands::Generate(_) => false,
            Commands::Wait(args) => args.target.is_some(),
            _ => true,
        }
    }
}

/// Extra arguments forwarded verbatim to the wrapped tool
#[derive(Args, Debug, Default)]
pub struct PassthroughArgs {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Arguments for the migrate command
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Skip waiting for the database to become ready
    #[arg(long)]
    pub no_wait: bool,
}

/// Arguments for the rollback command
#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// Number of migrations to revert
    #[arg(short, long, default_value_t = 1)]
    pub steps: usize,

    /// Skip waiting for the database to become ready
    #[arg(long)]
    pub no_wait: bool,
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print status as JSON
    #[arg(long)]
    pub json: bool,

    /// Skip waiting for the database to become ready
    #[arg(long)]
    pub no_wait: bool,
}

/// Arguments for the wait command
#[derive(Args, Debug)]
pub struct WaitArgs {
    /// Manifest target to wait for (defaults to the configured database)
    #[arg(short, long)]
    pub target: Option<String>,
}

/// Arguments for the generate command
#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[command(subcommand)]
    pub component: GenerateComponent,
}

/// Components that can be generated
#[derive(Subcommand, Debug)]
pub enum GenerateComponent {
    /// Generate an empty up/down migration pair
    Migration {
        /// Migration name (e.g., "create_orders_table")
        name: String,
    },
}
