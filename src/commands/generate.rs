//! Generate command - scaffolding for project components.

use crate::cli::args::{GenerateArgs, GenerateComponent};
use crate::config::Config;
use crate::errors::AppResult;
use crate::utils::templates;

/// Execute the generate command
pub async fn execute(args: GenerateArgs, config: &Config) -> AppResult<()> {
    match args.component {
        GenerateComponent::Migration { name } => {
            tracing::info!("Generating migration: {}", name);
            let (up, down) =
                templates::generate_migration(&config.migrations_dir, &name, chrono::Utc::now())?;
            println!("Created: {}", up.display());
            println!("Created: {}", down.display());
        }
    }

    Ok(())
}
