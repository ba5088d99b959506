//! Wait command - block until a dependency is ready.

use std::sync::Arc;

use crate::cli::args::WaitArgs;
use crate::config::{Config, Manifest, DEFAULT_DATABASE_TARGET};
use crate::domain::DependencyTarget;
use crate::errors::{AppResult, ConfigError};
use crate::infra::ConnectionCheck;
use crate::services::{HealthProber, ProbePolicy};

/// Execute the wait command
pub async fn execute(args: WaitArgs, config: &Config, manifest: Option<&Manifest>) -> AppResult<()> {
    let target = select_target(args.target.as_deref(), config, manifest)?;

    let prober = HealthProber::new(Arc::new(ConnectionCheck::new(config.probe_attempt_timeout)));
    let attempts = prober
        .wait_until_ready(&target, &ProbePolicy::from_config(config)?)
        .await?;

    println!("{} is ready ({} attempt(s))", target.name(), attempts);
    Ok(())
}

/// The named manifest target, or the configured database.
fn select_target(
    name: Option<&str>,
    config: &Config,
    manifest: Option<&Manifest>,
) -> Result<DependencyTarget, ConfigError> {
    let default_db = || DependencyTarget::database(DEFAULT_DATABASE_TARGET, config.database.clone());

    let Some(name) = name else {
        return Ok(default_db());
    };

    let targets = match manifest {
        Some(manifest) => manifest.resolve_targets(config)?,
        None => Vec::new(),
    };
    match targets.into_iter().find(|t| t.name() == name) {
        Some(target) => Ok(target),
        None if name == DEFAULT_DATABASE_TARGET => Ok(default_db()),
        None => Err(ConfigError::invalid("--target", format!("unknown target `{}`", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::from_lookup(|_: &str| None).unwrap()
    }

    #[test]
    fn test_defaults_to_configured_database() {
        let config = config();
        let target = select_target(None, &config, None).unwrap();
        assert_eq!(target.name(), "db");
        assert_eq!(target.database_url(), Some(&config.database));

        assert!(select_target(Some("db"), &config, None).is_ok());
    }

    #[test]
    fn test_named_manifest_target() {
        let config = config();
        let manifest = Manifest::from_toml_str(
            "[[targets]]\nname = \"cache\"\nkind = \"tcp\"\nhost = \"localhost\"\nport = 6379\n",
            |_| None,
        )
        .unwrap();

        let target = select_target(Some("cache"), &config, Some(&manifest)).unwrap();
        assert_eq!(target.address(), "localhost:6379");

        assert!(select_target(Some("queue"), &config, Some(&manifest)).is_err());
    }
}
