//! Launch manifest (`launchpad.toml`).
//!
//! Declares dependency targets, services and task overrides. Values may
//! reference environment variables as `${VAR}` or `${VAR:-default}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;

use super::database_url::DatabaseUrl;
use super::settings::Config;
use crate::domain::{DependencyTarget, LaunchPlan, ServiceSpec};
use crate::errors::ConfigError;

static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid env var pattern")
});

/// Parsed manifest file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
    /// Task name -> replacement command line
    #[serde(default)]
    pub tasks: BTreeMap<String, Vec<String>>,
}

/// A `[[targets]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct TargetSpec {
    pub name: String,
    #[serde(flatten)]
    pub endpoint: EndpointSpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndpointSpec {
    Tcp {
        host: String,
        port: u16,
    },
    Database {
        /// Falls back to the configured DATABASE_URL
        url: Option<String>,
        /// Falls back to MIGRATIONS_DIR
        migrations: Option<PathBuf>,
    },
}

impl Manifest {
    /// Load the manifest at `path`; `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No manifest found");
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let manifest = Self::from_toml_str(&content, |key| std::env::var(key).ok()).map_err(
            |message| ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
        )?;

        tracing::debug!(
            path = %path.display(),
            targets = manifest.targets.len(),
            services = manifest.services.len(),
            "Manifest loaded"
        );
        Ok(Some(manifest))
    }

    /// Parse manifest text, substituting variables through `lookup`.
    pub fn from_toml_str<F>(content: &str, lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let processed = substitute_env_vars(content, lookup);
        toml::from_str(&processed).map_err(|e| e.to_string())
    }

    /// Resolve target specs against the loaded configuration.
    pub fn resolve_targets(&self, config: &Config) -> Result<Vec<DependencyTarget>, ConfigError> {
        self.targets
            .iter()
            .map(|spec| match &spec.endpoint {
                EndpointSpec::Tcp { host, port } => {
                    Ok(DependencyTarget::tcp(&spec.name, host, *port))
                }
                EndpointSpec::Database { url, migrations } => {
                    let url = match url {
                        Some(raw) => raw.parse::<DatabaseUrl>().map_err(|e| {
                            ConfigError::invalid(format!("targets.{}.url", spec.name), e.to_string())
                        })?,
                        None => config.database.clone(),
                    };
                    let migrations = migrations
                        .clone()
                        .unwrap_or_else(|| config.migrations_dir.clone());
                    Ok(DependencyTarget::database(&spec.name, url).with_migrations(migrations))
                }
            })
            .collect()
    }

    /// Build the launch plan described by this manifest.
    pub fn launch_plan(&self, config: &Config) -> Result<LaunchPlan, ConfigError> {
        Ok(LaunchPlan::new(
            self.resolve_targets(config)?,
            self.services.clone(),
        ))
    }

    /// Command line overriding the built-in one for `task`.
    pub fn task_override(&self, task: &str) -> Option<&[String]> {
        self.tasks
            .get(task)
            .map(Vec::as_slice)
            .filter(|argv| !argv.is_empty())
    }
}

/// Replace `${VAR}` / `${VAR:-default}`; unknown variables without a
/// default are left untouched.
fn substitute_env_vars<F>(content: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_VAR_PATTERN
        .replace_all(content, |caps: &Captures| {
            let name = &caps[1];
            match (lookup(name), caps.get(2)) {
                (Some(value), _) => value,
                (None, Some(default)) => default.as_str().to_string(),
                (None, None) => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::domain::{Endpoint, Precondition};

    const MANIFEST: &str = r#"
[[targets]]
name = "db"
kind = "database"

[[targets]]
name = "backend-http"
kind = "tcp"
host = "${BACKEND_HOST:-127.0.0.1}"
port = 8080

[[services]]
name = "backend"
command = "uvicorn"
args = ["src.entrypoints.main:app", "--port", "8080"]
env = { ENV = "${APP_ENV}" }
after = [{ migrated = "db" }]

[[services]]
name = "proxy"
command = "nginx"
args = ["-g", "daemon off;"]
after = [{ started = "backend" }, { ready = "backend-http" }]

[tasks]
lint = ["cargo", "clippy"]
"#;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_toml_str(MANIFEST, lookup(&[("APP_ENV", "staging")])).unwrap();

        assert_eq!(manifest.targets.len(), 2);
        assert_eq!(manifest.services.len(), 2);
        assert_eq!(manifest.services[0].env.get("ENV").map(String::as_str), Some("staging"));
        assert_eq!(
            manifest.services[1].after,
            vec![
                Precondition::Started("backend".to_string()),
                Precondition::Ready("backend-http".to_string()),
            ]
        );
        assert_eq!(
            manifest.task_override("lint"),
            Some(&["cargo".to_string(), "clippy".to_string()][..])
        );
        assert_eq!(manifest.task_override("test"), None);
    }

    #[test]
    fn test_substitution_defaults_and_unknowns() {
        let vars = lookup(&[("HOST", "db.internal")]);
        assert_eq!(substitute_env_vars("${HOST}:${PORT:-5432}", &vars), "db.internal:5432");
        assert_eq!(substitute_env_vars("${MISSING}", &vars), "${MISSING}");
    }

    #[test]
    fn test_resolve_targets_uses_config_defaults() {
        let manifest = Manifest::from_toml_str(MANIFEST, lookup(&[])).unwrap();
        let config = Config::from_lookup(|_| None).unwrap();

        let targets = manifest.resolve_targets(&config).unwrap();
        assert_eq!(targets[0].database_url(), Some(&config.database));
        assert_eq!(targets[0].migrations_dir(), Some(config.migrations_dir.as_path()));
        assert_eq!(
            targets[1].endpoint(),
            &Endpoint::Tcp {
                host: "127.0.0.1".to_string(),
                port: 8080
            }
        );

        let plan = manifest.launch_plan(&config).unwrap();
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = Manifest::from_toml_str("[[servces]]\nname = \"x\"\n", lookup(&[]));
        assert!(err.is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Manifest::load(&dir.path().join("launchpad.toml")).unwrap();
        assert!(loaded.is_none());
    }
}
