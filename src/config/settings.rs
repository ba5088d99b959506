//! Application settings loaded from environment variables.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::constants::{
    COMPOSE_FILE_DEV, COMPOSE_FILE_STAGING, DEFAULT_DATABASE_URL, DEFAULT_ENVIRONMENT,
    DEFAULT_LOG_LEVEL, DEFAULT_MANIFEST_PATH, DEFAULT_MIGRATIONS_DIR,
    DEFAULT_PROBE_ATTEMPT_TIMEOUT_MS, DEFAULT_PROBE_INTERVAL_MS, DEFAULT_PROBE_MAX_RETRIES,
    DEFAULT_POSTGRES_PORT,
};
use super::database_url::DatabaseUrl;
use crate::errors::ConfigError;

/// Deployment environment discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
}

impl Environment {
    /// Compose manifest describing this environment's stack
    pub fn compose_file(&self) -> &'static str {
        match self {
            Environment::Dev => COMPOSE_FILE_DEV,
            Environment::Staging => COMPOSE_FILE_STAGING,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" | "local" => Ok(Environment::Dev),
            "staging" | "stage" => Ok(Environment::Staging),
            other => Err(ConfigError::invalid(
                "APP_ENV",
                format!("expected `dev` or `staging`, got `{}`", other),
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration
#[derive(Clone)]
pub struct Config {
    pub environment: Environment,
    pub database: DatabaseUrl,
    registry_token: Option<String>,
    pub migrations_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub probe_interval: Duration,
    pub probe_max_retries: u32,
    pub probe_attempt_timeout: Duration,
    pub probe_deadline: Option<Duration>,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("environment", &self.environment)
            .field("database", &self.database)
            .field("registry_token", &self.registry_token.as_ref().map(|_| "[REDACTED]"))
            .field("migrations_dir", &self.migrations_dir)
            .field("manifest_path", &self.manifest_path)
            .field("probe_interval", &self.probe_interval)
            .field("probe_max_retries", &self.probe_max_retries)
            .field("probe_attempt_timeout", &self.probe_attempt_timeout)
            .field("probe_deadline", &self.probe_deadline)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = var("APP_ENV")
            .or_else(|| var("ENV"))
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
            .parse()?;

        let database = match var("DATABASE_URL") {
            Some(url) => url.parse()?,
            None => match var("DB_HOST") {
                Some(host) => DatabaseUrl::from_parts(
                    &host,
                    parse_var(&var, "DB_PORT")?.unwrap_or(DEFAULT_POSTGRES_PORT),
                    &var("DB_USER").unwrap_or_else(|| "postgres".to_string()),
                    var("DB_PASSWORD").as_deref(),
                    &var("DB_NAME").unwrap_or_else(|| "app".to_string()),
                    var("DB_SSLMODE").as_deref(),
                )?,
                None => DEFAULT_DATABASE_URL.parse()?,
            },
        };

        let probe_interval_ms: u64 =
            parse_var(&var, "PROBE_INTERVAL_MS")?.unwrap_or(DEFAULT_PROBE_INTERVAL_MS);
        if probe_interval_ms == 0 {
            return Err(ConfigError::invalid("PROBE_INTERVAL_MS", "must be greater than zero"));
        }

        let probe_max_retries: u32 =
            parse_var(&var, "PROBE_MAX_RETRIES")?.unwrap_or(DEFAULT_PROBE_MAX_RETRIES);
        if probe_max_retries == 0 {
            return Err(ConfigError::invalid("PROBE_MAX_RETRIES", "must be at least 1"));
        }

        let log_format = match var("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            None => LogFormat::Pretty,
            Some(f) if f == "pretty" || f == "text" => LogFormat::Pretty,
            Some(f) if f == "json" => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::invalid(
                    "LOG_FORMAT",
                    format!("expected `pretty` or `json`, got `{}`", other),
                ))
            }
        };

        Ok(Self {
            environment,
            database,
            registry_token: var("REGISTRY_TOKEN"),
            migrations_dir: var("MIGRATIONS_DIR")
                .unwrap_or_else(|| DEFAULT_MIGRATIONS_DIR.to_string())
                .into(),
            manifest_path: var("LAUNCHPAD_MANIFEST")
                .unwrap_or_else(|| DEFAULT_MANIFEST_PATH.to_string())
                .into(),
            probe_interval: Duration::from_millis(probe_interval_ms),
            probe_max_retries,
            probe_attempt_timeout: Duration::from_millis(
                parse_var(&var, "PROBE_ATTEMPT_TIMEOUT_MS")?
                    .unwrap_or(DEFAULT_PROBE_ATTEMPT_TIMEOUT_MS),
            ),
            probe_deadline: parse_var(&var, "PROBE_DEADLINE_SECS")?.map(Duration::from_secs),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_format,
        })
    }

    /// Token for the private package registry, if configured.
    pub fn registry_token(&self) -> Option<&str> {
        self.registry_token.as_deref()
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string()))
        })
        .transpose()
}
