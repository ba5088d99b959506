//! Database connection strings.
//!
//! `DatabaseUrl` validates a `DATABASE_URL`-shaped string once at startup and
//! exposes its parts (scheme, credentials, host, port, database, SSL mode).
//! Formatting never prints the password.

use std::fmt;
use std::str::FromStr;

use sea_orm::DatabaseBackend;
use url::Url;

use super::constants::DEFAULT_POSTGRES_PORT;
use crate::errors::ConfigError;

/// A parsed, validated database connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseUrl {
    url: Url,
    backend: DatabaseBackend,
}

impl DatabaseUrl {
    /// Compose a PostgreSQL URL from individual settings.
    pub fn from_parts(
        host: &str,
        port: u16,
        user: &str,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let mut url = Url::parse(&format!("postgres://{}:{}/{}", host, port, database))
            .map_err(|e| ConfigError::invalid("DB_HOST", e.to_string()))?;

        url.set_username(user)
            .map_err(|_| ConfigError::invalid("DB_USER", "cannot be set on this URL"))?;
        if let Some(password) = password {
            url.set_password(Some(password))
                .map_err(|_| ConfigError::invalid("DB_PASSWORD", "cannot be set on this URL"))?;
        }
        if let Some(mode) = ssl_mode {
            url.query_pairs_mut().append_pair("sslmode", mode);
        }

        Ok(Self {
            url,
            backend: DatabaseBackend::Postgres,
        })
    }

    /// Full connection string, including credentials.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn user(&self) -> Option<&str> {
        Some(self.url.username()).filter(|u| !u.is_empty())
    }

    pub fn password(&self) -> Option<&str> {
        self.url.password()
    }

    pub fn host(&self) -> Option<&str> {
        match self.backend {
            DatabaseBackend::Sqlite => None,
            _ => self.url.host_str(),
        }
    }

    /// Port, falling back to the engine's well-known port.
    pub fn port(&self) -> Option<u16> {
        match self.backend {
            DatabaseBackend::Postgres => Some(self.url.port().unwrap_or(DEFAULT_POSTGRES_PORT)),
            DatabaseBackend::MySql => Some(self.url.port().unwrap_or(3306)),
            DatabaseBackend::Sqlite => None,
        }
    }

    /// Database name for server engines; file path for SQLite.
    pub fn database(&self) -> Option<String> {
        match self.backend {
            DatabaseBackend::Sqlite => Some(self.sqlite_path()),
            _ => {
                let name = self.url.path().trim_start_matches('/');
                (!name.is_empty()).then(|| name.to_string())
            }
        }
    }

    pub fn ssl_mode(&self) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == "sslmode" || key == "ssl-mode")
            .map(|(_, value)| value.into_owned())
    }

    /// SQLite database file (or `:memory:`)
    fn sqlite_path(&self) -> String {
        let raw = self.url.as_str();
        let rest = raw.strip_prefix("sqlite:").unwrap_or(raw);
        let rest = rest.strip_prefix("//").unwrap_or(rest);
        rest.split('?').next().unwrap_or(rest).to_string()
    }

    /// Connection string safe for logs.
    pub fn redacted(&self) -> String {
        let mut url = self.url.clone();
        if url.password().is_some() {
            // Only fails for cannot-be-a-base URLs, which carry no password.
            let _ = url.set_password(Some("***"));
        }
        url.to_string()
    }
}

impl FromStr for DatabaseUrl {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s.trim())
            .map_err(|e| ConfigError::invalid("DATABASE_URL", e.to_string()))?;

        let backend = match url.scheme() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            "mysql" | "mariadb" => DatabaseBackend::MySql,
            "sqlite" => DatabaseBackend::Sqlite,
            other => {
                return Err(ConfigError::invalid(
                    "DATABASE_URL",
                    format!("unsupported scheme `{}`", other),
                ))
            }
        };

        if backend != DatabaseBackend::Sqlite && url.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::invalid("DATABASE_URL", "missing host"));
        }

        Ok(Self { url, backend })
    }
}

impl fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DatabaseUrl").field(&self.redacted()).finish()
    }
}
