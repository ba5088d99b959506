//! Dependency targets: resources a service waits on before starting.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::DatabaseUrl;

/// How a dependency is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Anything that accepts TCP connections
    Tcp { host: String, port: u16 },
    /// A relational database, probed with a real connection
    Database(DatabaseUrl),
}

/// An addressable resource with a readiness predicate.
///
/// Built from configuration at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyTarget {
    name: String,
    endpoint: Endpoint,
    migrations: Option<PathBuf>,
}

impl DependencyTarget {
    pub fn tcp(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            endpoint: Endpoint::Tcp {
                host: host.into(),
                port,
            },
            migrations: None,
        }
    }

    pub fn database(name: impl Into<String>, url: DatabaseUrl) -> Self {
        Self {
            name: name.into(),
            endpoint: Endpoint::Database(url),
            migrations: None,
        }
    }

    /// Attach the directory holding this database's migration units.
    pub fn with_migrations(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations = Some(dir.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn migrations_dir(&self) -> Option<&Path> {
        self.migrations.as_deref()
    }

    pub fn database_url(&self) -> Option<&DatabaseUrl> {
        match &self.endpoint {
            Endpoint::Database(url) => Some(url),
            Endpoint::Tcp { .. } => None,
        }
    }

    pub fn is_database(&self) -> bool {
        matches!(self.endpoint, Endpoint::Database(_))
    }

    /// Human-readable address, safe for logs.
    pub fn address(&self) -> String {
        match &self.endpoint {
            Endpoint::Tcp { host, port } => format!("{}:{}", host, port),
            Endpoint::Database(url) => url.redacted(),
        }
    }
}

impl fmt::Display for DependencyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address())
    }
}
