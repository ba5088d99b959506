//! Database connection management.

use std::time::Duration;

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database as SeaDatabase, DatabaseConnection, DbErr, Statement,
};

use crate::config::DatabaseUrl;

pub mod entities;
pub mod lock;

pub use lock::AdvisoryLock;

/// Database wrapper owning a single dedicated connection.
///
/// Session-scoped state (advisory locks) and the migration transactions must
/// share one session, so the pool never grows past one connection.
pub struct Database {
    connection: DatabaseConnection,
}

impl Database {
    /// Open an exclusively owned connection.
    pub async fn connect(url: &DatabaseUrl) -> Result<Self, DbErr> {
        Self::connect_with_timeout(url, None).await
    }

    /// Open an exclusively owned connection, bounding the connect attempt.
    pub async fn connect_with_timeout(
        url: &DatabaseUrl,
        timeout: Option<Duration>,
    ) -> Result<Self, DbErr> {
        let mut options = ConnectOptions::new(url.as_str().to_owned());
        options
            .max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);
        if let Some(timeout) = timeout {
            options.connect_timeout(timeout).acquire_timeout(timeout);
        }

        let connection = SeaDatabase::connect(options).await?;
        tracing::debug!(database = %url, "Database connection opened");

        Ok(Self { connection })
    }

    /// Get a reference to the database connection.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// Check database connectivity by executing a simple query.
    pub async fn ping(&self) -> Result<(), DbErr> {
        self.connection
            .execute(Statement::from_string(
                self.connection.get_database_backend(),
                "SELECT 1".to_string(),
            ))
            .await?;
        Ok(())
    }

    /// Release the connection.
    pub async fn close(self) -> Result<(), DbErr> {
        self.connection.close().await
    }
}
