//! Readiness checks against real endpoints.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryFutureExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::db::Database;
use crate::domain::{DependencyTarget, Endpoint};
use crate::errors::ProbeFailure;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// One readiness attempt against a target.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    /// Return `Ok` when the target accepts requests right now.
    async fn check(&self, target: &DependencyTarget) -> Result<(), ProbeFailure>;
}

/// Opens a connection to the target, then closes it again.
///
/// TCP targets are considered ready once a connect succeeds. Database
/// targets additionally have to answer `SELECT 1`.
#[derive(Debug, Clone)]
pub struct ConnectionCheck {
    attempt_timeout: Duration,
}

impl ConnectionCheck {
    pub fn new(attempt_timeout: Duration) -> Self {
        Self { attempt_timeout }
    }

    async fn check_tcp(&self, host: &str, port: u16) -> Result<(), ProbeFailure> {
        self.bounded(async {
            let stream = TcpStream::connect((host, port))
                .await
                .map_err(|e| ProbeFailure::new(e.to_string()))?;
            drop(stream);
            Ok(())
        })
        .await
    }

    async fn check_database(&self, target: &DependencyTarget) -> Result<(), ProbeFailure> {
        let Some(url) = target.database_url() else {
            return Err(ProbeFailure::new("target has no database url"));
        };

        self.bounded(async {
            let db = Database::connect_with_timeout(url, Some(self.attempt_timeout)).await?;
            let result = db.ping().await;
            db.close().await?;
            result
        }
        .map_err(|e| ProbeFailure::new(e.to_string())))
        .await
    }

    /// Run one attempt, failing it once `attempt_timeout` has passed.
    async fn bounded<F>(&self, attempt: F) -> Result<(), ProbeFailure>
    where
        F: Future<Output = Result<(), ProbeFailure>>,
    {
        timeout(self.attempt_timeout, attempt).await.unwrap_or_else(|_| {
            Err(ProbeFailure::new(format!(
                "attempt timed out after {}ms",
                self.attempt_timeout.as_millis()
            )))
        })
    }
}

#[async_trait]
impl ReadinessCheck for ConnectionCheck {
    async fn check(&self, target: &DependencyTarget) -> Result<(), ProbeFailure> {
        match target.endpoint() {
            Endpoint::Tcp { host, port } => self.check_tcp(host, *port).await,
            Endpoint::Database(_) => self.check_database(target).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::time::Instant;

    use crate::services::{HealthProber, ProbePolicy};

    #[tokio::test]
    async fn test_tcp_check_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let check = ConnectionCheck::new(Duration::from_millis(500));

        let target = DependencyTarget::tcp("api", "127.0.0.1", port);
        assert!(check.check(&target).await.is_ok());

        drop(listener);
        let err = check.check(&target).await.unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    /// Check whose every attempt hangs until the attempt timeout cuts it off.
    struct StalledCheck {
        inner: ConnectionCheck,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ReadinessCheck for StalledCheck {
        async fn check(&self, _target: &DependencyTarget) -> Result<(), ProbeFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.bounded(std::future::pending()).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_attempt_fails_after_attempt_timeout() {
        let check = ConnectionCheck::new(Duration::from_millis(250));
        let started = Instant::now();

        let err = check.bounded(std::future::pending()).await.unwrap_err();

        assert_eq!(err.to_string(), "attempt timed out after 250ms");
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_stalled_attempt_counts_once() {
        let check = Arc::new(StalledCheck {
            inner: ConnectionCheck::new(Duration::from_millis(100)),
            calls: AtomicU32::new(0),
        });
        let prober = HealthProber::new(check.clone());
        let policy = ProbePolicy::new(Duration::from_millis(50), 3).unwrap();
        let target = DependencyTarget::tcp("search", "10.255.255.1", 9200);

        let err = prober.wait_until_ready(&target, &policy).await.unwrap_err();

        assert_eq!(err.attempts, 3);
        assert_eq!(check.calls.load(Ordering::SeqCst), 3);
        assert!(!err.deadline_exceeded);
        assert_eq!(err.last_error.as_deref(), Some("attempt timed out after 100ms"));
    }

    #[tokio::test]
    async fn test_database_check_on_sqlite() {
        let check = ConnectionCheck::new(Duration::from_secs(2));
        let url = "sqlite::memory:".parse().unwrap();
        let target = DependencyTarget::database("db", url);

        assert!(check.check(&target).await.is_ok());
    }
}
