//! Health prober - waits for a dependency to accept requests.
//!
//! Polling is an explicit bounded-retry state machine:
//!
//! ```text
//! Probing { completed } --ok--> Ready
//!        |  --err, budget left--> (sleep) Probing { completed + 1 }
//!        `  --err, budget spent--> Exhausted
//! ```
//!
//! An optional deadline cancels the whole wait, including a sleep or a check
//! in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout_at, Instant};

use crate::config::Config;
use crate::domain::DependencyTarget;
use crate::errors::{ConfigError, ProbeFailure, TimeoutError};
use crate::infra::ReadinessCheck;

/// How often and how many times to probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    interval: Duration,
    max_retries: u32,
    deadline: Option<Instant>,
}

impl ProbePolicy {
    /// `interval` must be positive and `max_retries` at least one.
    pub fn new(interval: Duration, max_retries: u32) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::invalid("PROBE_INTERVAL_MS", "must be greater than zero"));
        }
        if max_retries == 0 {
            return Err(ConfigError::invalid("PROBE_MAX_RETRIES", "must be at least 1"));
        }

        Ok(Self {
            interval,
            max_retries,
            deadline: None,
        })
    }

    /// Policy from configuration; a configured deadline starts counting now.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let policy = Self::new(config.probe_interval, config.probe_max_retries)?;
        Ok(match config.probe_deadline {
            Some(after) => policy.with_deadline(Instant::now() + after),
            None => policy,
        })
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Where a wait currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeState {
    /// Still polling; `completed` attempts have failed so far
    Probing {
        completed: u32,
        last_error: Option<ProbeFailure>,
    },
    Ready {
        attempts: u32,
    },
    Exhausted {
        attempts: u32,
        last_error: ProbeFailure,
    },
}

impl ProbeState {
    fn start() -> Self {
        ProbeState::Probing {
            completed: 0,
            last_error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProbeState::Probing { .. })
    }
}

/// Drives readiness checks for dependency targets.
#[derive(Clone)]
pub struct HealthProber {
    check: Arc<dyn ReadinessCheck>,
}

impl HealthProber {
    pub fn new(check: Arc<dyn ReadinessCheck>) -> Self {
        Self { check }
    }

    /// Poll `target` until it is ready, returning the number of attempts used.
    pub async fn wait_until_ready(
        &self,
        target: &DependencyTarget,
        policy: &ProbePolicy,
    ) -> Result<u32, TimeoutError> {
        tracing::info!(
            dependency = %target.name(),
            address = %target.address(),
            max_retries = policy.max_retries,
            "Waiting for dependency"
        );

        let mut state = ProbeState::start();
        let deadline_exceeded = match policy.deadline {
            Some(deadline) => timeout_at(deadline, self.drive(target, policy, &mut state))
                .await
                .is_err(),
            None => {
                self.drive(target, policy, &mut state).await;
                false
            }
        };

        match state {
            ProbeState::Ready { attempts } => {
                tracing::info!(dependency = %target.name(), attempts, "Dependency is ready");
                Ok(attempts)
            }
            ProbeState::Exhausted {
                attempts,
                last_error,
            } => {
                tracing::error!(
                    dependency = %target.name(),
                    attempts,
                    error = %last_error,
                    "Dependency never became ready"
                );
                Err(TimeoutError {
                    target: target.name().to_string(),
                    attempts,
                    last_error: Some(last_error.to_string()),
                    deadline_exceeded: false,
                })
            }
            ProbeState::Probing {
                completed,
                last_error,
            } => {
                tracing::error!(
                    dependency = %target.name(),
                    attempts = completed,
                    "Deadline reached while waiting for dependency"
                );
                Err(TimeoutError {
                    target: target.name().to_string(),
                    attempts: completed,
                    last_error: last_error.map(|e| e.to_string()),
                    deadline_exceeded,
                })
            }
        }
    }

    async fn drive(&self, target: &DependencyTarget, policy: &ProbePolicy, state: &mut ProbeState) {
        while let ProbeState::Probing { completed, .. } = &*state {
            let attempt = *completed + 1;

            match self.check.check(target).await {
                Ok(()) => *state = ProbeState::Ready { attempts: attempt },
                Err(e) if attempt >= policy.max_retries => {
                    *state = ProbeState::Exhausted {
                        attempts: attempt,
                        last_error: e,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        dependency = %target.name(),
                        attempt,
                        max_retries = policy.max_retries,
                        error = %e,
                        "Dependency not ready, retrying in {}ms",
                        policy.interval.as_millis()
                    );
                    *state = ProbeState::Probing {
                        completed: attempt,
                        last_error: Some(e),
                    };
                    sleep(policy.interval).await;
                }
            }
        }
    }
}
