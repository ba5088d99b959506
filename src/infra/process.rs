//! Spawning and supervising long-running service processes.

use std::io;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::domain::ServiceSpec;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Starts service processes.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Spawn `service` and return as soon as the process exists.
    async fn spawn(&self, service: &ServiceSpec) -> io::Result<RunningService>;
}

/// A started service.
///
/// Dropping the handle does not stop the process.
#[derive(Debug)]
pub struct RunningService {
    name: String,
    pid: Option<u32>,
    child: Option<Child>,
}

impl RunningService {
    pub fn from_child(name: impl Into<String>, child: Child) -> Self {
        Self {
            name: name.into(),
            pid: child.id(),
            child: Some(child),
        }
    }

    /// A handle for a process this crate does not own.
    pub fn detached(name: impl Into<String>, pid: Option<u32>) -> Self {
        Self {
            name: name.into(),
            pid,
            child: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the process to exit. Never resolves for detached handles.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        match self.child.as_mut() {
            Some(child) => child.wait().await,
            None => std::future::pending().await,
        }
    }

    /// Kill the process and reap it.
    pub async fn kill(&mut self) -> io::Result<()> {
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        child.kill().await
    }
}

/// Spawns services as child processes of the current one.
#[derive(Debug, Clone, Default)]
pub struct TokioSpawner;

#[async_trait]
impl ProcessSpawner for TokioSpawner {
    async fn spawn(&self, service: &ServiceSpec) -> io::Result<RunningService> {
        let mut command = Command::new(&service.command);
        command
            .args(&service.args)
            .envs(&service.env)
            .stdin(Stdio::null());
        if let Some(dir) = &service.workdir {
            command.current_dir(dir);
        }

        let child = command.spawn()?;
        tracing::info!(service = %service.name, pid = ?child.id(), "Service spawned");

        Ok(RunningService::from_child(&service.name, child))
    }
}
