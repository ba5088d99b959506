//! Launch plans: which services to start and what each one waits for.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::target::DependencyTarget;
use crate::errors::LaunchError;

/// A condition that must hold before a service may start.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// The named target answers its readiness probe
    Ready(String),
    /// The named database target is ready and fully migrated
    Migrated(String),
    /// The named service has been spawned
    Started(String),
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::Ready(target) => write!(f, "ready({})", target),
            Precondition::Migrated(target) => write!(f, "migrated({})", target),
            Precondition::Started(service) => write!(f, "started({})", service),
        }
    }
}

/// A long-running process to launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    #[serde(default)]
    pub after: Vec<Precondition>,
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            workdir: None,
            after: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn after(mut self, precondition: Precondition) -> Self {
        self.after.push(precondition);
        self
    }
}

/// Services plus the targets their preconditions refer to.
#[derive(Debug, Clone, Default)]
pub struct LaunchPlan {
    targets: Vec<DependencyTarget>,
    services: Vec<ServiceSpec>,
}

impl LaunchPlan {
    pub fn new(targets: Vec<DependencyTarget>, services: Vec<ServiceSpec>) -> Self {
        Self { targets, services }
    }

    pub fn targets(&self) -> &[DependencyTarget] {
        &self.targets
    }

    pub fn services(&self) -> &[ServiceSpec] {
        &self.services
    }

    pub fn target(&self, name: &str) -> Option<&DependencyTarget> {
        self.targets.iter().find(|t| t.name() == name)
    }

    /// Check names and references without touching the outside world.
    pub fn validate(&self) -> Result<(), LaunchError> {
        if self.services.is_empty() {
            return Err(LaunchError::InvalidPlan("no services declared".to_string()));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.name()) {
                return Err(invalid(format!("duplicate target `{}`", target.name())));
            }
        }

        let mut services = HashSet::new();
        for service in &self.services {
            if !services.insert(service.name.as_str()) {
                return Err(invalid(format!("duplicate service `{}`", service.name)));
            }
        }

        for service in &self.services {
            for precondition in &service.after {
                match precondition {
                    Precondition::Ready(name) => {
                        if self.target(name).is_none() {
                            return Err(invalid(format!(
                                "service `{}` waits for unknown target `{}`",
                                service.name, name
                            )));
                        }
                    }
                    Precondition::Migrated(name) => match self.target(name) {
                        Some(t) if t.is_database() && t.migrations_dir().is_some() => {}
                        Some(_) => {
                            return Err(invalid(format!(
                                "service `{}` requires migrations on `{}`, which is not a database with a migrations directory",
                                service.name, name
                            )))
                        }
                        None => {
                            return Err(invalid(format!(
                                "service `{}` waits for unknown target `{}`",
                                service.name, name
                            )))
                        }
                    },
                    Precondition::Started(name) => {
                        if name == &service.name {
                            return Err(invalid(format!(
                                "service `{}` cannot wait for itself",
                                service.name
                            )));
                        }
                        if !services.contains(name.as_str()) {
                            return Err(invalid(format!(
                                "service `{}` waits for unknown service `{}`",
                                service.name, name
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Services in the order they must be started.
    ///
    /// Stable topological order over `Started` edges: among services whose
    /// dependencies are satisfied, the one declared first goes first.
    pub fn start_order(&self) -> Result<Vec<&ServiceSpec>, LaunchError> {
        self.validate()?;

        let index: HashMap<&str, usize> = self
            .services
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        let mut pending: Vec<usize> = vec![0; self.services.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.services.len()];
        for (i, service) in self.services.iter().enumerate() {
            let deps: HashSet<usize> = service
                .after
                .iter()
                .filter_map(|p| match p {
                    Precondition::Started(name) => index.get(name.as_str()).copied(),
                    _ => None,
                })
                .collect();
            pending[i] = deps.len();
            for dep in deps {
                dependents[dep].push(i);
            }
        }

        let mut emitted = vec![false; self.services.len()];
        let mut order = Vec::with_capacity(self.services.len());
        while let Some(next) = (0..self.services.len()).find(|&i| !emitted[i] && pending[i] == 0) {
            emitted[next] = true;
            order.push(&self.services[next]);
            for &dependent in &dependents[next] {
                pending[dependent] -= 1;
            }
        }

        if order.len() < self.services.len() {
            let cycle: Vec<&str> = self
                .services
                .iter()
                .zip(&emitted)
                .filter(|(_, done)| !**done)
                .map(|(s, _)| s.name.as_str())
                .collect();
            return Err(invalid(format!(
                "dependency cycle between services: {}",
                cycle.join(", ")
            )));
        }

        Ok(order)
    }
}

fn invalid(message: String) -> LaunchError {
    LaunchError::InvalidPlan(message)
}
