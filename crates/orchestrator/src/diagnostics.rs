#![forbid(unsafe_code)]

use crate::host::{Host, Transport};
use config::{FeatureCheck, MemoryPolicy, Monitor};
use kernel::{FileProblem, HealthStatus, IntegrityGuard, Problem, ResourceProbe};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{debug, warn};

/// One independent health check. Each reports under its own subsystem name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Connectivity,
    FileSystem,
    Memory,
    Commands,
    Events,
    Feature(FeatureCheck),
}

impl Check {
    pub fn subsystem(&self) -> &str {
        match self {
            Self::Connectivity => "connection",
            Self::FileSystem => "files",
            Self::Memory => "memory",
            Self::Commands => "commands",
            Self::Events => "events",
            Self::Feature(feature) => &feature.name,
        }
    }

    /// Host names that implement this subsystem.
    pub fn collaborators(&self) -> Vec<&str> {
        match self {
            Self::Feature(feature) => feature.lookup_names(),
            other => vec![other.subsystem()],
        }
    }

    /// Every built-in check followed by the configured feature subsystems.
    pub fn defaults(monitor: &Monitor) -> Vec<Self> {
        [
            Self::Connectivity,
            Self::FileSystem,
            Self::Memory,
            Self::Commands,
            Self::Events,
        ]
        .into_iter()
        .chain(monitor.features.iter().cloned().map(Self::Feature))
        .collect()
    }

    /// Checks that need nothing but the local machine.
    pub fn local() -> Vec<Self> {
        vec![Self::FileSystem, Self::Memory]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Pending,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub check: Check,
    pub status: HealthStatus,
}

type Phases = Arc<Mutex<HashMap<String, Phase>>>;

/// Puts a check back to pending when dropped, even if its future is.
struct Running {
    phases: Phases,
    name: String,
}

impl Running {
    fn begin(phases: &Phases, name: &str) -> Option<Self> {
        let mut map = phases.lock();
        let phase = map.entry(name.to_owned()).or_default();
        if *phase == Phase::Running {
            return None;
        }
        *phase = Phase::Running;
        Some(Self {
            phases: phases.clone(),
            name: name.to_owned(),
        })
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.phases.lock().insert(std::mem::take(&mut self.name), Phase::Pending);
    }
}

pub struct Diagnostics {
    checks: Vec<Check>,
    phases: Phases,
    transport: Arc<dyn Transport>,
    host: Arc<dyn Host>,
    probe: Arc<dyn ResourceProbe>,
    guard: IntegrityGuard,
    memory: MemoryPolicy,
    timeout: Duration,
}

impl Diagnostics {
    pub fn new(
        checks: Vec<Check>,
        transport: Arc<dyn Transport>,
        host: Arc<dyn Host>,
        probe: Arc<dyn ResourceProbe>,
        guard: IntegrityGuard,
        memory: MemoryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            checks,
            phases: Phases::default(),
            transport,
            host,
            probe,
            guard,
            memory,
            timeout,
        }
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn phase(&self, subsystem: &str) -> Phase {
        self.phases.lock().get(subsystem).copied().unwrap_or_default()
    }

    /// Run every check in declared order. A check still running from an
    /// overlapping cycle is left out.
    pub async fn run_cycle(&self) -> Vec<CheckResult> {
        let mut results = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            let Some(_running) = Running::begin(&self.phases, check.subsystem()) else {
                debug!(subsystem = check.subsystem(), "check already running, skipped");
                continue;
            };
            let status = self.run_check(check).await;
            results.push(CheckResult {
                check: check.clone(),
                status,
            });
        }
        results
    }

    /// Run one check under the hook timeout. A check that cannot complete
    /// reports [`Problem::CheckFailed`].
    pub async fn run_check(&self, check: &Check) -> HealthStatus {
        match tokio::time::timeout(self.timeout, self.evaluate(check)).await {
            Ok(status) => status,
            Err(_) => {
                warn!(subsystem = check.subsystem(), timeout = ?self.timeout, "check timed out");
                Problem::CheckFailed.into()
            }
        }
    }

    async fn evaluate(&self, check: &Check) -> HealthStatus {
        match check {
            Check::Connectivity => {
                if !self.transport.is_connected() {
                    return Problem::Disconnected.into();
                }
                match self.transport.self_lookup().await {
                    Ok(()) => HealthStatus::Healthy,
                    Err(err) => {
                        debug!(%err, "self lookup failed");
                        Problem::ConnectionError.into()
                    }
                }
            }
            Check::FileSystem => {
                let guard = self.guard.clone();
                match tokio::task::spawn_blocking(move || guard.check_all()).await {
                    Ok(issues) => classify_files(issues.iter().map(|issue| issue.problem)),
                    Err(err) => {
                        warn!(%err, "file system check failed");
                        Problem::FileError.into()
                    }
                }
            }
            Check::Memory => {
                let probe = self.probe.clone();
                match tokio::task::spawn_blocking(move || probe.process_memory_percent()).await {
                    Ok(percent) => classify_memory(percent, &self.memory),
                    Err(err) => {
                        warn!(%err, "memory check failed");
                        Problem::CheckFailed.into()
                    }
                }
            }
            Check::Commands => match self.host.command_count() {
                None => Problem::NoCommands.into(),
                Some(0) => Problem::EmptyCommands.into(),
                Some(_) => HealthStatus::Healthy,
            },
            Check::Events => match self.host.listener_count() {
                None | Some(0) => Problem::NoListeners.into(),
                Some(_) => HealthStatus::Healthy,
            },
            Check::Feature(feature) => {
                let present = feature
                    .lookup_names()
                    .into_iter()
                    .any(|name| self.host.subsystem(name).is_some());
                if present {
                    HealthStatus::Healthy
                } else {
                    Problem::SubsystemMissing.into()
                }
            }
        }
    }
}

/// Only presence and emptiness matter here; content defects belong to the
/// integrity sweep.
fn classify_files(problems: impl Iterator<Item = FileProblem>) -> HealthStatus {
    let mut worst: Option<Problem> = None;
    for problem in problems {
        let mapped = match problem {
            FileProblem::Missing => Problem::MissingFiles,
            FileProblem::Empty => Problem::EmptyFiles,
            FileProblem::Unreadable => Problem::FileError,
            FileProblem::Encoding | FileProblem::InvalidStructure => continue,
        };
        // missing outranks empty outranks unreadable
        worst = Some(worst.map_or(mapped, |current| current.min(mapped)));
    }
    worst.map_or(HealthStatus::Healthy, HealthStatus::from)
}

fn classify_memory(percent: Option<f32>, policy: &MemoryPolicy) -> HealthStatus {
    let Some(percent) = percent else {
        return HealthStatus::Healthy;
    };
    if !percent.is_finite() || percent < 0.0 {
        Problem::MemoryError.into()
    } else if percent > policy.high {
        Problem::HighMemory.into()
    } else if percent > policy.medium {
        Problem::MediumMemory.into()
    } else {
        HealthStatus::Healthy
    }
}
