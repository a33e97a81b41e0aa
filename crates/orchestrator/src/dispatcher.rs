#![forbid(unsafe_code)]

use crate::{
    clock::Clock,
    diagnostics::Check,
    error::HookError,
    host::{Host, Transport},
};
use config::MemoryPolicy;
use kernel::{
    FileProblem, HealthRegistry, IntegrityGuard, PatternLearner, Problem, RecoveryLog,
    RepairOutcome, ResourceProbe,
};
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Corrective actions, one per family of problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixStrategy {
    Reconnect,
    RerunSetup,
    ReleaseMemory,
    RestoreFiles,
    Restart,
}

/// Escalated problems get the strong variant, which does more and verifies
/// its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Soft,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixPlan {
    pub strategy: FixStrategy,
    pub severity: Severity,
}

impl FixPlan {
    /// A failed or hung check carries no diagnosis of its own, so it gets the
    /// fix of the subsystem it was checking.
    pub fn for_problem(check: &Check, problem: Problem, escalated: bool) -> Self {
        let strategy = match problem {
            Problem::CheckFailed => match check {
                Check::Connectivity => FixStrategy::Reconnect,
                Check::FileSystem => FixStrategy::RestoreFiles,
                Check::Memory => FixStrategy::ReleaseMemory,
                Check::Feature(_) => FixStrategy::RerunSetup,
                Check::Commands | Check::Events => FixStrategy::Restart,
            },
            Problem::Disconnected | Problem::ConnectionError => FixStrategy::Reconnect,
            Problem::MissingFiles | Problem::EmptyFiles | Problem::FileError => {
                FixStrategy::RestoreFiles
            }
            Problem::HighMemory | Problem::MediumMemory | Problem::MemoryError => {
                FixStrategy::ReleaseMemory
            }
            Problem::SubsystemMissing => FixStrategy::RerunSetup,
            Problem::NoCommands | Problem::EmptyCommands | Problem::NoListeners => {
                FixStrategy::Restart
            }
        };
        let severity = if escalated {
            Severity::Strong
        } else {
            Severity::Soft
        };
        Self { strategy, severity }
    }
}

impl fmt::Display for FixPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self.strategy {
            FixStrategy::Reconnect => "reconnect",
            FixStrategy::RerunSetup => "rerun_setup",
            FixStrategy::ReleaseMemory => "release_memory",
            FixStrategy::RestoreFiles => "restore_files",
            FixStrategy::Restart => "restart",
        };
        match self.severity {
            Severity::Soft => f.write_str(action),
            Severity::Strong => write!(f, "{action}_strong"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixOutcome {
    /// Not a problem, out of attempts, or cooling down.
    NotEligible,
    Applied { plan: FixPlan, success: bool },
}

pub struct RepairDispatcher {
    transport: Arc<dyn Transport>,
    host: Arc<dyn Host>,
    probe: Arc<dyn ResourceProbe>,
    clock: Arc<dyn Clock>,
    registry: HealthRegistry,
    learner: PatternLearner,
    log: RecoveryLog,
    guard: IntegrityGuard,
    memory: MemoryPolicy,
    timeout: Duration,
    notify_channel: Option<u64>,
}

impl RepairDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<dyn Transport>,
        host: Arc<dyn Host>,
        probe: Arc<dyn ResourceProbe>,
        clock: Arc<dyn Clock>,
        registry: HealthRegistry,
        learner: PatternLearner,
        log: RecoveryLog,
        guard: IntegrityGuard,
        memory: MemoryPolicy,
        timeout: Duration,
        notify_channel: Option<u64>,
    ) -> Self {
        Self {
            transport,
            host,
            probe,
            clock,
            registry,
            learner,
            log,
            guard,
            memory,
            timeout,
            notify_channel,
        }
    }

    /// Apply the fix for `problem` if the subsystem is eligible. Never fails:
    /// hook errors and timeouts become a failed attempt.
    pub async fn try_fix(&self, check: &Check, problem: Problem) -> FixOutcome {
        let subsystem = check.subsystem();
        let now = self.clock.now();
        if !self.registry.is_eligible_for_repair(subsystem, now) {
            debug!(subsystem, %problem, "not eligible for repair");
            return FixOutcome::NotEligible;
        }

        let plan = FixPlan::for_problem(check, problem, self.learner.is_escalated(problem));
        let attempt = self.registry.note_attempt(subsystem, now);
        let result = match tokio::time::timeout(self.timeout, self.apply(check, plan)).await {
            Ok(result) => result,
            Err(_) => Err(HookError::new(format!("timed out after {:?}", self.timeout))),
        };
        let success = result.is_ok();

        match &result {
            Ok(()) => {
                info!(subsystem, %problem, %plan, attempt, "repair succeeded");
                self.registry.set_fixed(subsystem);
            }
            Err(err) => warn!(subsystem, %problem, %plan, attempt, %err, "repair failed"),
        }
        self.log
            .record(subsystem, problem.as_str(), plan.to_string(), success);
        self.learner.record_fix(problem, success);
        self.notify(subsystem, problem, plan, &result).await;

        FixOutcome::Applied { plan, success }
    }

    async fn apply(&self, check: &Check, plan: FixPlan) -> Result<(), HookError> {
        let strong = plan.severity == Severity::Strong;
        match plan.strategy {
            FixStrategy::Reconnect => {
                self.transport.reconnect().await?;
                if strong {
                    self.transport.self_lookup().await?;
                }
                Ok(())
            }
            FixStrategy::RerunSetup => self.rerun_setup(check, strong).await,
            FixStrategy::ReleaseMemory => {
                self.host.release_memory().await?;
                if strong {
                    let probe = self.probe.clone();
                    let percent = tokio::task::spawn_blocking(move || probe.process_memory_percent())
                        .await
                        .map_err(|err| HookError::new(err.to_string()))?;
                    if let Some(percent) = percent
                        && percent > self.memory.high
                    {
                        return Err(HookError::new(format!(
                            "memory still at {percent:.1}% after release"
                        )));
                    }
                }
                Ok(())
            }
            FixStrategy::RestoreFiles => self.restore_files(strong).await,
            FixStrategy::Restart => {
                let handle = self
                    .host
                    .subsystem(check.subsystem())
                    .ok_or_else(|| HookError::new("subsystem not loaded"))?;
                handle
                    .restart()
                    .await
                    .ok_or_else(|| HookError::new("no restart hook"))??;
                if strong && let Some(result) = handle.setup().await {
                    result?;
                }
                Ok(())
            }
        }
    }

    /// Soft: call each collaborator's own setup hook, installing absent ones.
    /// Strong: reinstall every collaborator, then require one to resolve.
    async fn rerun_setup(&self, check: &Check, strong: bool) -> Result<(), HookError> {
        let mut ran = false;
        for name in check.collaborators() {
            let result = match self.host.subsystem(name) {
                Some(handle) if !strong => handle.setup().await,
                _ => self.host.setup(name).await,
            };
            if let Some(result) = result {
                result?;
                ran = true;
            }
        }
        if !ran {
            return Err(HookError::new("no setup hook available"));
        }
        if strong
            && !check
                .collaborators()
                .into_iter()
                .any(|name| self.host.subsystem(name).is_some())
        {
            return Err(HookError::new("still missing after setup"));
        }
        Ok(())
    }

    async fn restore_files(&self, strong: bool) -> Result<(), HookError> {
        let guard = self.guard.clone();
        tokio::task::spawn_blocking(move || {
            let restorable = |problem: FileProblem| {
                matches!(
                    problem,
                    FileProblem::Missing | FileProblem::Empty | FileProblem::Unreadable
                )
            };
            for issue in guard.check_all() {
                if !restorable(issue.problem) {
                    continue;
                }
                let outcome = if strong {
                    guard.force_repair(&issue.file, issue.problem)
                } else {
                    guard.repair(&issue.file, issue.problem)
                };
                if let RepairOutcome::Failed(reason) = outcome {
                    debug!(file = ?issue.file, %reason, "file not restored");
                }
            }
            let remaining = guard
                .check_all()
                .into_iter()
                .filter(|issue| restorable(issue.problem))
                .count();
            if remaining == 0 {
                Ok(())
            } else {
                Err(HookError::new(format!("{remaining} critical files still broken")))
            }
        })
        .await
        .map_err(|err| HookError::new(err.to_string()))?
    }

    async fn notify(
        &self,
        subsystem: &str,
        problem: Problem,
        plan: FixPlan,
        result: &Result<(), HookError>,
    ) {
        let Some(channel) = self.notify_channel else {
            return;
        };
        let content = match result {
            Ok(()) => format!("Repaired `{subsystem}` ({problem}) with {plan}."),
            Err(err) => format!("Repair of `{subsystem}` ({problem}) with {plan} failed: {err}"),
        };
        match tokio::time::timeout(self.timeout, self.transport.send(channel, &content)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(channel, %err, "failed to notify operators"),
            Err(_) => warn!(channel, "operator notification timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FeatureCheck;
    use pretty_assertions::assert_eq;

    #[test]
    fn escalation_picks_strong_variant() {
        let soft = FixPlan::for_problem(&Check::Connectivity, Problem::Disconnected, false);
        let strong = FixPlan::for_problem(&Check::Connectivity, Problem::Disconnected, true);
        assert_eq!(soft.strategy, FixStrategy::Reconnect);
        assert_eq!(soft.severity, Severity::Soft);
        assert_eq!(strong.severity, Severity::Strong);
        assert_eq!(strong.to_string(), "reconnect_strong");
    }

    #[test]
    fn table_covers_families() {
        assert_eq!(
            FixPlan::for_problem(&Check::FileSystem, Problem::EmptyFiles, false).strategy,
            FixStrategy::RestoreFiles
        );
        assert_eq!(
            FixPlan::for_problem(&Check::Memory, Problem::MediumMemory, false).strategy,
            FixStrategy::ReleaseMemory
        );
        let feature = Check::Feature(FeatureCheck::new("music_system"));
        assert_eq!(
            FixPlan::for_problem(&feature, Problem::SubsystemMissing, false).strategy,
            FixStrategy::RerunSetup
        );
        assert_eq!(
            FixPlan::for_problem(&Check::Commands, Problem::EmptyCommands, false).to_string(),
            "restart"
        );
    }

    #[test]
    fn failed_check_is_fixed_per_subsystem() {
        let feature = Check::Feature(FeatureCheck::new("music_system"));
        let cases = [
            (Check::Connectivity, FixStrategy::Reconnect),
            (Check::FileSystem, FixStrategy::RestoreFiles),
            (Check::Memory, FixStrategy::ReleaseMemory),
            (Check::Commands, FixStrategy::Restart),
            (Check::Events, FixStrategy::Restart),
            (feature, FixStrategy::RerunSetup),
        ];
        for (check, expected) in cases {
            let plan = FixPlan::for_problem(&check, Problem::CheckFailed, false);
            assert_eq!(plan.strategy, expected, "{}", check.subsystem());
        }
    }
}
