mod inner;

use crate::problem::HealthStatus;
use config::Recovery;
use inner::HealthInner;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::debug;

/// Point-in-time view of one monitored subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsystemHealth {
    pub name: String,
    pub status: HealthStatus,
    pub attempt_count: u32,
    #[serde(skip)]
    pub last_attempt: Option<Instant>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub monitored: usize,
    pub healthy: usize,
    pub fixed: usize,
    pub with_problems: usize,
    pub total_attempts: u64,
}

/// Status, attempt budget and cooldown for every subsystem seen so far.
///
/// A subsystem is eligible for repair only while it has a problem, has used
/// fewer than `max_attempts` attempts, and its last attempt is older than the
/// cooldown window.
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    inner: Arc<Mutex<HealthInner>>,
}

impl HealthRegistry {
    pub fn new(max_attempts: u32, cooldown: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HealthInner::new(max_attempts, cooldown))),
        }
    }

    pub fn from_config(recovery: &Recovery) -> Self {
        Self::new(recovery.subsystem_max_attempts, recovery.subsystem_cooldown)
    }

    /// Record the outcome of a check and return the previous status.
    pub fn record(&self, name: &str, status: HealthStatus) -> HealthStatus {
        let previous = self.inner.lock().record(name, status);
        if previous != status {
            debug!(subsystem = name, %previous, %status, "health status changed");
        }
        previous
    }

    pub fn is_eligible_for_repair(&self, name: &str, now: Instant) -> bool {
        self.inner.lock().is_eligible(name, now)
    }

    /// Count one real repair attempt and start the cooldown. Returns the new
    /// attempt count.
    pub fn note_attempt(&self, name: &str, now: Instant) -> u32 {
        self.inner.lock().note_attempt(name, now)
    }

    /// Mark a successful repair; the next passing check makes it healthy.
    pub fn set_fixed(&self, name: &str) {
        self.inner.lock().record(name, HealthStatus::Fixed);
    }

    /// Operator override: forget attempts and cooldown for `name`.
    pub fn reset(&self, name: &str) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get_mut(name) {
            entry.attempt_count = 0;
        }
        inner.cooldown.clear(name);
    }

    pub fn status(&self, name: &str) -> Option<HealthStatus> {
        self.inner.lock().entries.get(name).map(|entry| entry.status)
    }

    pub fn attempts(&self, name: &str) -> u32 {
        self.inner
            .lock()
            .entries
            .get(name)
            .map_or(0, |entry| entry.attempt_count)
    }

    pub fn snapshot(&self) -> Vec<SubsystemHealth> {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .map(|(name, entry)| SubsystemHealth {
                name: name.clone(),
                status: entry.status,
                attempt_count: entry.attempt_count,
                last_attempt: inner.cooldown.last(name.as_str()),
            })
            .collect()
    }

    pub fn summary(&self) -> HealthSummary {
        let inner = self.inner.lock();
        inner
            .entries
            .values()
            .fold(HealthSummary::default(), |mut summary, entry| {
                summary.monitored += 1;
                match entry.status {
                    HealthStatus::Healthy => summary.healthy += 1,
                    HealthStatus::Fixed => summary.fixed += 1,
                    HealthStatus::Problem(_) => summary.with_problems += 1,
                }
                summary.total_attempts += u64::from(entry.attempt_count);
                summary
            })
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::from_config(&Recovery::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Problem;
    use pretty_assertions::assert_eq;

    const COOLDOWN: Duration = Duration::from_secs(30 * 60);

    #[test]
    fn eligibility_needs_a_problem() {
        let registry = HealthRegistry::new(5, COOLDOWN);
        let now = Instant::now();
        assert!(!registry.is_eligible_for_repair("connection", now));

        registry.record("connection", HealthStatus::Healthy);
        assert!(!registry.is_eligible_for_repair("connection", now));

        registry.record("connection", Problem::Disconnected.into());
        assert!(registry.is_eligible_for_repair("connection", now));
    }

    #[test]
    fn cooldown_blocks_until_window_passes() {
        let registry = HealthRegistry::new(5, COOLDOWN);
        let start = Instant::now();
        registry.record("memory", Problem::HighMemory.into());
        registry.note_attempt("memory", start);

        assert!(!registry.is_eligible_for_repair("memory", start + COOLDOWN / 2));
        assert!(registry.is_eligible_for_repair("memory", start + COOLDOWN));
    }

    #[test]
    fn attempt_cap_holds_until_reset() {
        let registry = HealthRegistry::new(5, COOLDOWN);
        let mut now = Instant::now();
        registry.record("role_system", Problem::SubsystemMissing.into());
        for _ in 0..5 {
            assert!(registry.is_eligible_for_repair("role_system", now));
            registry.note_attempt("role_system", now);
            now += COOLDOWN;
        }
        assert!(!registry.is_eligible_for_repair("role_system", now));
        assert!(!registry.is_eligible_for_repair("role_system", now + COOLDOWN * 10));

        registry.reset("role_system");
        assert!(registry.is_eligible_for_repair("role_system", now));
    }

    #[test]
    fn healthy_observation_resets_attempts_but_not_cooldown() {
        let registry = HealthRegistry::new(5, COOLDOWN);
        let now = Instant::now();
        registry.record("commands", Problem::EmptyCommands.into());
        registry.note_attempt("commands", now);
        registry.note_attempt("commands", now);
        registry.set_fixed("commands");
        assert_eq!(registry.attempts("commands"), 2);

        registry.record("commands", HealthStatus::Healthy);
        assert_eq!(registry.attempts("commands"), 0);

        registry.record("commands", Problem::EmptyCommands.into());
        assert!(!registry.is_eligible_for_repair("commands", now));
        assert!(registry.is_eligible_for_repair("commands", now + COOLDOWN));
    }

    #[test]
    fn summary_counts_statuses() {
        let registry = HealthRegistry::default();
        let now = Instant::now();
        registry.record("a", HealthStatus::Healthy);
        registry.record("b", Problem::NoListeners.into());
        registry.note_attempt("b", now);
        registry.set_fixed("b");
        registry.record("c", Problem::MemoryError.into());

        assert_eq!(
            registry.summary(),
            HealthSummary {
                monitored: 3,
                healthy: 1,
                fixed: 1,
                with_problems: 1,
                total_attempts: 1,
            }
        );
        let names: Vec<_> = registry.snapshot().into_iter().map(|h| h.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
