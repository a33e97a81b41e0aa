use crate::{cooldown::Cooldown, problem::HealthStatus};
use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Entry {
    pub(crate) status: HealthStatus,
    pub(crate) attempt_count: u32,
}

#[derive(Debug)]
pub(crate) struct HealthInner {
    pub(crate) max_attempts: u32,
    pub(crate) entries: BTreeMap<String, Entry>,
    pub(crate) cooldown: Cooldown<String>,
}

impl HealthInner {
    pub(crate) fn new(max_attempts: u32, cooldown: Duration) -> Self {
        Self {
            max_attempts,
            entries: BTreeMap::new(),
            cooldown: Cooldown::new(cooldown),
        }
    }

    pub(crate) fn record(&mut self, name: &str, status: HealthStatus) -> HealthStatus {
        let entry = self.entries.entry(name.to_owned()).or_default();
        let previous = entry.status;
        // recovering on its own gives the subsystem a fresh attempt budget,
        // the cooldown still applies
        if status.is_healthy() && !previous.is_healthy() {
            entry.attempt_count = 0;
        }
        entry.status = status;
        previous
    }

    pub(crate) fn is_eligible(&self, name: &str, now: Instant) -> bool {
        let Some(entry) = self.entries.get(name) else {
            return false;
        };
        entry.status.problem().is_some()
            && entry.attempt_count < self.max_attempts
            && !self.cooldown.is_cooling(name, now)
    }

    pub(crate) fn note_attempt(&mut self, name: &str, now: Instant) -> u32 {
        let entry = self.entries.entry(name.to_owned()).or_default();
        entry.attempt_count = entry.attempt_count.saturating_add(1);
        self.cooldown.mark(name.to_owned(), now);
        entry.attempt_count
    }
}
