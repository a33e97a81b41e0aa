use crate::problem::Problem;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// One non-healthy check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Observation {
    pub subsystem: String,
    pub problem: Problem,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FixTally {
    pub succeeded: u32,
    pub failed: u32,
}

impl FixTally {
    pub fn total(&self) -> u32 {
        self.succeeded + self.failed
    }
}

#[derive(Debug)]
pub(crate) struct LearnerInner {
    pub(crate) threshold: usize,
    pub(crate) cap: usize,
    pub(crate) retain: usize,
    pub(crate) history: VecDeque<Observation>,
    pub(crate) escalated: BTreeSet<Problem>,
    pub(crate) fixes: BTreeMap<Problem, FixTally>,
}

impl LearnerInner {
    pub(crate) fn new(threshold: usize, cap: usize, retain: usize) -> Self {
        Self {
            threshold,
            cap,
            retain: retain.min(cap),
            history: VecDeque::new(),
            escalated: BTreeSet::new(),
            fixes: BTreeMap::new(),
        }
    }

    /// Drop the oldest observations once the history outgrows `cap`.
    pub(crate) fn compact(&mut self) -> usize {
        if self.history.len() <= self.cap {
            return 0;
        }
        let excess = self.history.len() - self.retain;
        self.history.drain(..excess);
        excess
    }

    pub(crate) fn occurrences(&self, problem: Problem) -> usize {
        self.history
            .iter()
            .filter(|observation| observation.problem == problem)
            .count()
    }
}
