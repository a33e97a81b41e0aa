mod inner;

use crate::problem::Problem;
use chrono::Utc;
use config::Recovery;
pub use inner::{FixTally, Observation};
use inner::LearnerInner;
use itertools::Itertools;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Observations per subsystem considered by [`PatternLearner::predict`].
pub const PREDICTION_WINDOW: usize = 10;

/// Occurrences within the window that make a prediction.
pub const PREDICTION_MIN_OCCURRENCES: usize = 3;

/// Confidence never reaches certainty.
pub const PREDICTION_CEILING: f32 = 0.9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemPattern {
    pub problem: Problem,
    pub occurrences: usize,
    pub escalated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub subsystem: String,
    pub problem: Problem,
    pub occurrences: usize,
    pub confidence: f32,
}

/// Frequency counting over a bounded history of observed problems.
///
/// A problem type that recurs `threshold` times is escalated for good, which
/// switches the dispatcher to the stronger fix.
#[derive(Debug, Clone)]
pub struct PatternLearner {
    inner: Arc<Mutex<LearnerInner>>,
}

impl PatternLearner {
    pub fn new(threshold: usize, cap: usize, retain: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LearnerInner::new(threshold, cap, retain))),
        }
    }

    pub fn from_config(recovery: &Recovery) -> Self {
        Self::new(
            recovery.recurrence_threshold,
            recovery.history_cap,
            recovery.history_retain,
        )
    }

    /// Record a problem. Returns `true` when this observation escalated it.
    pub fn observe(&self, subsystem: &str, problem: Problem) -> bool {
        let mut inner = self.inner.lock();
        inner.history.push_back(Observation {
            subsystem: subsystem.to_owned(),
            problem,
            at: Utc::now(),
        });
        inner.compact();

        if inner.escalated.contains(&problem) || inner.occurrences(problem) < inner.threshold {
            return false;
        }
        inner.escalated.insert(problem);
        info!(%problem, threshold = inner.threshold, "recurring problem escalated");
        true
    }

    /// Occurrences of `problem` among the newest `recent_window` observations,
    /// or the whole history when `None`.
    pub fn frequency(&self, problem: Problem, recent_window: Option<usize>) -> usize {
        let inner = self.inner.lock();
        let window = recent_window.unwrap_or(inner.history.len());
        inner
            .history
            .iter()
            .rev()
            .take(window)
            .filter(|observation| observation.problem == problem)
            .count()
    }

    pub fn is_escalated(&self, problem: Problem) -> bool {
        self.inner.lock().escalated.contains(&problem)
    }

    /// Escalate ahead of the threshold. Returns `false` if already escalated.
    pub fn escalate(&self, problem: Problem) -> bool {
        self.inner.lock().escalated.insert(problem)
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().history.len()
    }

    pub fn compact(&self) -> usize {
        self.inner.lock().compact()
    }

    /// Occurrence count per problem type, most frequent first.
    pub fn patterns(&self) -> Vec<ProblemPattern> {
        let inner = self.inner.lock();
        inner
            .history
            .iter()
            .map(|observation| observation.problem)
            .counts()
            .into_iter()
            .map(|(problem, occurrences)| ProblemPattern {
                problem,
                occurrences,
                escalated: inner.escalated.contains(&problem),
            })
            .sorted_by(|a, b| b.occurrences.cmp(&a.occurrences).then(a.problem.cmp(&b.problem)))
            .collect()
    }

    /// Problems likely to recur, judged per subsystem over its newest
    /// [`PREDICTION_WINDOW`] observations.
    pub fn predict(&self) -> Vec<Prediction> {
        let inner = self.inner.lock();
        let by_subsystem = inner
            .history
            .iter()
            .rev()
            .map(|observation| (observation.subsystem.as_str(), observation.problem))
            .into_group_map();

        by_subsystem
            .into_iter()
            .flat_map(|(subsystem, problems)| {
                problems
                    .into_iter()
                    .take(PREDICTION_WINDOW)
                    .counts()
                    .into_iter()
                    .filter(|&(_, count)| count >= PREDICTION_MIN_OCCURRENCES)
                    .map(move |(problem, occurrences)| Prediction {
                        subsystem: subsystem.to_owned(),
                        problem,
                        occurrences,
                        confidence: confidence(occurrences),
                    })
            })
            .sorted_by(|a, b| a.subsystem.cmp(&b.subsystem).then(a.problem.cmp(&b.problem)))
            .collect()
    }

    pub fn record_fix(&self, problem: Problem, success: bool) {
        let mut inner = self.inner.lock();
        let tally = inner.fixes.entry(problem).or_default();
        if success {
            tally.succeeded += 1;
        } else {
            tally.failed += 1;
        }
    }

    /// Aggregate over every fix recorded so far.
    pub fn fix_totals(&self) -> FixTally {
        self.inner
            .lock()
            .fixes
            .values()
            .fold(FixTally::default(), |acc, tally| FixTally {
                succeeded: acc.succeeded + tally.succeeded,
                failed: acc.failed + tally.failed,
            })
    }

    /// Share of successful fixes, `None` before the first fix.
    pub fn effectiveness(&self) -> Option<f32> {
        let totals = self.fix_totals();
        (totals.total() > 0).then(|| totals.succeeded as f32 / totals.total() as f32)
    }

    /// Problem types whose fixes failed more than `min_failures` times.
    pub fn failing_types(&self, min_failures: u32) -> Vec<Problem> {
        self.inner
            .lock()
            .fixes
            .iter()
            .filter(|(_, tally)| tally.failed > min_failures)
            .map(|(problem, _)| *problem)
            .collect()
    }
}

impl Default for PatternLearner {
    fn default() -> Self {
        Self::from_config(&Recovery::default())
    }
}

fn confidence(occurrences: usize) -> f32 {
    (occurrences as f32 / PREDICTION_WINDOW as f32).min(PREDICTION_CEILING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn escalates_exactly_at_third_occurrence() {
        let learner = PatternLearner::default();
        assert!(!learner.observe("connection", Problem::Disconnected));
        learner.observe("memory", Problem::HighMemory);
        assert!(!learner.observe("connection", Problem::Disconnected));
        assert!(!learner.is_escalated(Problem::Disconnected));

        assert!(learner.observe("connection", Problem::Disconnected));
        assert!(learner.is_escalated(Problem::Disconnected));
        // sticky, and reported only once
        assert!(!learner.observe("connection", Problem::Disconnected));
        assert!(!learner.is_escalated(Problem::HighMemory));
    }

    #[test]
    fn history_is_truncated_to_retain() {
        let learner = PatternLearner::new(3, 1000, 500);
        for _ in 0..1000 {
            learner.observe("memory", Problem::MediumMemory);
        }
        assert_eq!(learner.history_len(), 1000);
        learner.observe("memory", Problem::HighMemory);
        assert_eq!(learner.history_len(), 500);
        assert_eq!(learner.frequency(Problem::HighMemory, None), 1);
        // escalation survives compaction
        assert!(learner.is_escalated(Problem::MediumMemory));
    }

    #[test]
    fn frequency_respects_window() {
        let learner = PatternLearner::default();
        learner.observe("files", Problem::MissingFiles);
        learner.observe("files", Problem::EmptyFiles);
        learner.observe("files", Problem::EmptyFiles);
        assert_eq!(learner.frequency(Problem::MissingFiles, Some(2)), 0);
        assert_eq!(learner.frequency(Problem::MissingFiles, Some(3)), 1);
        assert_eq!(learner.frequency(Problem::EmptyFiles, None), 2);
    }

    #[test]
    fn predicts_per_subsystem() {
        let learner = PatternLearner::default();
        for _ in 0..4 {
            learner.observe("memory", Problem::HighMemory);
        }
        learner.observe("commands", Problem::NoCommands);
        learner.observe("commands", Problem::NoCommands);

        let predictions = learner.predict();
        assert_eq!(
            predictions,
            vec![Prediction {
                subsystem: "memory".into(),
                problem: Problem::HighMemory,
                occurrences: 4,
                confidence: 0.4,
            }]
        );
    }

    #[test]
    fn effectiveness_and_failing_types() {
        let learner = PatternLearner::default();
        assert_eq!(learner.effectiveness(), None);
        for _ in 0..4 {
            learner.record_fix(Problem::SubsystemMissing, false);
        }
        learner.record_fix(Problem::HighMemory, true);
        assert_eq!(learner.effectiveness(), Some(0.2));
        assert_eq!(learner.failing_types(3), vec![Problem::SubsystemMissing]);
    }

    #[test]
    fn patterns_sorted_by_count() {
        let learner = PatternLearner::default();
        learner.observe("a", Problem::NoListeners);
        learner.observe("b", Problem::HighMemory);
        learner.observe("b", Problem::HighMemory);
        let patterns = learner.patterns();
        assert_eq!(patterns[0].problem, Problem::HighMemory);
        assert_eq!(patterns[0].occurrences, 2);
        assert_eq!(patterns[1].problem, Problem::NoListeners);
    }

    proptest! {
        #[test]
        fn confidence_is_capped(occurrences in 0usize..100) {
            let value = confidence(occurrences);
            prop_assert!(value <= PREDICTION_CEILING);
            prop_assert!(value >= 0.0);
        }
    }
}
