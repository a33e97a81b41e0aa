pub mod backup;
pub mod cooldown;
mod error;
pub mod health;
pub mod integrity;
pub mod journal;
pub mod learner;
pub mod probe;
pub mod problem;
pub mod rotation;
pub mod store;
pub mod utils;

pub use backup::{BackupArchive, BackupSnapshot};
pub use cooldown::Cooldown;
pub use error::Error;
pub use health::{HealthRegistry, HealthSummary, SubsystemHealth};
pub use integrity::{FileIssue, IntegrityGuard, RepairMethod, RepairOutcome, SourceEncoding};
pub use journal::{RecoveryLog, RecoveryLogEntry, RecoveryLogStats};
pub use learner::{PatternLearner, Prediction, ProblemPattern};
pub use probe::{ResourceProbe, SysinfoProbe};
pub use problem::{FileProblem, HealthStatus, Problem};
pub use rotation::LogRotation;
pub use store::KvStore;
