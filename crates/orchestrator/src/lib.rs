#![forbid(unsafe_code)]

pub mod clock;
pub mod diagnostics;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod host;
pub mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use diagnostics::{Check, CheckResult, Diagnostics, Phase};
pub use dispatcher::{FixOutcome, FixPlan, FixStrategy, RepairDispatcher, Severity};
pub use engine::{ControlEvent, EmergencyReport, ImmunityEngine, Services, Sweep};
pub use error::{Error, HookError};
pub use host::{Host, NoopHost, NoopTransport, Subsystem, Transport};
pub use stats::{PerformanceMetrics, RecoveryStats};
