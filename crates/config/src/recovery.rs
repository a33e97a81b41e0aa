#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

/// Limits that keep repairs from spamming the filesystem or the host.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Recovery {
    /// Attempts per (file, problem) pair before the guard gives up.
    pub file_max_attempts: u32,

    /// Quiet period after any repair on the same file.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub file_cooldown: Duration,

    /// Repair attempts per subsystem before it is left alone.
    pub subsystem_max_attempts: u32,

    /// Quiet period between repair attempts on the same subsystem.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub subsystem_cooldown: Duration,

    /// Occurrences of a problem type that switch it to the stronger fix.
    pub recurrence_threshold: usize,

    /// Observations kept before the learner compacts its history.
    pub history_cap: usize,

    /// Observations kept after compaction.
    pub history_retain: usize,

    /// Channel that receives repair reports. `None` disables notifications.
    pub notify_channel: Option<u64>,
}

impl Default for Recovery {
    fn default() -> Self {
        Self {
            file_max_attempts: 3,
            file_cooldown: Duration::from_secs(5 * 60),
            subsystem_max_attempts: 5,
            subsystem_cooldown: Duration::from_secs(30 * 60),
            recurrence_threshold: 3,
            history_cap: 1000,
            history_retain: 500,
            notify_channel: None,
        }
    }
}
