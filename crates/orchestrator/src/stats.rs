#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use humansize::{BINARY, format_size};
use kernel::{HealthSummary, ProblemPattern, RecoveryLogStats, SubsystemHealth};
use serde::{Deserialize, Serialize};

/// Everything an operator asks for with the stats command.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryStats {
    pub log: RecoveryLogStats,
    pub snapshots: usize,
    pub disk_free: Option<u64>,
    pub immunity: HealthSummary,
    pub subsystems: Vec<SubsystemHealth>,
    pub patterns: Vec<ProblemPattern>,
    pub fix_effectiveness: Option<f32>,
    pub paused: bool,
}

impl RecoveryStats {
    pub fn disk_free_human(&self) -> Option<String> {
        self.disk_free.map(|bytes| format_size(bytes, BINARY))
    }
}

/// Persisted by the self-improvement sweep under `performance_metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub fix_attempts: u32,
    pub successful_fixes: u32,
    pub failed_fixes: u32,
    pub success_rate: Option<f32>,
    pub history_len: usize,
    pub updated_at: DateTime<Utc>,
}
