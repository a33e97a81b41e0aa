#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Process memory thresholds, as a percentage of total system memory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryPolicy {
    /// Usage above this is reported as `medium_memory` (clamped to 0..=100).
    pub medium: f32,
    /// Usage above this is reported as `high_memory` (clamped to 0..=100).
    pub high: f32,
    /// System-wide usage above this triggers the deep check's memory release.
    pub system_pressure: f32,
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            medium: 60.0,
            high: 80.0,
            system_pressure: 80.0,
        }
    }
}

impl MemoryPolicy {
    /// Clamp every threshold into 0..=100 and keep `medium <= high`.
    pub fn clamp(self) -> Self {
        let medium = self.medium.clamp(0.0, 100.0);
        let high = self.high.clamp(0.0, 100.0);
        Self {
            medium: medium.min(high),
            high,
            system_pressure: self.system_pressure.clamp(0.0, 100.0),
        }
    }
}
