#![forbid(unsafe_code)]

use crate::memory_policy::MemoryPolicy;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

/// Cadence of every periodic sweep, plus what the diagnostic sweep looks at.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Monitor {
    /// Snapshot critical files.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub backup_interval: Duration,

    /// Integrity check, self-lookup and disk space.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub health_interval: Duration,

    /// Full diagnostic sweep over every monitored subsystem.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub immunity_interval: Duration,

    /// System-wide resource pressure check.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub deep_interval: Duration,

    #[serde_as(as = "serde_with::DurationSeconds")]
    pub prediction_interval: Duration,

    #[serde_as(as = "serde_with::DurationSeconds")]
    pub learning_interval: Duration,

    /// Size check of the watched log files.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub log_interval: Duration,

    #[serde_as(as = "serde_with::DurationSeconds")]
    pub maintenance_interval: Duration,

    #[serde_as(as = "serde_with::DurationSeconds")]
    pub improvement_interval: Duration,

    /// Upper bound for any single call into the transport or the host.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub hook_timeout: Duration,

    pub memory: MemoryPolicy,

    /// Named feature subsystems checked by presence on the host.
    pub features: Vec<FeatureCheck>,
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            backup_interval: Duration::from_secs(60 * 60),
            health_interval: Duration::from_secs(30 * 60),
            immunity_interval: Duration::from_secs(10 * 60),
            deep_interval: Duration::from_secs(5 * 60),
            prediction_interval: Duration::from_secs(20 * 60),
            learning_interval: Duration::from_secs(30 * 60),
            log_interval: Duration::from_secs(60),
            maintenance_interval: Duration::from_secs(15 * 60),
            improvement_interval: Duration::from_secs(60 * 60),
            hook_timeout: Duration::from_secs(30),
            memory: MemoryPolicy::default(),
            features: FeatureCheck::defaults(),
        }
    }
}

/// A feature subsystem is healthy when any of its collaborators is present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureCheck {
    /// Name the subsystem is tracked under in the health registry.
    pub name: String,

    /// Names looked up on the host. Empty means `[name]`.
    #[serde(default)]
    pub collaborators: Vec<String>,
}

impl FeatureCheck {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collaborators: Vec::new(),
        }
    }

    pub fn with_collaborators<I, S>(mut self, collaborators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collaborators = collaborators.into_iter().map(Into::into).collect();
        self
    }

    /// Host names this check resolves, falling back to the subsystem name.
    pub fn lookup_names(&self) -> Vec<&str> {
        if self.collaborators.is_empty() {
            vec![self.name.as_str()]
        } else {
            self.collaborators.iter().map(String::as_str).collect()
        }
    }

    fn defaults() -> Vec<Self> {
        vec![
            Self::new("role_system"),
            Self::new("moderation_system").with_collaborators(["moderation_logs"]),
            Self::new("protection_system").with_collaborators([
                "raid_protection",
                "channel_protection",
                "ping_protection",
                "protection_panel",
            ]),
            Self::new("music_system"),
            Self::new("support_system"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lookup_names_falls_back_to_name() {
        let check = FeatureCheck::new("music_system");
        assert_eq!(check.lookup_names(), vec!["music_system"]);

        let check = FeatureCheck::new("protection_system").with_collaborators(["a", "b"]);
        assert_eq!(check.lookup_names(), vec!["a", "b"]);
    }

    #[test]
    fn default_features_cover_feature_modules() {
        let names: Vec<_> = Monitor::default()
            .features
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "role_system",
                "moderation_system",
                "protection_system",
                "music_system",
                "support_system"
            ]
        );
    }
}
