#![forbid(unsafe_code)]

mod backup;
mod error;
mod files;
mod memory_policy;
mod monitor;
mod persistence;
mod recovery;

pub use backup::Backup;
pub use error::Error;
pub use files::Files;
pub use memory_policy::MemoryPolicy;
pub use monitor::{FeatureCheck, Monitor};
pub use persistence::Persistence;
pub use recovery::Recovery;

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub monitor: Monitor,
    pub recovery: Recovery,
    pub backup: Backup,
    pub files: Files,
    pub persistence: Persistence,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TOML file on top of the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::InvalidPath(path.to_path_buf()));
        }
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .extract()?;
        config.validate()
    }

    /// Write the configuration as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let text = toml_edit::ser::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Resolve a configured path against `files.root`.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.files.root.join(path)
        }
    }

    fn validate(mut self) -> Result<Self, Error> {
        self.monitor.memory = self.monitor.memory.clamp();
        if self.backup.keep == 0 {
            return Err(Error::InvalidValue {
                field: "backup.keep",
                reason: "at least one snapshot must be kept".into(),
            });
        }
        if self.recovery.history_retain > self.recovery.history_cap {
            return Err(Error::InvalidValue {
                field: "recovery.history_retain",
                reason: format!(
                    "{} exceeds history_cap {}",
                    self.recovery.history_retain, self.recovery.history_cap
                ),
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("immunity.toml");
        std::fs::write(
            &path,
            r#"
[monitor]
immunity_interval = 120

[backup]
keep = 3

[[monitor.features]]
name = "music_system"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.monitor.immunity_interval, Duration::from_secs(120));
        assert_eq!(config.monitor.health_interval, Duration::from_secs(30 * 60));
        assert_eq!(config.backup.keep, 3);
        assert_eq!(config.monitor.features, vec![FeatureCheck::new("music_system")]);
        assert_eq!(config.recovery, Recovery::default());
    }

    #[test]
    fn save_then_load_preserves_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("immunity.toml");
        let mut config = Config::new();
        config.recovery.notify_channel = Some(42);
        config.files.critical = vec![PathBuf::from("main.py")];

        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn memory_only_store_survives_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("immunity.toml");
        let mut config = Config::new();
        config.persistence.store_path = PathBuf::new();

        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.persistence.store_file(), None);
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_is_rejected() {
        let dir = tempdir().unwrap();
        let err = Config::load(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));
    }

    #[test]
    fn retain_above_cap_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("immunity.toml");
        std::fs::write(&path, "[recovery]\nhistory_cap = 10\nhistory_retain = 20\n").unwrap();
        assert!(matches!(
            Config::load(&path).unwrap_err(),
            Error::InvalidValue { field: "recovery.history_retain", .. }
        ));
    }

    #[test]
    fn resolve_joins_relative_paths() {
        let mut config = Config::new();
        config.files.root = PathBuf::from("/srv/bot");
        assert_eq!(config.resolve("backups"), PathBuf::from("/srv/bot/backups"));
        assert_eq!(config.resolve("/var/log/bot.log"), PathBuf::from("/var/log/bot.log"));
    }
}
