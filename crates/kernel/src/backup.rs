use crate::{Error, utils::TextRules};
use chrono::{DateTime, TimeDelta, Utc};
use config::Config;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

/// Prefix of every snapshot directory name.
pub const SNAPSHOT_PREFIX: &str = "backup_";

/// Metadata file written to the backup root after each snapshot.
pub const METADATA_FILE: &str = "config_backup.json";

// fixed width, so lexicographic order is chronological order
const SNAPSHOT_FORMAT: &str = "%Y%m%d_%H%M%S_%9f";

/// A snapshot directory and the files it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSnapshot {
    pub id: String,
    pub path: PathBuf,
    /// Relative file name to the copy inside the snapshot.
    pub files: BTreeMap<PathBuf, PathBuf>,
}

#[derive(Debug, Serialize)]
struct SnapshotMetadata<'a> {
    timestamp: DateTime<Utc>,
    snapshot: &'a str,
    version: &'static str,
    platform: &'static str,
    files_backed_up: usize,
}

/// Timestamped copies of the critical files under one backup root.
#[derive(Debug, Clone)]
pub struct BackupArchive {
    root: PathBuf,
    files_root: PathBuf,
    critical: Vec<PathBuf>,
    keep: usize,
    rules: TextRules,
    // snapshot, prune and restore never interleave
    lock: Arc<Mutex<()>>,
}

impl BackupArchive {
    pub fn new(
        root: impl Into<PathBuf>,
        files_root: impl Into<PathBuf>,
        critical: Vec<PathBuf>,
        keep: usize,
        rules: TextRules,
    ) -> Self {
        Self {
            root: root.into(),
            files_root: files_root.into(),
            critical,
            keep: keep.max(1),
            rules,
            lock: Arc::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.resolve(&config.backup.dir),
            config.files.root.clone(),
            config.files.critical.clone(),
            config.backup.keep,
            TextRules::from_config(&config.files),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy every existing critical file into a new snapshot, write the
    /// metadata file, then prune to the configured retention.
    pub fn snapshot(&self) -> Result<BackupSnapshot, Error> {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Result<BackupSnapshot, Error> {
        let _guard = self.lock.lock();
        fs::create_dir_all(&self.root)?;

        let (id, path) = self.fresh_dir(now);
        fs::create_dir(&path)?;

        let mut files = BTreeMap::new();
        for relative in &self.critical {
            let source = self.files_root.join(relative);
            if !source.is_file() {
                debug!(file = ?relative, "not present, left out of snapshot");
                continue;
            }
            let target = path.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&source, &target)?;
            files.insert(relative.clone(), target);
        }

        let metadata = SnapshotMetadata {
            timestamp: now,
            snapshot: &id,
            version: env!("CARGO_PKG_VERSION"),
            platform: std::env::consts::OS,
            files_backed_up: files.len(),
        };
        fs::write(self.root.join(METADATA_FILE), serde_json::to_vec_pretty(&metadata)?)?;
        info!(snapshot = %id, files = files.len(), "backup created");

        let snapshot = BackupSnapshot { id, path, files };
        self.prune_locked(self.keep)?;
        Ok(snapshot)
    }

    fn fresh_dir(&self, mut now: DateTime<Utc>) -> (String, PathBuf) {
        loop {
            let id = format!("{SNAPSHOT_PREFIX}{}", now.format(SNAPSHOT_FORMAT));
            let path = self.root.join(&id);
            if !path.exists() {
                return (id, path);
            }
            now += TimeDelta::nanoseconds(1);
        }
    }

    /// Snapshots oldest first.
    pub fn list(&self) -> Result<Vec<BackupSnapshot>, Error> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(id) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if !id.starts_with(SNAPSHOT_PREFIX) || !entry.file_type()?.is_dir() {
                continue;
            }
            let path = entry.path();
            let files = self
                .critical
                .iter()
                .map(|relative| (relative.clone(), path.join(relative)))
                .filter(|(_, copy)| copy.is_file())
                .collect();
            snapshots.push(BackupSnapshot { id, path, files });
        }
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(snapshots)
    }

    /// Delete all but the newest `keep` snapshots. Returns how many were removed.
    pub fn prune(&self, keep: usize) -> Result<usize, Error> {
        let _guard = self.lock.lock();
        self.prune_locked(keep)
    }

    fn prune_locked(&self, keep: usize) -> Result<usize, Error> {
        let snapshots = self.list()?;
        let excess = snapshots.len().saturating_sub(keep);
        for snapshot in &snapshots[..excess] {
            fs::remove_dir_all(&snapshot.path)?;
            debug!(snapshot = %snapshot.id, "old backup removed");
        }
        Ok(excess)
    }

    /// Newest snapshot copy of `file` that is readable text and plausible.
    pub fn find_latest_valid(&self, file: impl AsRef<Path>) -> Option<PathBuf> {
        let file = file.as_ref();
        let snapshots = match self.list() {
            Ok(snapshots) => snapshots,
            Err(err) => {
                warn!(%err, "cannot list backups");
                return None;
            }
        };
        snapshots.into_iter().rev().find_map(|snapshot| {
            let copy = snapshot.path.join(file);
            let content = fs::read_to_string(&copy).ok()?;
            self.rules.is_plausible(file, &content).then_some(copy)
        })
    }

    /// Copy the newest valid backup of `file` over `dest`.
    pub fn restore(&self, file: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<PathBuf, Error> {
        let file = file.as_ref();
        let dest = dest.as_ref();
        let _guard = self.lock.lock();
        let source = self
            .find_latest_valid(file)
            .ok_or_else(|| Error::NoBackup(file.to_path_buf()))?;
        if let Some(parent) = dest.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&source, dest)?;
        info!(file = ?file, from = ?source, "restored from backup");
        Ok(source)
    }

    pub fn count(&self) -> usize {
        self.list().map_or(0, |snapshots| snapshots.len())
    }
}
