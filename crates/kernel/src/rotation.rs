use crate::Error;
use chrono::{DateTime, Utc};
use config::Config;
use humansize::{BINARY, format_size};
use std::{
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

/// Copy `path` to `<name>.<timestamp>.bak` beside it, then truncate it.
///
/// Returns `None` when there is nothing to archive.
pub fn archive_log(path: impl AsRef<Path>, now: DateTime<Utc>) -> Result<Option<PathBuf>, Error> {
    let path = path.as_ref();
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return Err(Error::InvalidPath(path.to_path_buf()));
    };
    if !path.is_file() {
        return Ok(None);
    }
    let archived = path.with_file_name(format!("{name}.{}.bak", now.format("%Y%m%d_%H%M%S")));
    fs::copy(path, &archived)?;
    OpenOptions::new().write(true).truncate(true).open(path)?;
    Ok(Some(archived))
}

/// Size limits on the watched log files.
#[derive(Debug, Clone)]
pub struct LogRotation {
    files: Vec<PathBuf>,
    threshold: u64,
    total_threshold: u64,
}

impl LogRotation {
    pub fn new(files: Vec<PathBuf>, threshold: u64, total_threshold: u64) -> Self {
        Self {
            files,
            threshold,
            total_threshold,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config
                .persistence
                .log_files
                .iter()
                .map(|file| config.resolve(file))
                .collect(),
            config.persistence.archive_threshold,
            config.persistence.total_archive_threshold,
        )
    }

    fn size(path: &Path) -> u64 {
        match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => 0,
            Err(err) => {
                warn!(?path, %err, "cannot stat log file");
                0
            }
        }
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|file| Self::size(file)).sum()
    }

    /// Archive every watched log above the per-file threshold.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<PathBuf> {
        self.archive_where(now, |size| size > self.threshold)
    }

    /// Archive every non-empty watched log when their combined size is above
    /// the total threshold.
    pub fn sweep_total(&self, now: DateTime<Utc>) -> Vec<PathBuf> {
        let total = self.total_size();
        if total <= self.total_threshold {
            return Vec::new();
        }
        info!(total = %format_size(total, BINARY), "log files over total budget");
        self.archive_where(now, |size| size > 0)
    }

    fn archive_where(&self, now: DateTime<Utc>, pred: impl Fn(u64) -> bool) -> Vec<PathBuf> {
        let mut archived = Vec::new();
        for file in &self.files {
            let size = Self::size(file);
            if !pred(size) {
                continue;
            }
            match archive_log(file, now) {
                Ok(Some(path)) => {
                    info!(?file, size = %format_size(size, BINARY), to = ?path, "log archived");
                    archived.push(path);
                }
                Ok(None) => {}
                Err(err) => warn!(?file, %err, "failed to archive log"),
            }
        }
        archived
    }
}
