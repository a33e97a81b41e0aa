use crate::{Error, utils::write_atomic};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, warn};

/// Entries kept in the recovery log; older ones are evicted first.
pub const JOURNAL_CAP: usize = 100;

/// One repair, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryLogEntry {
    pub timestamp: DateTime<Utc>,

    /// File path or subsystem name the action was taken on.
    pub subject: String,

    /// Problem code that triggered the action.
    pub problem: String,

    pub action: String,

    pub success: bool,
}

impl RecoveryLogEntry {
    pub fn new(
        subject: impl Into<String>,
        problem: impl Into<String>,
        action: impl Into<String>,
        success: bool,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            subject: subject.into(),
            problem: problem.into(),
            action: action.into(),
            success,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryLogStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub last: Option<RecoveryLogEntry>,
}

#[derive(Debug, Default)]
struct JournalInner {
    path: Option<PathBuf>,
    entries: VecDeque<RecoveryLogEntry>,
}

impl JournalInner {
    fn flush(&self) -> Result<(), Error> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(&self.entries)?;
        write_atomic(path, &bytes)?;
        Ok(())
    }
}

/// Append-only log of repair outcomes, persisted as a JSON array.
#[derive(Debug, Clone, Default)]
pub struct RecoveryLog {
    inner: Arc<Mutex<JournalInner>>,
}

impl RecoveryLog {
    /// Load the log at `path`. A missing or corrupt file starts an empty log.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match load(&path) {
            Ok(entries) => entries,
            Err(Error::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                debug!(?path, "no recovery log yet");
                VecDeque::new()
            }
            Err(err) => {
                warn!(?path, %err, "recovery log unreadable, starting empty");
                VecDeque::new()
            }
        };
        Self {
            inner: Arc::new(Mutex::new(JournalInner {
                path: Some(path),
                entries,
            })),
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: RecoveryLogEntry) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.entries.push_back(entry);
        while inner.entries.len() > JOURNAL_CAP {
            inner.entries.pop_front();
        }
        inner.flush()
    }

    /// Append, logging instead of returning a write failure.
    pub fn record(
        &self,
        subject: impl Into<String>,
        problem: impl Into<String>,
        action: impl Into<String>,
        success: bool,
    ) {
        let entry = RecoveryLogEntry::new(subject, problem, action, success);
        if let Err(err) = self.append(entry) {
            warn!(%err, "failed to persist recovery log");
        }
    }

    /// Entries oldest first.
    pub fn entries(&self) -> Vec<RecoveryLogEntry> {
        self.inner.lock().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RecoveryLogStats {
        let inner = self.inner.lock();
        let successful = inner.entries.iter().filter(|entry| entry.success).count();
        RecoveryLogStats {
            total: inner.entries.len(),
            successful,
            failed: inner.entries.len() - successful,
            last: inner.entries.back().cloned(),
        }
    }
}

fn load(path: &Path) -> Result<VecDeque<RecoveryLogEntry>, Error> {
    let bytes = fs::read(path)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(VecDeque::new());
    }
    let mut entries: VecDeque<RecoveryLogEntry> = serde_json::from_slice(&bytes)?;
    while entries.len() > JOURNAL_CAP {
        entries.pop_front();
    }
    Ok(entries)
}
