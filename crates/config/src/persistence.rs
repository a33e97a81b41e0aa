#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Persistence {
    /// Key-value store file. An empty path keeps the store in memory.
    pub store_path: PathBuf,

    /// JSON array of the most recent recovery log entries.
    pub journal_path: PathBuf,

    /// Log files watched by the log size sweep.
    pub log_files: Vec<PathBuf>,

    /// A single watched log larger than this is archived and truncated.
    pub archive_threshold: u64,

    /// Combined size of the watched logs that triggers archiving all of them.
    pub total_archive_threshold: u64,
}

impl Default for Persistence {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("smart_data.json"),
            journal_path: PathBuf::from("recovery_log.json"),
            log_files: vec![PathBuf::from("bot.log"), PathBuf::from("recovery_log.json")],
            archive_threshold: 10 * 1024 * 1024,
            total_archive_threshold: 50 * 1024 * 1024,
        }
    }
}

impl Persistence {
    /// The store file, or `None` for a memory-only store.
    pub fn store_file(&self) -> Option<&Path> {
        (!self.store_path.as_os_str().is_empty()).then_some(self.store_path.as_path())
    }
}
