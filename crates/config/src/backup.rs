#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Backup {
    /// Snapshot root, relative to `files.root` unless absolute.
    pub dir: PathBuf,

    /// Number of snapshots kept after pruning.
    pub keep: usize,
}

impl Default for Backup {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("backups"),
            keep: 10,
        }
    }
}
