#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The critical files guarded by the integrity checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Files {
    /// Directory every relative path in the configuration is resolved against.
    pub root: PathBuf,

    /// Files the host process cannot run without.
    pub critical: Vec<PathBuf>,

    /// Extensions (without the dot) of files held to the declaration check.
    pub code_extensions: Vec<String>,

    /// A code file containing none of these is structurally implausible.
    pub declaration_tokens: Vec<String>,
}

impl Default for Files {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            critical: [
                "config.py",
                "bot.py",
                "main.py",
                "requirements.txt",
                "role_system.py",
                "moderation_logs.py",
                "smart_protection_system.py",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
            code_extensions: vec!["py".into()],
            declaration_tokens: vec!["import".into(), "class".into(), "def".into()],
        }
    }
}
