use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Abnormal conditions reported by the diagnostic checks.
///
/// The set is closed so that every problem has an exhaustively matched fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Problem {
    /// The gateway session is not established.
    Disconnected,
    /// The session exists but the self-lookup call failed.
    ConnectionError,
    MissingFiles,
    EmptyFiles,
    /// The file system check itself failed.
    FileError,
    HighMemory,
    MediumMemory,
    /// Memory introspection is present but returned garbage.
    MemoryError,
    /// The host exposes no command registry.
    NoCommands,
    EmptyCommands,
    NoListeners,
    /// No collaborator of a feature subsystem is present on the host.
    SubsystemMissing,
    /// The check itself failed.
    #[serde(rename = "error")]
    CheckFailed,
}

impl Problem {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::ConnectionError => "connection_error",
            Self::MissingFiles => "missing_files",
            Self::EmptyFiles => "empty_files",
            Self::FileError => "file_error",
            Self::HighMemory => "high_memory",
            Self::MediumMemory => "medium_memory",
            Self::MemoryError => "memory_error",
            Self::NoCommands => "no_commands",
            Self::EmptyCommands => "empty_commands",
            Self::NoListeners => "no_listeners",
            Self::SubsystemMissing => "subsystem_missing",
            Self::CheckFailed => "error",
        }
    }

    /// Whether the problem is about the critical files on disk.
    pub fn is_file_related(self) -> bool {
        matches!(self, Self::MissingFiles | Self::EmptyFiles | Self::FileError)
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Defects the integrity guard detects in a single critical file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileProblem {
    #[serde(rename = "missing_file")]
    Missing,
    /// Any I/O error other than not-found or bad encoding.
    #[serde(rename = "read_error")]
    Unreadable,
    /// No content besides whitespace.
    #[serde(rename = "empty_file")]
    Empty,
    /// Not valid UTF-8.
    #[serde(rename = "encoding_error")]
    Encoding,
    /// A code file without a single declaration token.
    InvalidStructure,
}

impl FileProblem {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing_file",
            Self::Unreadable => "read_error",
            Self::Empty => "empty_file",
            Self::Encoding => "encoding_error",
            Self::InvalidStructure => "invalid_structure",
        }
    }
}

impl fmt::Display for FileProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state of a monitored subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HealthStatus {
    #[default]
    Healthy,
    /// The last repair succeeded and no check has run since.
    Fixed,
    Problem(Problem),
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Fixed => "fixed",
            Self::Problem(problem) => problem.as_str(),
        }
    }

    pub fn problem(&self) -> Option<Problem> {
        match self {
            Self::Problem(problem) => Some(*problem),
            Self::Healthy | Self::Fixed => None,
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl From<Problem> for HealthStatus {
    fn from(problem: Problem) -> Self {
        Self::Problem(problem)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for HealthStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
