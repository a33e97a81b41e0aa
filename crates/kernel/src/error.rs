use std::path::PathBuf;

/// Represents all possible errors that can occur in this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error occurred while reading or writing a file.
    #[error("I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Error occurred while encoding or decoding persisted JSON.
    #[error("JSON (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The path is invalid.
    #[error("Path is invalid: {0}")]
    InvalidPath(PathBuf),

    /// A persisted store file whose top level is not a JSON object.
    #[error("{0} does not hold a JSON object")]
    NotAnObject(PathBuf),

    /// None of the fallback encodings could decode the file.
    #[error("No known encoding decodes {0}")]
    Undecodable(PathBuf),

    /// A repair produced content that still fails the plausibility check.
    #[error("Repaired content of {0} is still implausible")]
    Implausible(PathBuf),

    /// No snapshot holds a usable copy of the file.
    #[error("No valid backup of {0}")]
    NoBackup(PathBuf),
}
