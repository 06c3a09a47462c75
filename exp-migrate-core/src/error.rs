//! Error types for the exp-migrate core library.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Top-level error type for migration operations.
///
/// Every variant except those wrapped by the event-stream decoder is fatal:
/// the pipelines stop at the first error and leave later experiments untouched.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Missing {kind}: {}", path.display())]
    MissingArtifact { kind: &'static str, path: PathBuf },

    #[error("Expected a single event-stream file in {}, found {count}", dir.display())]
    EventFileCount { dir: PathBuf, count: usize },

    #[error(
        "Unexpected {kind} record #{index} in {} (tag '{tag}'), inspect the stream manually",
        file.display()
    )]
    UnexpectedRecord {
        file: PathBuf,
        index: usize,
        tag: String,
        kind: &'static str,
    },

    #[error("Checkpoint marker '{tag}' not found in log")]
    MarkerNotFound { tag: String },

    #[error("Checkpoint marker '{tag}' found {count} times in log, expected exactly one")]
    AmbiguousMarker { tag: String, count: usize },

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl MigrateError {
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    pub fn missing(kind: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::MissingArtifact {
            kind,
            path: path.into(),
        }
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<Box<figment::Error>> for MigrateError {
    fn from(err: Box<figment::Error>) -> Self {
        Self::Config(err.to_string())
    }
}
