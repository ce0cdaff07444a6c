//! Error types for macroharvest.
//!
//! Library crates use [`HarvestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Per-candidate failures (fetch, store) never surface here: the pipeline
//! folds them into a [`crate::Note`]. A `HarvestError` means the run itself
//! could not start or could not be drained.

use std::path::PathBuf;

/// Top-level error type for all macroharvest operations.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching a candidate.
    #[error("network error: {0}")]
    Network(String),

    /// Content store failure other than "already exists".
    #[error("storage error: {0}")]
    Storage(String),

    /// Worker pool bookkeeping failure (lost completion markers, closed channels).
    #[error("worker error: {0}")]
    Worker(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid input (batch size, digest format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Report serialization error.
    #[error("report error: {0}")]
    Report(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HarvestError>;

impl HarvestError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
