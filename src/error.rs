// src/error.rs

use std::path::PathBuf;

use thiserror::Error;

/// Setup-time failures. These are the only errors that abort a run; every
/// per-candidate problem is absorbed into statistics and the event stream.
#[derive(Debug, Error)]
pub enum CleanError {
    #[error("failed to read configuration {path}: {source}")]
    ConfigUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    ConfigInvalid(#[from] serde_json::Error),

    #[error("invalid protection pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("invalid option {name}: {message}")]
    InvalidOption { name: &'static str, message: String },

    #[error("none of the configured roots could be resolved")]
    NoRoots,

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),

    #[error("failed to write report {path}: {source}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("run task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, CleanError>;
