//! Error type shared by the evaluator, builder, loader and engine.

use tsalarm_core::{AlarmError, TimeInterval};

/// Errors that can occur while building, loading or running tests.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Document validation error (missing fields, bad references, arity).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Filesystem watcher error.
    #[error("Notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The series bound to one test do not share a sampling interval.
    #[error("test '{test_id}' mixes sampling intervals {first} and {second}")]
    IntervalMismatch {
        test_id: String,
        first: TimeInterval,
        second: TimeInterval,
    },

    /// A pass was interrupted between sample steps.
    #[error("evaluation cancelled")]
    Cancelled,

    #[error(transparent)]
    Core(#[from] AlarmError),
}

/// Result alias for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;
