use core::result::Result as CoreResult;
use std::io::Error as IoError;

use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlDeError;
use toml::ser::Error as TomlSerError;

use crate::types::{StrategyKind, TaskId};

/// Result type for engine operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur while selecting, running or switching strategies.
#[derive(Debug, Error)]
pub enum Error {
    /// The work primitive reported a failure for one task.
    #[error("Task {task_id} failed: {message}")]
    TaskFailed {
        /// Task whose invocation failed
        task_id: TaskId,
        /// Failure reported by the work primitive
        message: String,
    },

    /// The work primitive did not finish within `StrategyParams::timeout_seconds`.
    #[error("Task {task_id} timed out after {seconds}s")]
    Timeout {
        /// Task whose invocation timed out
        task_id: TaskId,
        /// Timeout that was applied
        seconds: f64,
    },

    /// Failed items reached the retry limit and the run was aborted.
    #[error("Retry limit of {limit} reached with {failed} failed items")]
    RetryLimitExceeded {
        /// Configured retry limit
        limit: usize,
        /// Failed items at the time of the abort
        failed: usize,
        /// Item failure that triggered the abort
        #[source]
        source: Box<Error>,
    },

    /// Strategy selection was attempted with nothing registered.
    #[error("No execution strategies are registered")]
    EmptyRegistry,

    /// A specific strategy was requested but is not registered.
    #[error("Strategy not registered: {0}")]
    StrategyNotRegistered(StrategyKind),

    /// Strategy parameters are out of range.
    #[error("Invalid strategy parameters: {0}")]
    InvalidParams(String),

    /// A checkpoint was recorded for a position outside the run.
    #[error("Checkpoint index {index} out of range for {total} steps")]
    CheckpointOutOfRange {
        /// Offending position
        index: usize,
        /// Steps in the run
        total: usize,
    },

    /// Carried progress does not describe the batch being executed.
    #[error("Progress covers {expected} steps but the batch has {actual} tasks")]
    ProgressMismatch {
        /// Steps recorded in the progress
        expected: usize,
        /// Tasks in the batch
        actual: usize,
    },

    /// The concurrency limiter was closed while an operation waited on it.
    #[error("Concurrency limiter closed: {0}")]
    LimiterClosed(String),

    /// An in-flight operation panicked or was aborted outside cancellation.
    #[error("In-flight operation failed to join: {0}")]
    Join(String),

    /// An executor stopped early without a strategy to switch to.
    #[error("Execution was interrupted without a switch target")]
    Interrupted,

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] TomlDeError),

    /// TOML serialization failed.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] TomlSerError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Creates a per-item failure for `task_id`.
    pub fn task_failed(task_id: TaskId, message: impl Into<String>) -> Self {
        Self::TaskFailed {
            task_id,
            message: message.into(),
        }
    }

    /// Returns `true` for failures scoped to a single task.
    ///
    /// Timeouts count as item failures for retry and abort purposes.
    pub fn is_item_failure(&self) -> bool {
        matches!(self, Self::TaskFailed { .. } | Self::Timeout { .. })
    }

    /// Returns `true` when the run was aborted by the retry limit.
    pub fn is_retry_limit(&self) -> bool {
        matches!(self, Self::RetryLimitExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let task_id = TaskId::new();
        let error = Error::task_failed(task_id, "model refused");
        assert_eq!(
            error.to_string(),
            format!("Task {task_id} failed: model refused")
        );

        let empty = Error::EmptyRegistry;
        assert_eq!(empty.to_string(), "No execution strategies are registered");
    }

    #[test]
    fn test_retry_limit_keeps_trigger_as_source() {
        let task_id = TaskId::new();
        let error = Error::RetryLimitExceeded {
            limit: 2,
            failed: 2,
            source: Box::new(Error::Timeout {
                task_id,
                seconds: 1.5,
            }),
        };

        assert!(error.is_retry_limit());
        assert!(!error.is_item_failure());
        let source = match error.source() {
            Some(source) => source.to_string(),
            None => panic!("retry limit error should expose its trigger"),
        };
        assert!(source.contains("timed out"));
    }

    #[test]
    fn test_item_failure_classification() {
        let task_id = TaskId::new();
        assert!(Error::task_failed(task_id, "boom").is_item_failure());
        assert!(
            Error::Timeout {
                task_id,
                seconds: 1.0
            }
            .is_item_failure()
        );
        assert!(!Error::Interrupted.is_item_failure());
        assert!(!Error::Config("bad".to_owned()).is_item_failure());
    }
}
