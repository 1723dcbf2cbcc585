// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Error types and the closed classification taxonomy.
//!
//! Every raw failure in the engine maps onto [`ErrorKind`], a closed set that
//! drives three consumers: the tool invoker's retry decision, the executor's
//! safe-to-fail handling, and the learning signals attached to traces.
//! [`TaskError`] is the structured, serializable form stored on task results
//! and carried over the event wire.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Convenience result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Closed error taxonomy.
///
/// The set is deliberately small and closed: retry policy and learning both
/// depend on exhaustive matches over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, schema mismatch, graph validation failure.
    Validation,
    /// Referenced tool, task, or checkpoint does not exist.
    NotFound,
    /// Transport-level failure reaching a tool server.
    Network,
    /// Deadline expired before the operation completed.
    Timeout,
    /// Capability or approval denied.
    Permission,
    /// Failure inside tool or sandboxed code execution.
    Runtime,
    /// The tool itself reported a failure for a well-formed call.
    ToolRejected,
}

impl ErrorKind {
    /// Whether the invoker may retry a failure of this kind.
    ///
    /// Only transient transport conditions qualify. Everything else is either
    /// deterministic (validation, permission) or unsafe to repeat blindly.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Timeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Permission => "permission",
            ErrorKind::Runtime => "runtime",
            ErrorKind::ToolRejected => "tool_rejected",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured task failure stored on [`crate::task::TaskResult`] and carried
/// in `task_error` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct TaskError {
    /// Classified failure category.
    pub kind: ErrorKind,
    /// Human-readable description, sanitized before persistence.
    pub message: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(deadline: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("deadline of {deadline:?} expired"),
        )
    }
}

/// Engine error type.
///
/// Fatal conditions are propagated as values; unwinding is reserved for
/// programmer errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Input failed validation before any execution started.
    #[error("validation error: {0}")]
    Validation(String),

    /// A task names a dependency that is not part of the graph.
    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    /// A reference argument points at a task outside the declared dependencies.
    #[error("task '{task}' references '{reference}' which is not in its depends_on set")]
    ReferenceOutsideDependencies { task: String, reference: String },

    /// Two tasks were admitted with the same id.
    #[error("duplicate task id '{0}'")]
    DuplicateTask(String),

    /// The dependency relation contains a cycle. `remaining` is the residual
    /// set that could not be layered.
    #[error("task graph contains a cycle; unresolved tasks: {remaining:?}")]
    CyclicGraph { remaining: Vec<String> },

    /// A deadline expired.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure reaching a tool server.
    #[error("transport error: {0}")]
    Transport(String),

    /// A tool reported failure for a well-formed call.
    #[error("tool rejected call: {0}")]
    ToolRejected(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A capability was denied.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Sandboxed code execution failed.
    #[error("sandbox error: {0}")]
    Sandbox(String),

    /// Checkpoint persistence failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// A stored checkpoint failed its integrity check.
    #[error("checkpoint integrity: {0}")]
    CheckpointIntegrity(String),

    /// The workflow was aborted by an external command or fatal task failure.
    #[error("workflow aborted: {0}")]
    Aborted(String),

    /// A task with side effects failed; the workflow cannot continue.
    #[error("fatal task failure in '{task_id}': {error}")]
    FatalTask { task_id: String, error: TaskError },

    /// The replan budget for this workflow is exhausted.
    #[error("replan limit of {0} reached")]
    ReplanLimit(u32),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invariant violation inside the engine itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error into the closed taxonomy.
    ///
    /// This is the single mapping point from raw failures to the categories
    /// retry and learning operate on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_)
            | Error::UnknownDependency { .. }
            | Error::ReferenceOutsideDependencies { .. }
            | Error::DuplicateTask(_)
            | Error::CyclicGraph { .. }
            | Error::Serialization(_) => ErrorKind::Validation,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Transport(_) => ErrorKind::Network,
            Error::ToolRejected(_) => ErrorKind::ToolRejected,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Permission(_) => ErrorKind::Permission,
            Error::FatalTask { error, .. } => error.kind,
            Error::Sandbox(_)
            | Error::Checkpoint(_)
            | Error::CheckpointIntegrity(_)
            | Error::Aborted(_)
            | Error::ReplanLimit(_)
            | Error::Internal(_) => ErrorKind::Runtime,
        }
    }

    /// Convert into the serializable task-level form.
    pub fn into_task_error(self) -> TaskError {
        TaskError::new(self.kind(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds_are_exactly_network_and_timeout() {
        let retryable: Vec<ErrorKind> = [
            ErrorKind::Validation,
            ErrorKind::NotFound,
            ErrorKind::Network,
            ErrorKind::Timeout,
            ErrorKind::Permission,
            ErrorKind::Runtime,
            ErrorKind::ToolRejected,
        ]
        .into_iter()
        .filter(|k| k.is_retryable())
        .collect();
        assert_eq!(retryable, vec![ErrorKind::Network, ErrorKind::Timeout]);
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ToolRejected).unwrap();
        assert_eq!(json, "\"tool_rejected\"");
    }

    #[test]
    fn classification_covers_graph_errors_as_validation() {
        let err = Error::CyclicGraph {
            remaining: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn fatal_task_inherits_inner_kind() {
        let err = Error::FatalTask {
            task_id: "deploy".into(),
            error: TaskError::new(ErrorKind::Permission, "denied"),
        };
        assert_eq!(err.kind(), ErrorKind::Permission);
    }

    #[test]
    fn task_error_round_trips_through_json() {
        let err = TaskError::new(ErrorKind::Network, "connection reset");
        let json = serde_json::to_string(&err).unwrap();
        let back: TaskError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
