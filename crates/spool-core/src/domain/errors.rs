//! Errors - エラー型と分類
//!
//! - `QueueError`: queue operations (persistence, lookup, slot exclusivity)
//! - `ExecutionError`: runnable execution (not-found, process failure)
//! - `IdError`: id generation validation, raised before any mutation
//!
//! Empty buckets are never an error: selection returns `None` instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::{ExecutionOutput, TaskId};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not a valid queue document: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode json: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("working slot is occupied by {0}")]
    SlotOccupied(TaskId),

    #[error("task id already in use: {0}")]
    DuplicateTaskId(TaskId),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Id(#[from] IdError),
}

/// Failure to execute a runnable.
///
/// Function handlers that fail do NOT produce this: their error is carried in
/// `ExecutionOutput { completed: false, .. }`.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("task is not runnable or missing runnable configuration")]
    NotRunnable,

    #[error("unknown runnable type: {0}")]
    UnknownRunnableType(String),

    #[error("malformed {kind} runnable: {reason}")]
    MalformedRunnable { kind: String, reason: String },

    #[error("function not registered: {0}")]
    FunctionNotRegistered(String),

    #[error("script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    #[error("failed to make script executable {}: {source}", .path.display())]
    ScriptPermissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}", failure_message(.output))]
    CommandFailed { output: ExecutionOutput },
}

impl ExecutionError {
    /// Captured process output, when the failure came from a process.
    pub fn output(&self) -> Option<&ExecutionOutput> {
        match self {
            ExecutionError::CommandFailed { output } => Some(output),
            _ => None,
        }
    }
}

fn failure_message(output: &ExecutionOutput) -> String {
    let detail = output.error.as_deref().unwrap_or("execution failed");
    match output.exit_code {
        Some(code) => format!("command failed (exit code {code}): {detail}"),
        None => format!("command failed: {detail}"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("invalid id prefix {0:?}: expected [a-z][a-z0-9_-]{{0,31}}")]
    InvalidPrefix(String),

    #[error("timestamp {0}ms is outside the representable range")]
    TimestampOutOfRange(i64),
}
