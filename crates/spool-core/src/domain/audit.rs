//! Audit log entries.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Priority, Task, TaskId};

/// Queue operations recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Push,
    Pop,
    StartWork,
    Complete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Push => "PUSH",
            Operation::Pop => "POP",
            Operation::StartWork => "START_WORK",
            Operation::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket sizes at the instant an operation was logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub queue_sizes: BTreeMap<String, usize>,
    /// 0 or 1.
    pub working: usize,
    pub completed: usize,
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: Operation,
    pub task_id: TaskId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
    #[serde(default)]
    pub snapshot: QueueSnapshot,
}

impl LogEntry {
    pub fn new(
        timestamp: DateTime<Utc>,
        operation: Operation,
        task: &Task,
        details: Value,
        snapshot: QueueSnapshot,
    ) -> Self {
        Self {
            timestamp,
            operation,
            task_id: task.id.clone(),
            title: task.title().to_string(),
            priority: task.priority.clone(),
            details,
            snapshot,
        }
    }
}
