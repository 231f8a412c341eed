//! Task identifiers.
//!
//! タスク ID は文字列。呼び出し側が任意の ID（例: `custom-001`）を指定でき、
//! 空の場合は push 時に `IdGenerator` が採番します。

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a Task.
///
/// Generated ids look like `task-01J9ZQ4X6M8N2R5T7V9W1Y3A5C`: a prefix followed
/// by a ULID (48-bit millisecond timestamp + 80 random bits).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty id means "not assigned yet".
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
