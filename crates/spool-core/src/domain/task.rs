//! Task: the unit of work stored in a queue document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Priority, TaskId};

/// `data` tasks carry an opaque payload; `runnable` tasks carry an
/// execution descriptor.
///
/// Any unrecognised `type` string reads as `data`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Runnable,
    #[default]
    #[serde(other)]
    Data,
}

/// Lifecycle state of a task.
///
/// State transitions:
/// - pending -> working (pop / start)
/// - working -> pending (restart)
/// - working -> completed | failed (execution, complete)
/// - pending -> completed (complete by id)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Working,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Working => "working",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution descriptor of a runnable task, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Runnable {
    /// Shell command line plus arguments.
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
    /// Script file, resolved against the executor's working directory.
    Script {
        path: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
    /// Named function from the executor's function registry.
    Function {
        function: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<Value>,
    },
}

/// What is stored under `runnable`.
///
/// Documents are hand-editable, so a descriptor with a `type` we do not know
/// must still load; it is rejected when the task is executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunnableSpec {
    Known(Runnable),
    Unrecognized {
        #[serde(rename = "type")]
        kind: String,
        #[serde(flatten)]
        fields: serde_json::Map<String, Value>,
    },
}

impl RunnableSpec {
    /// Decode error for a descriptor whose `type` is one we run but whose
    /// fields do not fit it, e.g. `{"type": "command"}` with no `command`.
    pub fn malformed_reason(&self) -> Option<String> {
        let RunnableSpec::Unrecognized { kind, fields } = self else {
            return None;
        };
        if !matches!(kind.as_str(), "command" | "script" | "function") {
            return None;
        }
        let mut raw = fields.clone();
        raw.insert("type".to_string(), Value::String(kind.clone()));
        serde_json::from_value::<Runnable>(Value::Object(raw))
            .err()
            .map(|e| e.to_string())
    }
}

impl From<Runnable> for RunnableSpec {
    fn from(r: Runnable) -> Self {
        RunnableSpec::Known(r)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: TaskId,

    #[serde(rename = "type", default)]
    pub kind: TaskKind,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub content: Value,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runnable: Option<RunnableSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A `data` task with an opaque payload.
    pub fn data(content: Value) -> Self {
        Self {
            id: TaskId::default(),
            kind: TaskKind::Data,
            priority: Priority::default(),
            content,
            status: TaskStatus::Pending,
            runnable: None,
            result: None,
            error: None,
            created_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// A `runnable` task.
    pub fn runnable(content: Value, runnable: Runnable) -> Self {
        let mut task = Self::data(content);
        task.kind = TaskKind::Runnable;
        task.runnable = Some(runnable.into());
        task
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn is_runnable(&self) -> bool {
        self.kind == TaskKind::Runnable
    }

    /// Display title: `content.title`, or the content itself when it is a string.
    pub fn title(&self) -> &str {
        match &self.content {
            Value::String(s) => s,
            other => other.get("title").and_then(Value::as_str).unwrap_or(""),
        }
    }

    /// Mark as working (occupies the working slot).
    pub fn mark_working(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Working;
        self.started_at = Some(now);
    }

    /// Back to pending (released from the working slot).
    pub fn mark_pending(&mut self) {
        self.status = TaskStatus::Pending;
        self.started_at = None;
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>, result: Option<Value>) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        if result.is_some() {
            self.result = result;
        }
        self.error = None;
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>, error: String) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(now);
        self.error = Some(error);
    }
}
