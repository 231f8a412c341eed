//! Execution output: common result shape for every runnable kind.
//!
//! Process-backed runnables fill `stdout` / `stderr` / `exit_code`; function
//! runnables fill `result` or `error`. `completed` is the single flag the
//! queue reads to decide between `totalProcessed` and `totalFailed`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub completed: bool,
}

impl ExecutionOutput {
    /// A function returned a value.
    pub fn value(result: Value) -> Self {
        Self {
            result: Some(result),
            completed: true,
            ..Default::default()
        }
    }

    /// A function reported an error; the call itself still resolves.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            completed: false,
            ..Default::default()
        }
    }

    /// Captured output of a finished process. `exit_code` is `None` when the
    /// process was killed by a signal.
    pub fn process(stdout: String, stderr: String, exit_code: Option<i32>) -> Self {
        let completed = exit_code == Some(0);
        let error = if completed {
            None
        } else if !stderr.is_empty() {
            Some(stderr.clone())
        } else {
            Some(match exit_code {
                Some(code) => format!("process exited with status {code}"),
                None => "process terminated by signal".to_string(),
            })
        };
        Self {
            stdout: Some(stdout),
            stderr: Some(stderr),
            exit_code,
            result: None,
            error,
            completed,
        }
    }

    /// The process could not be started at all.
    pub fn spawn_failure(error: impl Into<String>) -> Self {
        Self {
            exit_code: Some(-1),
            error: Some(error.into()),
            completed: false,
            ..Default::default()
        }
    }

    /// Value written to `task.result` on success.
    pub fn summary(&self) -> Value {
        if let Some(result) = &self.result {
            return result.clone();
        }
        json!({
            "stdout": self.stdout,
            "stderr": self.stderr,
            "exitCode": self.exit_code,
        })
    }
}
