//! Queue configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::DEFAULT_DISPLAY_LIMIT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// When a runnable picked up by push/pop is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Spawned on the runtime; `TaskQueue::settle` waits for it.
    #[default]
    Detached,
    /// Awaited before push/pop return.
    Inline,
}

/// Queue configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Directory queue files are resolved against.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Queue file used when a caller does not name one.
    #[serde(default = "default_queue_file")]
    pub queue_file: String,

    /// Audit log path, relative to `base_dir`. Empty disables the log.
    #[serde(default = "default_audit_log")]
    pub audit_log: Option<PathBuf>,

    /// Where commands and scripts run. Defaults to `base_dir`.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Shell used for `command` runnables.
    #[serde(default = "default_shell")]
    pub shell: String,

    #[serde(default)]
    pub execution: ExecutionMode,

    /// Bucket drain order for new documents. Unset means the standard
    /// critical → high → custom → medium → low ranking.
    #[serde(default)]
    pub priority_order: Option<Vec<String>>,

    /// Items shown per bucket by listings.
    #[serde(default = "default_display_limit")]
    pub display_limit: usize,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_queue_file() -> String {
    "task-queue.json".to_string()
}

fn default_audit_log() -> Option<PathBuf> {
    Some(PathBuf::from("task-queue.log.jsonl"))
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_display_limit() -> usize {
    DEFAULT_DISPLAY_LIMIT
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            queue_file: default_queue_file(),
            audit_log: default_audit_log(),
            working_dir: None,
            shell: default_shell(),
            execution: ExecutionMode::default(),
            priority_order: None,
            display_limit: default_display_limit(),
        }
    }
}

impl QueueConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Rooted at `base_dir`, everything else default.
    pub fn in_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn resolved_working_dir(&self) -> PathBuf {
        match &self.working_dir {
            Some(dir) => self.base_dir.join(dir),
            None => self.base_dir.clone(),
        }
    }

    /// `None` when auditing is disabled.
    pub fn resolved_audit_log(&self) -> Option<PathBuf> {
        self.audit_log
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| self.base_dir.join(p))
    }
}
