//! Append-only JSON-lines audit log.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::domain::{LogEntry, QueueError};
use crate::ports::AuditSink;

/// One entry per line. No rotation: the file grows until someone removes it.
#[derive(Debug, Clone)]
pub struct JsonlAuditLog {
    path: PathBuf,
}

impl JsonlAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonlAuditLog {
    async fn append(&self, entry: &LogEntry) -> Result<(), QueueError> {
        let mut line = serde_json::to_string(entry).map_err(QueueError::Encode)?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| QueueError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let write_err = |source| QueueError::Write {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(write_err)?;
        file.write_all(line.as_bytes()).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;

        debug!(operation = %entry.operation, task_id = %entry.task_id, "audit entry appended");
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<LogEntry>, QueueError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(QueueError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let mut entries: Vec<LogEntry> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping malformed audit line");
                    None
                }
            })
            .collect();

        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn append(&self, _entry: &LogEntry) -> Result<(), QueueError> {
        Ok(())
    }

    async fn recent(&self, _limit: usize) -> Result<Vec<LogEntry>, QueueError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Operation, QueueSnapshot, Task};
    use chrono::Utc;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    fn entry(op: Operation, id: &str) -> LogEntry {
        let task = Task::data(json!({ "title": id })).with_id(id);
        LogEntry::new(Utc::now(), op, &task, Value::Null, QueueSnapshot::default())
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_limited() {
        let dir = TempDir::new().unwrap();
        let log = JsonlAuditLog::new(dir.path().join("q.log.jsonl"));

        log.append(&entry(Operation::Push, "a")).await.unwrap();
        log.append(&entry(Operation::Push, "b")).await.unwrap();
        log.append(&entry(Operation::Pop, "a")).await.unwrap();

        let recent = log.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].operation, Operation::Pop);
        assert_eq!(recent[1].task_id.as_str(), "b");
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("q.log.jsonl");
        let log = JsonlAuditLog::new(&path);

        log.append(&entry(Operation::Push, "a")).await.unwrap();
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("this is not json\n\n{\"operation\":\"PUSH\"}\n");
        std::fs::write(&path, raw).unwrap();
        log.append(&entry(Operation::Complete, "a")).await.unwrap();

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].operation, Operation::Complete);
        assert_eq!(recent[1].operation, Operation::Push);
    }

    #[tokio::test]
    async fn missing_log_reads_empty() {
        let dir = TempDir::new().unwrap();
        let log = JsonlAuditLog::new(dir.path().join("none.jsonl"));
        assert!(log.recent(5).await.unwrap().is_empty());
    }
}
