//! TaskQueue - キュー操作の表面
//!
//! 各操作は「読み込み → 文書の変更 → 保存 → 監査ログ」を 1 つの非同期ロックの下で行う。
//! runnable の実行はロックの外で行い、結果の反映だけを再びロックして書き戻す。
//!
//! # 実行のきっかけ
//! - pop / start で runnable が working スロットに入ったとき
//! - push 時、スロットが空で push したタスクが runnable のとき
//!
//! どちらも `claim_and_run` を通る。

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BucketListing, PopResult, QueueListing, QueueStatus};
use crate::config::{ExecutionMode, QueueConfig};
use crate::domain::{
    Claim, ExecutionOutput, ExecutionVerdict, LogEntry, Operation, PopMode, QueueDocument,
    QueueError, Task, TaskId, TaskStatus,
};
use crate::ports::{AuditSink, Clock, IdGenerator, QueueStore, TaskExecutor};

/// Which pending task to move into the working slot.
enum ClaimTarget<'a> {
    Next {
        priority: Option<&'a str>,
        mode: PopMode,
    },
    Id(&'a TaskId),
}

pub(super) struct Inner {
    pub(super) config: QueueConfig,
    pub(super) store: Arc<dyn QueueStore>,
    pub(super) executor: Arc<dyn TaskExecutor>,
    pub(super) audit: Arc<dyn AuditSink>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) ids: Arc<dyn IdGenerator>,
    /// Serialises load → mutate → save.
    pub(super) guard: Mutex<()>,
    /// Detached executions not yet awaited by `settle`.
    pub(super) inflight: Mutex<Vec<JoinHandle<()>>>,
}

/// Priority task queue with a single working slot.
///
/// Cheap to clone; clones share the same lock and in-flight executions.
/// With `ExecutionMode::Detached` it must be used inside a tokio runtime.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl TaskQueue {
    pub(super) fn from_inner(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Queue file from the configuration.
    pub fn default_queue_file(&self) -> &str {
        &self.inner.config.queue_file
    }

    /// Add a task to the tail of its bucket.
    ///
    /// `priority` overrides `task.priority`. A missing id is generated before
    /// anything is written; a caller id already held anywhere in the document
    /// is rejected with `DuplicateTaskId`. When the working slot is empty and
    /// the task is runnable, it is claimed and executed right away.
    pub async fn push(&self, task: Task, priority: Option<&str>, queue_file: &str) -> Result<Task, QueueError> {
        let mut task = task;
        if task.id.is_empty() {
            task.id = self.inner.ids.generate_task_id()?;
        }
        if let Some(priority) = priority {
            task.priority = priority.into();
        }
        let now = self.inner.clock.now();
        task.status = TaskStatus::Pending;
        task.started_at = None;
        task.created_at.get_or_insert(now);

        let trigger = {
            let _guard = self.inner.guard.lock().await;
            let mut doc = self.load(queue_file).await?;
            if doc.find(&task.id).is_some() {
                return Err(QueueError::DuplicateTaskId(task.id));
            }
            let trigger = doc.working.is_none() && task.is_runnable();

            doc.push_task(task.clone());
            doc.record_operation(Operation::Push);
            self.save(queue_file, &mut doc).await?;
            self.log(Operation::Push, &task, Value::Null, &doc).await;
            trigger
        };

        info!(task_id = %task.id, priority = %task.priority, queue_file, "pushed task");

        if trigger {
            match self.claim_and_run(queue_file, ClaimTarget::Id(&task.id), Operation::Pop).await {
                Ok(_) => {}
                // another caller got to the slot or the task first
                Err(QueueError::SlotOccupied(_) | QueueError::TaskNotFound(_)) => {
                    debug!(task_id = %task.id, "push did not claim the working slot");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(task)
    }

    /// FIFO pop.
    pub async fn pop(&self, priority: Option<&str>, queue_file: &str) -> Result<PopResult, QueueError> {
        self.pop_with_mode(priority, PopMode::Fifo, queue_file).await
    }

    /// Fill the working slot and execute the task if it is runnable.
    ///
    /// An occupied slot is returned unchanged, without logging or executing.
    pub async fn pop_with_mode(
        &self,
        priority: Option<&str>,
        mode: PopMode,
        queue_file: &str,
    ) -> Result<PopResult, QueueError> {
        let working_item = self
            .claim_and_run(queue_file, ClaimTarget::Next { priority, mode }, Operation::Pop)
            .await?;
        Ok(PopResult { working_item })
    }

    /// What `pop` would return, without changing anything.
    pub async fn peek(&self, priority: Option<&str>, queue_file: &str) -> Result<Option<Task>, QueueError> {
        let doc = self.load(queue_file).await?;
        Ok(doc.peek(priority).cloned())
    }

    /// Move a specific pending task into the working slot.
    pub async fn start(&self, id: &TaskId, queue_file: &str) -> Result<Task, QueueError> {
        self.claim_and_run(queue_file, ClaimTarget::Id(id), Operation::StartWork)
            .await?
            .ok_or_else(|| QueueError::TaskNotFound(id.clone()))
    }

    /// Mark a task completed by id, from the working slot or any bucket.
    pub async fn complete(&self, id: &TaskId, queue_file: &str) -> Result<Task, QueueError> {
        let _guard = self.inner.guard.lock().await;
        let mut doc = self.load(queue_file).await?;

        let task = doc.complete_by_id(id, self.inner.clock.now())?;
        doc.record_operation(Operation::Complete);
        self.save(queue_file, &mut doc).await?;
        self.log(Operation::Complete, &task, Value::Null, &doc).await;

        info!(task_id = %task.id, queue_file, "completed task");
        Ok(task)
    }

    /// Put the working task back at the front of its bucket.
    pub async fn restart(&self, queue_file: &str) -> Result<Option<Task>, QueueError> {
        let _guard = self.inner.guard.lock().await;
        let mut doc = self.load(queue_file).await?;

        let Some(task) = doc.restart_working() else {
            debug!(queue_file, "nothing to restart");
            return Ok(None);
        };
        self.save(queue_file, &mut doc).await?;

        info!(task_id = %task.id, priority = %task.priority, "restarted working task");
        Ok(Some(task))
    }

    /// Reset `totalProcessed` / `totalFailed`. Completed tasks stay.
    pub async fn clear_completed(&self, queue_file: &str) -> Result<(), QueueError> {
        let _guard = self.inner.guard.lock().await;
        let mut doc = self.load(queue_file).await?;
        doc.clear_counters();
        self.save(queue_file, &mut doc).await?;
        info!(queue_file, "cleared counters");
        Ok(())
    }

    pub async fn status(&self, queue_file: &str) -> Result<QueueStatus, QueueError> {
        let doc = self.load(queue_file).await?;
        Ok(QueueStatus {
            queue_sizes: doc.queue_sizes(),
            working: doc.working.clone(),
            total_pending: doc.total_pending(),
            total_processed: doc.total_processed,
            total_failed: doc.total_failed,
            completed: doc.completed.len(),
        })
    }

    /// Pending tasks per bucket in drain order, optionally a single bucket.
    pub async fn list(&self, priority: Option<&str>, queue_file: &str) -> Result<QueueListing, QueueError> {
        let doc = self.load(queue_file).await?;
        let buckets = doc
            .buckets(priority)
            .into_iter()
            .map(|(name, bucket)| BucketListing {
                priority: name.to_string(),
                items: bucket.items.iter().cloned().collect(),
            })
            .collect();
        Ok(QueueListing {
            working: doc.working.clone(),
            buckets,
            display_limit: doc.global_config.seldom_display_default,
        })
    }

    /// Newest audit entries first.
    pub async fn show_log(&self, limit: usize) -> Result<Vec<LogEntry>, QueueError> {
        self.inner.audit.recent(limit).await
    }

    /// Run a task and record the outcome on the queue document.
    ///
    /// - `Ok(output)` with `output.completed`: task completed, `totalProcessed += 1`
    /// - `Ok(output)` otherwise: task failed, `totalFailed += 1`, still `Ok`
    /// - `Err(e)`: task failed, `totalFailed += 1`, `Err(QueueError::Execution(e))`
    ///
    /// A task held in the document leaves its place for the completed list.
    /// A task already in the completed list keeps its first outcome.
    pub async fn execute_task(&self, task: &Task, queue_file: &str) -> Result<ExecutionOutput, QueueError> {
        debug!(task_id = %task.id, "executing task");
        let result = self.inner.executor.execute(task).await;

        let verdict = match &result {
            Ok(output) if output.completed => ExecutionVerdict::Succeeded(output.summary()),
            Ok(output) => ExecutionVerdict::Failed(
                output
                    .error
                    .clone()
                    .unwrap_or_else(|| "execution failed".to_string()),
            ),
            Err(e) => ExecutionVerdict::Failed(e.to_string()),
        };

        {
            let _guard = self.inner.guard.lock().await;
            let mut doc = self.load(queue_file).await?;
            let Some(finished) = doc.record_execution(task, &verdict, self.inner.clock.now()) else {
                debug!(task_id = %task.id, "outcome already recorded, dropping late result");
                return Ok(result?);
            };
            doc.record_operation(Operation::Complete);
            self.save(queue_file, &mut doc).await?;

            let details = json!({ "executed": true, "status": finished.status });
            self.log(Operation::Complete, &finished, details, &doc).await;
        }

        match &verdict {
            ExecutionVerdict::Succeeded(_) => info!(task_id = %task.id, "task executed"),
            ExecutionVerdict::Failed(error) => warn!(task_id = %task.id, %error, "task execution failed"),
        }
        Ok(result?)
    }

    /// Wait for every detached execution started so far.
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.inner.inflight.lock().await);
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "execution task aborted");
                }
            }
        }
    }

    /// The shared pop / start / push path: claim under the lock, then execute
    /// outside it.
    async fn claim_and_run(
        &self,
        queue_file: &str,
        target: ClaimTarget<'_>,
        operation: Operation,
    ) -> Result<Option<Task>, QueueError> {
        let claimed = {
            let _guard = self.inner.guard.lock().await;
            let mut doc = self.load(queue_file).await?;
            let now = self.inner.clock.now();

            let (claim, details) = match target {
                ClaimTarget::Next { priority, mode } => (
                    doc.claim_next(priority, mode, now),
                    json!({ "mode": mode }),
                ),
                ClaimTarget::Id(id) => (doc.claim_by_id(id, now)?, Value::Null),
            };

            match claim {
                Claim::Empty => return Ok(None),
                Claim::AlreadyWorking(task) => {
                    debug!(task_id = %task.id, "working slot already occupied");
                    return Ok(Some(task));
                }
                Claim::Claimed(task) => {
                    doc.record_operation(operation);
                    self.save(queue_file, &mut doc).await?;
                    self.log(operation, &task, details, &doc).await;
                    task
                }
            }
        };

        info!(task_id = %claimed.id, priority = %claimed.priority, %operation, "task moved to working slot");

        if claimed.is_runnable() {
            self.dispatch(queue_file, claimed.clone()).await;
        }
        Ok(Some(claimed))
    }

    async fn dispatch(&self, queue_file: &str, task: Task) {
        match self.inner.config.execution {
            ExecutionMode::Inline => self.run_logged(queue_file, &task).await,
            ExecutionMode::Detached => {
                let this = self.clone();
                let queue_file = queue_file.to_string();
                let handle = tokio::spawn(async move { this.run_logged(&queue_file, &task).await });
                self.inner.inflight.lock().await.push(handle);
            }
        }
    }

    /// Triggered executions report through tracing only.
    async fn run_logged(&self, queue_file: &str, task: &Task) {
        if let Err(e) = self.execute_task(task, queue_file).await {
            warn!(task_id = %task.id, error = %e, "triggered execution failed");
        }
    }

    async fn load(&self, queue_file: &str) -> Result<QueueDocument, QueueError> {
        match self.inner.store.load(queue_file).await? {
            Some(mut doc) => {
                doc.normalize();
                Ok(doc)
            }
            None => {
                let config = &self.inner.config;
                let mut doc = QueueDocument::new(self.inner.clock.now(), config.priority_order.as_deref());
                doc.global_config.seldom_display_default = config.display_limit;
                Ok(doc)
            }
        }
    }

    async fn save(&self, queue_file: &str, doc: &mut QueueDocument) -> Result<(), QueueError> {
        doc.touch(self.inner.clock.now());
        self.inner.store.save(queue_file, doc).await
    }

    /// Audit failures never undo a saved operation.
    async fn log(&self, operation: Operation, task: &Task, details: Value, doc: &QueueDocument) {
        let entry = LogEntry::new(self.inner.clock.now(), operation, task, details, doc.snapshot());
        if let Err(e) = self.inner.audit.append(&entry).await {
            warn!(error = %e, %operation, "failed to write audit entry");
        }
    }
}
