//! Queue document: the persisted aggregate.
//!
//! One document per queue file. It holds the priority buckets, the single
//! working slot, the completed list and the global counters. All state
//! transitions happen here; the service only loads, calls one of these
//! methods, and saves.
//!
//! Invariant: a task id appears in exactly one place (a bucket, the working
//! slot, or `completed`), and at most one task is working.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Operation, PopMode, Priority, QueueError, QueueSnapshot, Task, TaskId};

pub const DOCUMENT_VERSION: &str = "1.0.0";

/// Default number of items shown per bucket by listings.
pub const DEFAULT_DISPLAY_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub total_items: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_version() -> String {
    DOCUMENT_VERSION.to_string()
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            version: default_version(),
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
            total_items: 0,
            description: None,
        }
    }
}

/// Insertion-ordered tasks of one priority.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    #[serde(default)]
    pub items: VecDeque<Task>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default = "default_display_limit")]
    pub seldom_display_default: usize,
    #[serde(default)]
    pub operation_counters: BTreeMap<String, u64>,
}

fn default_display_limit() -> usize {
    DEFAULT_DISPLAY_LIMIT
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            seldom_display_default: DEFAULT_DISPLAY_LIMIT,
            operation_counters: BTreeMap::new(),
        }
    }
}

/// How buckets are ranked when `pop` / `peek` get no priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketOrdering {
    /// critical → high → custom (creation order) → medium → low
    #[default]
    Standard,
    /// Exactly `priority_order`, i.e. the order buckets were first created.
    Declared,
}

/// Result of trying to fill the working slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The slot was already occupied; nothing changed.
    AlreadyWorking(Task),
    /// A pending task moved into the slot.
    Claimed(Task),
    /// Nothing matched.
    Empty,
}

impl Claim {
    pub fn into_task(self) -> Option<Task> {
        match self {
            Claim::AlreadyWorking(t) | Claim::Claimed(t) => Some(t),
            Claim::Empty => None,
        }
    }
}

/// How an execution ended, as recorded on the task.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionVerdict {
    Succeeded(Value),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDocument {
    #[serde(default)]
    pub metadata: DocumentMetadata,

    #[serde(default)]
    pub working: Option<Task>,

    #[serde(default)]
    pub queues: BTreeMap<String, Bucket>,

    #[serde(default)]
    pub completed: Vec<Task>,

    /// Bucket names in the order they were first created.
    #[serde(default)]
    pub priority_order: Vec<String>,

    #[serde(default)]
    pub ordering: BucketOrdering,

    #[serde(default)]
    pub global_config: GlobalConfig,

    #[serde(default, rename = "totalProcessed")]
    pub total_processed: u64,

    #[serde(default, rename = "totalFailed")]
    pub total_failed: u64,
}

impl QueueDocument {
    /// A fresh document. With `declared_order`, the listed buckets are
    /// created up front and drained in exactly that order.
    pub fn new(now: DateTime<Utc>, declared_order: Option<&[String]>) -> Self {
        let mut doc = Self {
            metadata: DocumentMetadata {
                created_at: now,
                updated_at: now,
                ..Default::default()
            },
            working: None,
            queues: BTreeMap::new(),
            completed: Vec::new(),
            priority_order: Vec::new(),
            ordering: BucketOrdering::Standard,
            global_config: GlobalConfig::default(),
            total_processed: 0,
            total_failed: 0,
        };
        if let Some(order) = declared_order {
            doc.ordering = BucketOrdering::Declared;
            for name in order {
                doc.ensure_bucket(name);
            }
        }
        doc
    }

    /// Repair a hand-edited document: every bucket listed once in
    /// `priority_order`, every listed name backed by a bucket.
    pub fn normalize(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.priority_order.retain(|name| seen.insert(name.clone()));

        let missing: Vec<String> = self
            .queues
            .keys()
            .filter(|name| !seen.contains(*name))
            .cloned()
            .collect();
        self.priority_order.extend(missing);

        for name in &self.priority_order {
            self.queues.entry(name.clone()).or_default();
        }
    }

    /// Bucket by name, created on demand.
    pub fn ensure_bucket(&mut self, name: &str) -> &mut Bucket {
        if !self.queues.contains_key(name) {
            self.priority_order.push(name.to_string());
        }
        self.queues.entry(name.to_string()).or_default()
    }

    /// Bucket names in the order `pop` drains them.
    pub fn selection_order(&self) -> Vec<&str> {
        let mut order: Vec<&str> = self.priority_order.iter().map(String::as_str).collect();
        if self.ordering == BucketOrdering::Standard {
            // stable: custom buckets keep their creation order
            order.sort_by_key(|name| Priority::rank(name));
        }
        order
    }

    pub fn queue_sizes(&self) -> BTreeMap<String, usize> {
        self.queues
            .iter()
            .map(|(name, bucket)| (name.clone(), bucket.items.len()))
            .collect()
    }

    pub fn total_pending(&self) -> usize {
        self.queues.values().map(|b| b.items.len()).sum()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            queue_sizes: self.queue_sizes(),
            working: usize::from(self.working.is_some()),
            completed: self.completed.len(),
        }
    }

    /// Refresh metadata before a save.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.metadata.updated_at = now;
        self.metadata.total_items =
            self.total_pending() + usize::from(self.working.is_some()) + self.completed.len();
    }

    pub fn record_operation(&mut self, op: Operation) {
        *self
            .global_config
            .operation_counters
            .entry(op.as_str().to_string())
            .or_insert(0) += 1;
    }

    /// Append to the tail of the task's own bucket.
    pub fn push_task(&mut self, task: Task) {
        let name = task.priority.as_str().to_string();
        self.ensure_bucket(&name).items.push_back(task);
    }

    /// What `pop` would hand out, without changing anything.
    pub fn peek(&self, priority: Option<&str>) -> Option<&Task> {
        if let Some(working) = &self.working {
            return Some(working);
        }
        match priority {
            Some(name) => self.queues.get(name)?.items.front(),
            None => self
                .selection_order()
                .into_iter()
                .find_map(|name| self.queues.get(name).and_then(|b| b.items.front())),
        }
    }

    /// Fill the working slot from a bucket.
    ///
    /// An occupied slot is returned as-is, so repeated pops while a task is
    /// in flight are safe.
    pub fn claim_next(&mut self, priority: Option<&str>, mode: PopMode, now: DateTime<Utc>) -> Claim {
        if let Some(working) = &self.working {
            return Claim::AlreadyWorking(working.clone());
        }

        let name = match priority {
            Some(name) => name.to_string(),
            None => match self
                .selection_order()
                .into_iter()
                .find(|name| self.queues.get(*name).is_some_and(|b| !b.items.is_empty()))
            {
                Some(name) => name.to_string(),
                None => return Claim::Empty,
            },
        };

        let Some(bucket) = self.queues.get_mut(&name) else {
            return Claim::Empty;
        };
        let taken = match mode {
            PopMode::Fifo => bucket.items.pop_front(),
            PopMode::Lifo => bucket.items.pop_back(),
        };
        let Some(mut task) = taken else {
            return Claim::Empty;
        };

        task.mark_working(now);
        self.working = Some(task.clone());
        Claim::Claimed(task)
    }

    /// Move a specific pending task into the working slot.
    pub fn claim_by_id(&mut self, id: &TaskId, now: DateTime<Utc>) -> Result<Claim, QueueError> {
        if let Some(working) = &self.working {
            if &working.id == id {
                return Ok(Claim::AlreadyWorking(working.clone()));
            }
            return Err(QueueError::SlotOccupied(working.id.clone()));
        }

        let mut task = self
            .take_pending(id)
            .ok_or_else(|| QueueError::TaskNotFound(id.clone()))?;
        task.mark_working(now);
        self.working = Some(task.clone());
        Ok(Claim::Claimed(task))
    }

    /// Release the working task back to the FRONT of its bucket.
    pub fn restart_working(&mut self) -> Option<Task> {
        let mut task = self.working.take()?;
        task.mark_pending();
        let name = task.priority.as_str().to_string();
        self.ensure_bucket(&name).items.push_front(task.clone());
        Some(task)
    }

    /// Move a task (working or pending) into `completed`.
    pub fn complete_by_id(&mut self, id: &TaskId, now: DateTime<Utc>) -> Result<Task, QueueError> {
        if let Some(done) = self.completed.iter().find(|t| &t.id == id) {
            return Ok(done.clone());
        }

        let in_slot = self.working.as_ref().is_some_and(|w| &w.id == id);
        let taken = if in_slot {
            self.working.take()
        } else {
            self.take_pending(id)
        };
        let mut task = taken.ok_or_else(|| QueueError::TaskNotFound(id.clone()))?;

        task.mark_completed(now, None);
        self.completed.push(task.clone());
        Ok(task)
    }

    /// Apply an execution outcome: counters, task status, and (when the task
    /// is stored here) its move into `completed`.
    ///
    /// A task already in `completed` keeps its first outcome. A late result
    /// for it (a restarted task that was claimed and run again) returns
    /// `None` and leaves the counters alone.
    pub fn record_execution(&mut self, task: &Task, verdict: &ExecutionVerdict, now: DateTime<Utc>) -> Option<Task> {
        if !task.id.is_empty() && self.completed.iter().any(|t| t.id == task.id) {
            return None;
        }

        match verdict {
            ExecutionVerdict::Succeeded(_) => self.total_processed += 1,
            ExecutionVerdict::Failed(_) => self.total_failed += 1,
        }

        let apply = |t: &mut Task| match verdict {
            ExecutionVerdict::Succeeded(value) => t.mark_completed(now, Some(value.clone())),
            ExecutionVerdict::Failed(error) => t.mark_failed(now, error.clone()),
        };

        if task.id.is_empty() {
            let mut detached = task.clone();
            apply(&mut detached);
            return Some(detached);
        }

        let in_slot = self.working.as_ref().is_some_and(|w| w.id == task.id);
        let taken = if in_slot {
            self.working.take()
        } else {
            self.take_pending(&task.id)
        };

        match taken {
            Some(mut stored) => {
                apply(&mut stored);
                self.completed.push(stored.clone());
                Some(stored)
            }
            None => {
                let mut detached = task.clone();
                apply(&mut detached);
                Some(detached)
            }
        }
    }

    /// Reset the processed/failed counters. `completed` is left alone.
    pub fn clear_counters(&mut self) {
        self.total_processed = 0;
        self.total_failed = 0;
    }

    pub fn find(&self, id: &TaskId) -> Option<&Task> {
        self.working
            .iter()
            .chain(self.queues.values().flat_map(|b| b.items.iter()))
            .chain(self.completed.iter())
            .find(|t| &t.id == id)
    }

    /// Pending tasks grouped by bucket, in selection order.
    pub fn buckets(&self, priority: Option<&str>) -> Vec<(&str, &Bucket)> {
        self.selection_order()
            .into_iter()
            .filter(|name| priority.is_none_or(|p| p == *name))
            .filter_map(|name| self.queues.get(name).map(|b| (name, b)))
            .collect()
    }

    fn take_pending(&mut self, id: &TaskId) -> Option<Task> {
        for bucket in self.queues.values_mut() {
            if let Some(pos) = bucket.items.iter().position(|t| &t.id == id) {
                return bucket.items.remove(pos);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskStatus;
    use serde_json::json;

    fn task(id: &str, priority: &str) -> Task {
        Task::data(json!({ "title": id })).with_id(id).with_priority(priority)
    }

    fn doc() -> QueueDocument {
        QueueDocument::new(Utc::now(), None)
    }

    fn claimed_id(claim: Claim) -> String {
        claim.into_task().map(|t| t.id.to_string()).unwrap_or_default()
    }

    #[test]
    fn fifo_within_a_bucket() {
        let mut d = doc();
        for id in ["A", "B", "C"] {
            d.push_task(task(id, "medium"));
        }

        let now = Utc::now();
        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(claimed_id(d.claim_next(None, PopMode::Fifo, now)));
            d.complete_by_id(&TaskId::new(order.last().unwrap().clone()), now).unwrap();
        }
        assert_eq!(order, vec!["A", "B", "C"]);
    }

    #[test]
    fn high_drains_before_low_regardless_of_arrival() {
        let mut d = doc();
        d.push_task(task("low-1", "low"));
        d.push_task(task("high-1", "high"));

        assert_eq!(claimed_id(d.claim_next(None, PopMode::Fifo, Utc::now())), "high-1");
    }

    #[test]
    fn standard_ordering_puts_custom_between_high_and_medium() {
        let mut d = doc();
        for p in ["low", "medium", "urgent-hotfix", "high", "critical", "zeta"] {
            d.ensure_bucket(p);
        }
        assert_eq!(
            d.selection_order(),
            vec!["critical", "high", "urgent-hotfix", "zeta", "medium", "low"]
        );
    }

    #[test]
    fn declared_ordering_follows_creation_order() {
        let order = vec!["user_story".to_string(), "low".to_string(), "critical".to_string()];
        let mut d = QueueDocument::new(Utc::now(), Some(&order));
        d.push_task(task("late", "retrospective"));
        d.push_task(task("crit", "critical"));
        d.push_task(task("story", "user_story"));

        assert_eq!(
            d.selection_order(),
            vec!["user_story", "low", "critical", "retrospective"]
        );
        assert_eq!(claimed_id(d.claim_next(None, PopMode::Fifo, Utc::now())), "story");
    }

    #[test]
    fn claim_is_idempotent_while_working() {
        let mut d = doc();
        d.push_task(task("A", "high"));
        d.push_task(task("B", "high"));

        let first = d.claim_next(None, PopMode::Fifo, Utc::now());
        assert!(matches!(first, Claim::Claimed(ref t) if t.id.as_str() == "A"));
        let second = d.claim_next(None, PopMode::Fifo, Utc::now());
        assert!(matches!(second, Claim::AlreadyWorking(ref t) if t.id.as_str() == "A"));
        assert_eq!(d.total_pending(), 1);
    }

    #[test]
    fn restart_puts_working_task_back_at_the_front() {
        let mut d = doc();
        d.push_task(task("A", "high"));
        d.push_task(task("B", "high"));
        d.claim_next(None, PopMode::Fifo, Utc::now());

        let released = d.restart_working().unwrap();
        assert_eq!(released.status, TaskStatus::Pending);
        assert!(d.working.is_none());

        let head = d.peek(Some("high")).unwrap();
        assert_eq!(head.id.as_str(), "A");
        assert_eq!(head.status, TaskStatus::Pending);
        assert!(d.restart_working().is_none());
    }

    #[test]
    fn lifo_takes_the_tail() {
        let mut d = doc();
        d.push_task(task("old", "medium"));
        d.push_task(task("new", "medium"));
        assert_eq!(claimed_id(d.claim_next(Some("medium"), PopMode::Lifo, Utc::now())), "new");
    }

    #[test]
    fn empty_or_unknown_bucket_claims_nothing() {
        let mut d = doc();
        assert_eq!(d.claim_next(None, PopMode::Fifo, Utc::now()), Claim::Empty);
        assert_eq!(d.claim_next(Some("nope"), PopMode::Fifo, Utc::now()), Claim::Empty);
        assert!(d.peek(None).is_none());
    }

    #[test]
    fn peek_prefers_the_working_task() {
        let mut d = doc();
        d.push_task(task("A", "high"));
        d.push_task(task("C", "critical"));
        d.claim_next(Some("high"), PopMode::Fifo, Utc::now());

        assert_eq!(d.peek(Some("critical")).unwrap().id.as_str(), "A");
    }

    #[test]
    fn claim_by_id_respects_the_single_slot() {
        let mut d = doc();
        d.push_task(task("A", "low"));
        d.push_task(task("B", "high"));

        let claim = d.claim_by_id(&TaskId::new("A"), Utc::now()).unwrap();
        assert!(matches!(claim, Claim::Claimed(_)));

        let err = d.claim_by_id(&TaskId::new("B"), Utc::now()).unwrap_err();
        assert!(matches!(err, QueueError::SlotOccupied(ref id) if id.as_str() == "A"));

        let missing = {
            d.restart_working();
            d.claim_by_id(&TaskId::new("Z"), Utc::now()).unwrap_err()
        };
        assert!(matches!(missing, QueueError::TaskNotFound(_)));
    }

    #[test]
    fn complete_by_id_moves_from_bucket_or_slot() {
        let mut d = doc();
        d.push_task(task("A", "low"));
        d.push_task(task("B", "low"));
        d.claim_next(None, PopMode::Fifo, Utc::now());

        let a = d.complete_by_id(&TaskId::new("A"), Utc::now()).unwrap();
        assert_eq!(a.status, TaskStatus::Completed);
        assert!(a.completed_at.is_some());
        assert!(d.working.is_none());

        d.complete_by_id(&TaskId::new("B"), Utc::now()).unwrap();
        assert_eq!(d.total_pending(), 0);
        assert_eq!(d.completed.len(), 2);

        assert!(matches!(
            d.complete_by_id(&TaskId::new("Z"), Utc::now()),
            Err(QueueError::TaskNotFound(_))
        ));
    }

    #[test]
    fn record_execution_moves_working_task_and_counts() {
        let mut d = doc();
        d.push_task(task("A", "high"));
        let Claim::Claimed(working) = d.claim_next(None, PopMode::Fifo, Utc::now()) else {
            panic!("expected a claim");
        };

        let done = d
            .record_execution(&working, &ExecutionVerdict::Failed("boom".into()), Utc::now())
            .unwrap();
        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("boom"));
        assert!(d.working.is_none());
        assert_eq!(d.completed.len(), 1);
        assert_eq!((d.total_processed, d.total_failed), (0, 1));
    }

    #[test]
    fn late_outcome_for_completed_task_is_ignored() {
        let mut d = doc();
        d.push_task(task("A", "high"));
        let Claim::Claimed(first) = d.claim_next(None, PopMode::Fifo, Utc::now()) else {
            panic!("expected a claim");
        };
        d.restart_working();
        let Claim::Claimed(second) = d.claim_next(None, PopMode::Fifo, Utc::now()) else {
            panic!("expected a claim");
        };

        let ok = ExecutionVerdict::Succeeded(json!("done"));
        assert!(d.record_execution(&first, &ok, Utc::now()).is_some());
        assert_eq!(d.record_execution(&second, &ExecutionVerdict::Failed("late".into()), Utc::now()), None);

        assert_eq!(d.completed.len(), 1);
        assert_eq!(d.completed[0].status, TaskStatus::Completed);
        assert_eq!((d.total_processed, d.total_failed), (1, 0));
    }

    #[test]
    fn find_looks_in_every_place() {
        let mut d = doc();
        d.push_task(task("A", "high"));
        d.push_task(task("B", "low"));
        d.push_task(task("C", "low"));
        d.claim_by_id(&TaskId::new("A"), Utc::now()).unwrap();
        d.complete_by_id(&TaskId::new("C"), Utc::now()).unwrap();

        for id in ["A", "B", "C"] {
            assert_eq!(d.find(&TaskId::new(id)).map(|t| t.id.as_str()), Some(id));
        }
        assert!(d.find(&TaskId::new("missing")).is_none());
    }

    #[test]
    fn clear_counters_keeps_completed_tasks() {
        let mut d = doc();
        d.push_task(task("A", "high"));
        d.complete_by_id(&TaskId::new("A"), Utc::now()).unwrap();
        d.total_processed = 4;
        d.total_failed = 2;

        d.clear_counters();
        assert_eq!((d.total_processed, d.total_failed), (0, 0));
        assert_eq!(d.completed.len(), 1);
    }

    #[test]
    fn normalize_registers_hand_written_buckets() {
        let raw = json!({
            "queues": {
                "low": { "items": [] },
                "critical": { "items": [{ "id": "c1", "priority": "critical", "content": {} }] }
            },
            "priority_order": ["low", "low"]
        });
        let mut d: QueueDocument = serde_json::from_value(raw).unwrap();
        d.normalize();

        assert_eq!(d.priority_order, vec!["low", "critical"]);
        assert_eq!(d.peek(None).unwrap().id.as_str(), "c1");
        assert_eq!(d.metadata.version, DOCUMENT_VERSION);
    }

    #[test]
    fn snapshot_and_touch_count_everything() {
        let mut d = doc();
        d.push_task(task("A", "high"));
        d.push_task(task("B", "low"));
        d.claim_next(None, PopMode::Fifo, Utc::now());
        d.record_operation(Operation::Pop);
        d.touch(Utc::now());

        let snap = d.snapshot();
        assert_eq!(snap.working, 1);
        assert_eq!(snap.queue_sizes.get("low"), Some(&1));
        assert_eq!(snap.queue_sizes.get("high"), Some(&0));
        assert_eq!(d.metadata.total_items, 2);
        assert_eq!(d.global_config.operation_counters.get("POP"), Some(&1));
    }
}
