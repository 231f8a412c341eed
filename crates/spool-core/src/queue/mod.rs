//! Queue module: the `TaskQueue` service and its builder.
//!
//! Every operation is load → mutate → save on one queue document, serialised
//! in-process. Two processes writing the same queue file is unsupported.

mod builder;
mod service;

pub use builder::{BuildError, TaskQueueBuilder};
pub use service::TaskQueue;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::Task;

/// What `pop` hands back: the task now in the working slot, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopResult {
    pub working_item: Option<Task>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub queue_sizes: BTreeMap<String, usize>,
    pub working: Option<Task>,
    pub total_pending: usize,
    pub total_processed: u64,
    pub total_failed: u64,
    /// Number of tasks in the completed list.
    pub completed: usize,
}

/// Pending tasks of one bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketListing {
    pub priority: String,
    pub items: Vec<Task>,
}

/// Snapshot for listings, buckets in drain order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueListing {
    pub working: Option<Task>,
    pub buckets: Vec<BucketListing>,
    pub display_limit: usize,
}
