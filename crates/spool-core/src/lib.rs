//! spool-core
//!
//! Core building blocks for the spool task queue.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, priority, task, outcome, document, audit, errors）
//! - **ports**: 抽象化レイヤー（QueueStore, TaskExecutor, AuditSink, Clock, IdGenerator）
//! - **impls**: 実装（JsonFileStore, MemoryStore, ProcessExecutor, JsonlAuditLog など）
//! - **queue**: TaskQueue サービスと TaskQueueBuilder
//! - **config**: QueueConfig（TOML）

pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;

pub use config::{ConfigError, ExecutionMode, QueueConfig};
pub use domain::{
    ExecutionError, ExecutionOutput, LogEntry, Operation, PopMode, Priority, QueueError, Runnable,
    Task, TaskId, TaskKind, TaskStatus,
};
pub use queue::{BuildError, PopResult, QueueListing, QueueStatus, TaskQueue, TaskQueueBuilder};
