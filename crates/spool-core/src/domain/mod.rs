//! Domain model (ids, priorities, tasks, the queue document, audit entries).
//!
//! モジュール構成:
//! - ids / priority: 識別子と優先度
//! - task / outcome: タスク本体と実行結果
//! - document: 永続化される集約（バケット、working スロット、カウンタ）
//! - audit: 監査ログのエントリ
//! - errors: エラー型

pub mod audit;
pub mod document;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod priority;
pub mod task;

pub use audit::{LogEntry, Operation, QueueSnapshot};
pub use document::{
    Bucket, BucketOrdering, Claim, DocumentMetadata, ExecutionVerdict, GlobalConfig, QueueDocument,
    DEFAULT_DISPLAY_LIMIT, DOCUMENT_VERSION,
};
pub use errors::{ExecutionError, IdError, QueueError};
pub use ids::TaskId;
pub use outcome::ExecutionOutput;
pub use priority::{ParsePopModeError, PopMode, Priority};
pub use task::{Runnable, RunnableSpec, Task, TaskKind, TaskStatus};
