//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **JsonFileStore**: キューファイル（JSON、一時ファイル + rename で書き込み）
//! - **MemoryStore**: テスト・組み込み用の QueueStore
//! - **JsonlAuditLog** / **NoopAuditSink**: 監査ログ
//! - **ProcessExecutor**: command / script / function の実行
//! - **FunctionRegistry**: function runnable の登録先

pub mod functions;
pub mod json_store;
pub mod jsonl_audit;
pub mod memory_store;
pub mod process_executor;

// 主要な型を再エクスポート
pub use self::functions::{FunctionError, FunctionRegistry, RegistryError, TaskFunction};
pub use self::json_store::JsonFileStore;
pub use self::jsonl_audit::{JsonlAuditLog, NoopAuditSink};
pub use self::memory_store::MemoryStore;
pub use self::process_executor::ProcessExecutor;
