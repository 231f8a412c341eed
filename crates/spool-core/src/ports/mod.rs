//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部資源（キューファイル、監査ログ、子プロセス、時刻、乱数）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - キュー文書（JSON ファイル）が正本
//! - 監査ログは追記のみ、正本ではない
//! - 実行は executor に委譲し、結果の反映はキュー側で行う

pub mod audit_sink;
pub mod clock;
pub mod executor;
pub mod id_generator;
pub mod queue_store;

// 主要な trait を再エクスポート
pub use self::audit_sink::AuditSink;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::executor::TaskExecutor;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::queue_store::QueueStore;
