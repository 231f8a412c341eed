//! AuditSink port - 操作ログ
//!
//! キュー文書とは別ファイルに追記される。文書の正しさには影響しない。

use async_trait::async_trait;

use crate::domain::{LogEntry, QueueError};

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// 1 エントリを追記
    async fn append(&self, entry: &LogEntry) -> Result<(), QueueError>;

    /// 新しい順に最大 `limit` 件
    async fn recent(&self, limit: usize) -> Result<Vec<LogEntry>, QueueError>;
}
