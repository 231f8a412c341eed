//! QueueStore port - キュー文書の永続化
//!
//! 文書単位の読み書きのみ（部分更新なし）。
//!
//! # 実装
//! - **JsonFileStore**: ファイル（本番用）
//! - **MemoryStore**: テスト・組み込み用

use async_trait::async_trait;

use crate::domain::{QueueDocument, QueueError};

/// QueueStore はキューファイル名をキーに文書全体を保存する
///
/// # 前提
/// - 1 つのキューファイルにつき書き手は 1 プロセス
/// - ロックや楽観的並行制御は行わない（最後の書き込みが勝つ）
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// 文書を読む。存在しなければ `None`。
    async fn load(&self, queue_file: &str) -> Result<Option<QueueDocument>, QueueError>;

    /// 文書全体を書き戻す。
    async fn save(&self, queue_file: &str, doc: &QueueDocument) -> Result<(), QueueError>;
}
