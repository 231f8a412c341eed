//! TaskExecutor port - runnable タスクの実行
//!
//! 呼び出し側はタイムアウトを自前で掛ける（ここでは扱わない）。

use async_trait::async_trait;

use crate::domain::{ExecutionError, ExecutionOutput, Task};

/// TaskExecutor は `task.runnable` を解釈して実行する
///
/// # 戻り値
/// - `Ok(output)`: 実行は終わった。`output.completed` が成否
/// - `Err(e)`: 実行できなかった、またはプロセスが失敗した
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<ExecutionOutput, ExecutionError>;
}
