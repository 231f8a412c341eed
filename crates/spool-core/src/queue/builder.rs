//! TaskQueueBuilder - TaskQueue の構築とワイヤリング
//!
//! 指定されなかった ports は `QueueConfig` から既定の実装で埋める:
//! - store: JsonFileStore(base_dir)
//! - executor: ProcessExecutor(working_dir, shell, 登録済み関数)
//! - audit: JsonlAuditLog(audit_log)、無効なら NoopAuditSink
//! - clock: SystemClock / ids: UlidGenerator(clock)

use std::sync::Arc;

use tokio::sync::Mutex;

use super::service::{Inner, TaskQueue};
use crate::config::QueueConfig;
use crate::impls::{
    FunctionRegistry, JsonFileStore, JsonlAuditLog, NoopAuditSink, ProcessExecutor, RegistryError,
    TaskFunction,
};
use crate::ports::{AuditSink, Clock, IdGenerator, QueueStore, SystemClock, TaskExecutor, UlidGenerator};

/// TaskQueueBuilder は TaskQueue を構築
///
/// # 使用例
/// ```ignore
/// let queue = TaskQueueBuilder::new(config)
///     .register_function("deploy", deploy)?
///     .expect_functions(&["deploy"])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_functions() で必要な関数名を宣言
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば BuildError を返す
///
/// 登録した関数は既定の ProcessExecutor でのみ使われる。`executor()` で
/// 差し替えた場合は無視される。
pub struct TaskQueueBuilder {
    config: QueueConfig,
    functions: FunctionRegistry,
    expected_functions: Option<Vec<String>>,
    store: Option<Arc<dyn QueueStore>>,
    executor: Option<Arc<dyn TaskExecutor>>,
    audit: Option<Arc<dyn AuditSink>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

/// BuildError は TaskQueue 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing functions: {0:?}. These functions were expected but not registered.")]
    MissingFunctions(Vec<String>),
}

impl TaskQueueBuilder {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            functions: FunctionRegistry::with_builtins(config.resolved_working_dir()),
            config,
            expected_functions: None,
            store: None,
            executor: None,
            audit: None,
            clock: None,
            ids: None,
        }
    }

    pub fn store(mut self, store: impl QueueStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn executor(mut self, executor: impl TaskExecutor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    pub fn audit(mut self, audit: impl AuditSink + 'static) -> Self {
        self.audit = Some(Arc::new(audit));
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn ids(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    /// `function` runnable 用の関数を登録
    pub fn register_function<F: TaskFunction + 'static>(
        mut self,
        name: &str,
        function: F,
    ) -> Result<Self, RegistryError> {
        self.functions.register(name, function)?;
        Ok(self)
    }

    /// 期待される関数名のリストを設定
    pub fn expect_functions(mut self, names: &[&str]) -> Self {
        self.expected_functions = Some(names.iter().map(|name| name.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<TaskQueue, BuildError> {
        if let Some(expected) = &self.expected_functions {
            let missing: Vec<String> = expected
                .iter()
                .filter(|name| !self.functions.contains(name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingFunctions(missing));
            }
        }

        let config = self.config;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(JsonFileStore::new(config.base_dir.clone())));
        let executor = self.executor.unwrap_or_else(|| {
            Arc::new(
                ProcessExecutor::new(config.resolved_working_dir())
                    .with_shell(config.shell.clone())
                    .with_functions(self.functions),
            )
        });
        let audit: Arc<dyn AuditSink> = match (self.audit, config.resolved_audit_log()) {
            (Some(audit), _) => audit,
            (None, Some(path)) => Arc::new(JsonlAuditLog::new(path)),
            (None, None) => Arc::new(NoopAuditSink),
        };
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));

        Ok(TaskQueue::from_inner(Inner {
            config,
            store,
            executor,
            audit,
            clock,
            ids,
            guard: Mutex::new(()),
            inflight: Mutex::new(Vec::new()),
        }))
    }
}
