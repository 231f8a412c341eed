//! Function registry - `function` runnable の登録と管理
//!
//! `runnable.function` の名前で `TaskFunction` を引く。
//!
//! # 内部実装
//! - HashMap<String, Arc<dyn TaskFunction>> で管理
//! - クロージャ（`Fn(Vec<Value>) -> Future`）もそのまま登録できる
//! - `with_builtins` で echo / sleep / writeFile / readFile を登録済みにする

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

/// 関数の失敗。キュー側ではタスクの `error` になる。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct FunctionError(pub String);

impl FunctionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<std::io::Error> for FunctionError {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}

/// 名前付きで呼び出される非同期関数
#[async_trait]
pub trait TaskFunction: Send + Sync {
    async fn call(&self, args: Vec<Value>) -> Result<Value, FunctionError>;
}

#[async_trait]
impl<F, Fut> TaskFunction for F
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, FunctionError>> + Send + 'static,
{
    async fn call(&self, args: Vec<Value>) -> Result<Value, FunctionError> {
        (self)(args).await
    }
}

/// RegistryError は FunctionRegistry の操作エラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("function '{0}' is already registered")]
    AlreadyRegistered(String),
}

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn TaskFunction>>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 組み込み関数入り。相対パスは `base_dir` 基準で解決する。
    pub fn with_builtins(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let mut registry = Self::new();
        let builtins: [(&str, Arc<dyn TaskFunction>); 4] = [
            ("echo", Arc::new(Echo)),
            ("sleep", Arc::new(Sleep)),
            ("writeFile", Arc::new(WriteFile { base_dir: base_dir.clone() })),
            ("readFile", Arc::new(ReadFile { base_dir })),
        ];
        for (name, function) in builtins {
            registry.functions.insert(name.to_string(), function);
        }
        registry
    }

    pub fn register<F: TaskFunction + 'static>(
        &mut self,
        name: impl Into<String>,
        function: F,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.functions.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.functions.insert(name, Arc::new(function));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// 名前順
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }
}

fn arg<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a Value, FunctionError> {
    args.get(index)
        .ok_or_else(|| FunctionError::new(format!("missing argument '{name}'")))
}

fn string_arg(args: &[Value], index: usize, name: &str) -> Result<String, FunctionError> {
    match arg(args, index, name)? {
        Value::String(s) => Ok(s.clone()),
        other => Ok(other.to_string()),
    }
}

fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    base_dir.join(path)
}

struct Echo;

#[async_trait]
impl TaskFunction for Echo {
    async fn call(&self, args: Vec<Value>) -> Result<Value, FunctionError> {
        let message = args.into_iter().next().unwrap_or(Value::Null);
        info!(%message, "echo");
        Ok(message)
    }
}

struct Sleep;

#[async_trait]
impl TaskFunction for Sleep {
    async fn call(&self, args: Vec<Value>) -> Result<Value, FunctionError> {
        let raw = arg(&args, 0, "ms")?;
        let ms = raw
            .as_u64()
            .or_else(|| raw.as_str().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| FunctionError::new(format!("invalid sleep duration: {raw}")))?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(Value::String(format!("Slept for {ms}ms")))
    }
}

struct WriteFile {
    base_dir: PathBuf,
}

#[async_trait]
impl TaskFunction for WriteFile {
    async fn call(&self, args: Vec<Value>) -> Result<Value, FunctionError> {
        let path = string_arg(&args, 0, "path")?;
        let content = string_arg(&args, 1, "content")?;
        tokio::fs::write(resolve(&self.base_dir, &path), content).await?;
        Ok(Value::String(format!("Written to {path}")))
    }
}

struct ReadFile {
    base_dir: PathBuf,
}

#[async_trait]
impl TaskFunction for ReadFile {
    async fn call(&self, args: Vec<Value>) -> Result<Value, FunctionError> {
        let path = string_arg(&args, 0, "path")?;
        let content = tokio::fs::read_to_string(resolve(&self.base_dir, &path)).await?;
        Ok(Value::String(content))
    }
}
