//! Default executor: shell commands, script files and registered functions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::{ExecutionError, ExecutionOutput, Runnable, RunnableSpec, Task};
use crate::impls::functions::FunctionRegistry;
use crate::ports::TaskExecutor;

pub const DEFAULT_SHELL: &str = "sh";

/// Attempts to start a freshly written script while another thread still
/// holds a write handle to it (ETXTBSY).
const SPAWN_BUSY_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    working_dir: PathBuf,
    shell: String,
    functions: FunctionRegistry,
}

impl ProcessExecutor {
    /// Runs in `working_dir` with `sh` and the built-in functions.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        Self {
            functions: FunctionRegistry::with_builtins(&working_dir),
            working_dir,
            shell: DEFAULT_SHELL.to_string(),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    async fn run_command(
        &self,
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let line = command_line(command, args);
        debug!(shell = %self.shell, %line, "running command");

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(&line);
        self.prepare(&mut cmd, env);
        capture(&mut cmd).await
    }

    async fn run_script(
        &self,
        path: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let script = self.working_dir.join(path);
        if tokio::fs::metadata(&script).await.is_err() {
            return Err(ExecutionError::ScriptNotFound(script));
        }
        ensure_executable(&script).await?;
        debug!(script = %script.display(), "running script");

        let mut cmd = Command::new(&script);
        cmd.args(args);
        self.prepare(&mut cmd, env);
        capture(&mut cmd).await
    }

    async fn call_function(&self, name: &str, args: &[Value]) -> Result<ExecutionOutput, ExecutionError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| ExecutionError::FunctionNotRegistered(name.to_string()))?;

        debug!(function = name, "calling function");
        match function.call(args.to_vec()).await {
            Ok(value) => Ok(ExecutionOutput::value(value)),
            Err(e) => {
                warn!(function = name, error = %e, "function reported an error");
                Ok(ExecutionOutput::failed(e.to_string()))
            }
        }
    }

    fn prepare(&self, cmd: &mut Command, env: &BTreeMap<String, String>) {
        cmd.current_dir(&self.working_dir)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
    }
}

#[async_trait]
impl TaskExecutor for ProcessExecutor {
    async fn execute(&self, task: &Task) -> Result<ExecutionOutput, ExecutionError> {
        if !task.is_runnable() {
            return Err(ExecutionError::NotRunnable);
        }
        let runnable = match &task.runnable {
            Some(RunnableSpec::Known(runnable)) => runnable,
            Some(spec @ RunnableSpec::Unrecognized { kind, .. }) => {
                return Err(match spec.malformed_reason() {
                    Some(reason) => ExecutionError::MalformedRunnable {
                        kind: kind.clone(),
                        reason,
                    },
                    None => ExecutionError::UnknownRunnableType(kind.clone()),
                });
            }
            None => return Err(ExecutionError::NotRunnable),
        };

        match runnable {
            Runnable::Command { command, args, env } => self.run_command(command, args, env).await,
            Runnable::Script { path, args, env } => self.run_script(path, args, env).await,
            Runnable::Function { function, args } => self.call_function(function, args).await,
        }
    }
}

/// `command` followed by shell-quoted `args`.
fn command_line(command: &str, args: &[String]) -> String {
    let mut line = command.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&shell_quote(arg));
    }
    line
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,@%+".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

async fn capture(cmd: &mut Command) -> Result<ExecutionOutput, ExecutionError> {
    let mut attempt = 0;
    let output = loop {
        match cmd.output().await {
            Ok(output) => break output,
            Err(e) if is_text_busy(&e) && attempt < SPAWN_BUSY_RETRIES => {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(20 * u64::from(attempt))).await;
            }
            Err(e) => {
                warn!(error = %e, "failed to spawn process");
                return Err(ExecutionError::CommandFailed {
                    output: ExecutionOutput::spawn_failure(e.to_string()),
                });
            }
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let result = ExecutionOutput::process(stdout, stderr, output.status.code());

    if result.completed {
        Ok(result)
    } else {
        warn!(exit_code = ?result.exit_code, "process failed");
        Err(ExecutionError::CommandFailed { output: result })
    }
}

#[cfg(unix)]
fn is_text_busy(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(26)
}

#[cfg(not(unix))]
fn is_text_busy(_e: &std::io::Error) -> bool {
    false
}

/// Add the execute bits when none are set.
#[cfg(unix)]
async fn ensure_executable(path: &Path) -> Result<(), ExecutionError> {
    use std::os::unix::fs::PermissionsExt;

    let perm_err = |source| ExecutionError::ScriptPermissions {
        path: path.to_path_buf(),
        source,
    };
    let mut perms = tokio::fs::metadata(path).await.map_err(perm_err)?.permissions();
    let mode = perms.mode();
    if mode & 0o111 != 0 {
        return Ok(());
    }

    perms.set_mode(mode | 0o755);
    tokio::fs::set_permissions(path, perms).await.map_err(perm_err)?;
    debug!(script = %path.display(), "made script executable");
    Ok(())
}

#[cfg(not(unix))]
async fn ensure_executable(_path: &Path) -> Result<(), ExecutionError> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::TaskKind;
    use rstest::rstest;
    use serde_json::json;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn runnable(r: Runnable) -> Task {
        Task::runnable(json!({ "title": "test" }), r).with_id("t")
    }

    fn command(line: &str) -> Task {
        runnable(Runnable::Command {
            command: line.into(),
            args: vec![],
            env: BTreeMap::new(),
        })
    }

    fn write_script(dir: &Path, name: &str, body: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[rstest]
    #[case("plain", "plain")]
    #[case("a b", "'a b'")]
    #[case("", "''")]
    #[case("it's", r"'it'\''s'")]
    #[case("$HOME", "'$HOME'")]
    fn quoting(#[case] arg: &str, #[case] expected: &str) {
        assert_eq!(shell_quote(arg), expected);
    }

    #[tokio::test]
    async fn command_stdout_is_captured_and_trimmed() {
        let dir = TempDir::new().unwrap();
        let exec = ProcessExecutor::new(dir.path());

        let out = exec.execute(&command("echo 'Hello World'")).await.unwrap();
        assert!(out.completed);
        assert_eq!(out.stdout.as_deref(), Some("Hello World"));
        assert_eq!(out.exit_code, Some(0));
    }

    #[tokio::test]
    async fn command_args_and_env_are_passed() {
        let dir = TempDir::new().unwrap();
        let exec = ProcessExecutor::new(dir.path());
        let task = runnable(Runnable::Command {
            command: "printf '%s|%s' \"$GREETING\"".into(),
            args: vec!["two words".into()],
            env: BTreeMap::from([("GREETING".to_string(), "hi".to_string())]),
        });

        let out = exec.execute(&task).await.unwrap();
        assert_eq!(out.stdout.as_deref(), Some("hi|two words"));
    }

    #[tokio::test]
    async fn failing_command_rejects_with_captured_output() {
        let dir = TempDir::new().unwrap();
        let exec = ProcessExecutor::new(dir.path());

        let err = exec.execute(&command("echo oops >&2; exit 3")).await.unwrap_err();
        let output = err.output().unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stderr.as_deref(), Some("oops"));
        assert_eq!(err.to_string(), "command failed (exit code 3): oops");
    }

    #[tokio::test]
    async fn script_without_execute_bit_is_chmodded_and_run() {
        let dir = TempDir::new().unwrap();
        let path = write_script(dir.path(), "hello.sh", "#!/bin/sh\necho \"Hello $1\"\n", 0o644);
        let exec = ProcessExecutor::new(dir.path());
        let task = runnable(Runnable::Script {
            path: "hello.sh".into(),
            args: vec!["World".into()],
            env: BTreeMap::new(),
        });

        let out = exec.execute(&task).await.unwrap();
        assert_eq!(out.stdout.as_deref(), Some("Hello World"));

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o755, 0o755);
    }

    #[tokio::test]
    async fn failing_script_rejects() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "fail.sh", "#!/bin/sh\necho 'Error script' >&2\nexit 1\n", 0o755);
        let exec = ProcessExecutor::new(dir.path());
        let task = runnable(Runnable::Script {
            path: "fail.sh".into(),
            args: vec![],
            env: BTreeMap::new(),
        });

        let err = exec.execute(&task).await.unwrap_err();
        assert_eq!(err.output().and_then(|o| o.error.as_deref()), Some("Error script"));
    }

    #[tokio::test]
    async fn missing_script_is_not_found() {
        let dir = TempDir::new().unwrap();
        let exec = ProcessExecutor::new(dir.path());
        let task = runnable(Runnable::Script {
            path: "nope.sh".into(),
            args: vec![],
            env: BTreeMap::new(),
        });

        assert!(matches!(
            exec.execute(&task).await,
            Err(ExecutionError::ScriptNotFound(p)) if p.ends_with("nope.sh")
        ));
    }

    #[tokio::test]
    async fn functions_resolve_by_name() {
        let dir = TempDir::new().unwrap();
        let mut exec = ProcessExecutor::new(dir.path());
        exec.functions_mut()
            .register("testFunc", |args: Vec<Value>| async move {
                Ok::<_, crate::impls::FunctionError>(json!(format!("test result {}", args.len())))
            })
            .unwrap();
        exec.functions_mut()
            .register("errorFunc", |_args: Vec<Value>| async {
                Err::<Value, _>(crate::impls::FunctionError::new("Function error"))
            })
            .unwrap();

        let call = |name: &str| {
            runnable(Runnable::Function {
                function: name.into(),
                args: vec![json!("arg1"), json!("arg2")],
            })
        };

        let ok = exec.execute(&call("testFunc")).await.unwrap();
        assert_eq!(ok, ExecutionOutput::value(json!("test result 2")));

        let failed = exec.execute(&call("errorFunc")).await.unwrap();
        assert!(!failed.completed);
        assert_eq!(failed.error.as_deref(), Some("Function error"));

        assert!(matches!(
            exec.execute(&call("unknownFunc")).await,
            Err(ExecutionError::FunctionNotRegistered(name)) if name == "unknownFunc"
        ));
    }

    #[tokio::test]
    async fn non_runnable_and_unknown_types_are_rejected() {
        let exec = ProcessExecutor::new(".");

        let data = Task::data(json!("just data"));
        assert!(matches!(exec.execute(&data).await, Err(ExecutionError::NotRunnable)));

        let mut bare = Task::data(json!({}));
        bare.kind = TaskKind::Runnable;
        assert!(matches!(exec.execute(&bare).await, Err(ExecutionError::NotRunnable)));

        let unknown: Task = serde_json::from_value(json!({
            "type": "runnable",
            "runnable": { "type": "unknown", "command": "test" }
        }))
        .unwrap();
        assert!(matches!(
            exec.execute(&unknown).await,
            Err(ExecutionError::UnknownRunnableType(t)) if t == "unknown"
        ));

        let missing_command: Task = serde_json::from_value(json!({
            "type": "runnable",
            "runnable": { "type": "command" }
        }))
        .unwrap();
        match exec.execute(&missing_command).await {
            Err(ExecutionError::MalformedRunnable { kind, reason }) => {
                assert_eq!(kind, "command");
                assert!(reason.contains("missing field"), "{reason}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
