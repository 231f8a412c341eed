mod cli;

use std::collections::BTreeMap;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use serde_json::{Value, json};
use spool_core::{
    BuildError, ConfigError, ExecutionMode, LogEntry, QueueConfig, QueueError, Runnable, Task,
    TaskId, TaskQueue, TaskQueueBuilder,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, PushArgs};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

fn init_tracing(verbose: bool) {
    // stdout is reserved for command output
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<QueueConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => QueueConfig::from_toml_file(path)?,
        None => QueueConfig::default(),
    };
    if let Some(dir) = &cli.dir {
        config.base_dir = dir.clone();
    }
    if let Some(file) = &cli.file {
        config.queue_file = file.clone();
    }
    if cli.no_audit {
        config.audit_log = None;
    }
    // one-shot process: finish executions before exiting
    config.execution = ExecutionMode::Inline;
    Ok(config)
}

fn task_line(task: &Task) -> String {
    format!(
        "{}  [{}]  {}  {}",
        task.id,
        task.priority,
        task.status,
        task.title()
    )
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_task(task: Option<&Task>, json_output: bool, empty: &str) -> Result<(), CliError> {
    if json_output {
        return print_json(&task);
    }
    match task {
        Some(task) => println!("{}", task_line(task)),
        None => println!("{empty}"),
    }
    Ok(())
}

fn build_task(args: &PushArgs) -> Result<Task, CliError> {
    let raw_content: Value = match &args.content {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| CliError::InvalidArgument(format!("--content is not JSON: {e}")))?,
        None => json!({}),
    };
    let content = match raw_content {
        Value::Object(mut map) => {
            map.entry("title")
                .or_insert_with(|| Value::String(args.title.clone()));
            Value::Object(map)
        }
        other => json!({ "title": args.title, "data": other }),
    };

    let env = args
        .env
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| CliError::InvalidArgument(format!("expected KEY=VALUE, got {pair:?}")))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    let runnable = if let Some(command) = &args.run {
        Some(Runnable::Command {
            command: command.clone(),
            args: args.args.clone(),
            env,
        })
    } else if let Some(path) = &args.script {
        Some(Runnable::Script {
            path: path.clone(),
            args: args.args.clone(),
            env,
        })
    } else {
        args.function.as_ref().map(|function| Runnable::Function {
            function: function.clone(),
            args: args
                .args
                .iter()
                .map(|a| serde_json::from_str(a).unwrap_or_else(|_| Value::String(a.clone())))
                .collect(),
        })
    };

    let mut task = match runnable {
        Some(runnable) => Task::runnable(content, runnable),
        None => Task::data(content),
    };
    if let Some(id) = &args.id {
        task = task.with_id(id.as_str());
    }
    Ok(task)
}

fn print_log(entries: &[LogEntry]) {
    if entries.is_empty() {
        println!("(no log entries)");
    }
    for entry in entries {
        println!(
            "{}  {:<10}  {}  [{}]  {}",
            entry.timestamp.to_rfc3339(),
            entry.operation,
            entry.task_id,
            entry.priority,
            entry.title
        );
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli)?;
    debug!(base_dir = %config.base_dir.display(), queue_file = %config.queue_file, "opening queue");
    let queue: TaskQueue = TaskQueueBuilder::new(config).build()?;
    let file = queue.default_queue_file().to_string();
    let json_output = cli.json;

    match cli.command {
        Commands::Push(args) => {
            let task = build_task(&args)?;
            let stored = queue.push(task, args.priority.as_deref(), &file).await?;
            if json_output {
                print_json(&stored)?;
            } else {
                println!("pushed {} [{}]", stored.id, stored.priority);
            }
        }
        Commands::Pop { priority, mode } => {
            let popped = queue
                .pop_with_mode(priority.as_deref(), mode.unwrap_or_default(), &file)
                .await?;
            print_task(popped.working_item.as_ref(), json_output, "(queue is empty)")?;
        }
        Commands::Peek { priority } => {
            let next = queue.peek(priority.as_deref(), &file).await?;
            print_task(next.as_ref(), json_output, "(queue is empty)")?;
        }
        Commands::Start { id } => {
            let task = queue.start(&TaskId::new(id), &file).await?;
            print_task(Some(&task), json_output, "")?;
        }
        Commands::Complete { id } => {
            let task = queue.complete(&TaskId::new(id), &file).await?;
            print_task(Some(&task), json_output, "")?;
        }
        Commands::Restart => {
            let moved = queue.restart(&file).await?;
            print_task(moved.as_ref(), json_output, "(nothing is working)")?;
        }
        Commands::List { priority, all } => {
            let listing = queue.list(priority.as_deref(), &file).await?;
            if json_output {
                return print_json(&listing);
            }
            if let Some(working) = &listing.working {
                println!("working: {}", task_line(working));
            }
            let limit = if all { usize::MAX } else { listing.display_limit };
            for bucket in &listing.buckets {
                println!("{} ({})", bucket.priority, bucket.items.len());
                for task in bucket.items.iter().take(limit) {
                    println!("  {}", task_line(task));
                }
                if bucket.items.len() > limit {
                    println!("  ... and {} more", bucket.items.len() - limit);
                }
            }
        }
        Commands::Status => {
            let status = queue.status(&file).await?;
            if json_output {
                return print_json(&status);
            }
            match &status.working {
                Some(task) => println!("working:   {}", task_line(task)),
                None => println!("working:   (none)"),
            }
            println!("pending:   {}", status.total_pending);
            println!("processed: {}", status.total_processed);
            println!("failed:    {}", status.total_failed);
            println!("completed: {}", status.completed);
            for (priority, size) in &status.queue_sizes {
                println!("  {priority}: {size}");
            }
        }
        Commands::ClearCompleted => {
            queue.clear_completed(&file).await?;
            println!("counters cleared");
        }
        Commands::Log { limit } => {
            let entries = queue.show_log(limit).await?;
            if json_output {
                return print_json(&entries);
            }
            print_log(&entries);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
