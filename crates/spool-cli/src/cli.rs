//! CLI definitions for spool.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};
use spool_core::PopMode;

/// spool CLI.
#[derive(Parser)]
#[command(name = "spool")]
#[command(about = "Priority task queue with a single working slot")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory queue files are resolved against
    #[arg(short, long, global = true)]
    pub dir: Option<PathBuf>,

    /// Queue file name
    #[arg(short, long, global = true)]
    pub file: Option<String>,

    /// Do not write the audit log
    #[arg(long, global = true)]
    pub no_audit: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Add a task to a priority bucket
    Push(PushArgs),

    /// Move the next task into the working slot (runs it if runnable)
    Pop {
        /// Only take from this bucket
        priority: Option<String>,

        /// FIFO (default) or LIFO
        mode: Option<PopMode>,
    },

    /// Show what pop would return
    Peek {
        priority: Option<String>,
    },

    /// Move a specific task into the working slot
    Start {
        id: String,
    },

    /// Mark a task completed
    Complete {
        id: String,
    },

    /// Put the working task back at the front of its bucket
    Restart,

    /// List pending tasks by bucket
    List {
        priority: Option<String>,

        /// Show every item instead of the display limit
        #[arg(long)]
        all: bool,
    },

    /// Bucket sizes, working task and counters
    Status,

    /// Reset the processed / failed counters
    ClearCompleted,

    /// Show recent audit log entries, newest first
    Log {
        #[arg(default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Args)]
#[command(group(ArgGroup::new("runnable").args(["run", "script", "function"])))]
pub(crate) struct PushArgs {
    /// Task title
    pub title: String,

    /// Priority bucket (default: medium)
    pub priority: Option<String>,

    /// Explicit task id
    #[arg(long)]
    pub id: Option<String>,

    /// Task content as JSON (the title is added when missing)
    #[arg(long)]
    pub content: Option<String>,

    /// Shell command to run
    #[arg(long = "run", value_name = "COMMAND")]
    pub run: Option<String>,

    /// Script file to run
    #[arg(long, value_name = "PATH")]
    pub script: Option<String>,

    /// Registered function to call
    #[arg(long, value_name = "NAME")]
    pub function: Option<String>,

    /// Argument for the runnable (repeatable; JSON values for functions)
    #[arg(long = "arg", value_name = "ARG")]
    pub args: Vec<String>,

    /// Environment variable for command/script runnables (KEY=VALUE, repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,
}
