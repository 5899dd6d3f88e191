// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `etlgraph`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "etlgraph",
    version,
    about = "Run a DAG of warehouse ETL tasks with retries and fail-fast propagation.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the DAG definition (TOML).
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        default_value_os_t = default_config_path()
    )]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ETLGRAPH_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Parse and validate the DAG, print it in topological order.
    Validate,

    /// Trigger one run and wait for it to finish.
    Run {
        /// Tick to run (RFC 3339). Defaults to the latest due schedule tick,
        /// or the current time for unscheduled DAGs.
        #[arg(long, value_name = "TIME")]
        tick: Option<DateTime<Utc>>,
    },

    /// Fire runs on the configured cron schedule until Ctrl-C.
    Schedule,

    /// Print a persisted run with per-task status and transition counters.
    Inspect {
        /// Run id; defaults to the latest run.
        #[arg(long, value_name = "RUN_ID")]
        run: Option<String>,
    },

    /// Mark a failed task instance for retry and resume its run.
    Retry {
        #[arg(long, value_name = "TASK")]
        task: String,

        /// Run id; defaults to the latest run.
        #[arg(long, value_name = "RUN_ID")]
        run: Option<String>,
    },

    /// Resume a run that was interrupted before it finished.
    Resume {
        /// Run id; defaults to the latest run.
        #[arg(long, value_name = "RUN_ID")]
        run: Option<String>,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
