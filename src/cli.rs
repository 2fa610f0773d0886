// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::TransferCheck;

/// Command-line arguments for `eldorado`.
///
/// Every option except `--dry-run` and the logging flags can also be set in
/// the site config; flags given here win.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "eldorado",
    version,
    about = "Schedule basecalling, merging and demultiplexing of nanopore runs.",
    long_about = None
)]
pub struct CliArgs {
    /// Root directory to search for runs.
    #[arg(long, value_name = "DIR")]
    pub root_dir: Option<PathBuf>,

    /// Glob pattern (relative to the root) matching pod5 directories,
    /// e.g. `*/*/*/pod5*`.
    #[arg(long, value_name = "GLOB")]
    pub pattern: Option<String>,

    /// Site config file (TOML).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Per-project settings (CSV).
    #[arg(long, value_name = "PATH")]
    pub project_config: Option<PathBuf>,

    /// Directory holding dorado models.
    #[arg(long, value_name = "DIR")]
    pub models_dir: Option<PathBuf>,

    /// Mail recipient for job failure notifications. Repeatable.
    #[arg(long = "mail-user", value_name = "EMAIL")]
    pub mail_users: Vec<String>,

    /// Minimum total size in bytes of the files in a new batch.
    #[arg(long, value_name = "BYTES")]
    pub min_batch_size: Option<u64>,

    /// Maximum total size in bytes of one batch.
    #[arg(long, value_name = "BYTES")]
    pub max_batch_size: Option<u64>,

    /// How to decide that a pod5 file is completely written.
    #[arg(long, value_enum, value_name = "CHECK")]
    pub transfer_check: Option<TransferCheck>,

    /// Quiescence period for `--transfer-check age`, in seconds.
    #[arg(long, value_name = "SECS")]
    pub min_age_secs: Option<u64>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ELDORADO_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Also append log lines to this file.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log what would be done without touching markers or submitting jobs.
    #[arg(long)]
    pub dry_run: bool,
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
