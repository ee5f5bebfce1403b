// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::types::OnlyFilter;

/// Command-line arguments for `assetdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "assetdag",
    version,
    about = "Run data pipelines as a DAG of assets, checks and metadata pushes.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ASSETDAG_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Execute the pipeline, or part of it.
    Run(RunArgs),
    /// Parse and validate the pipeline, print the task graph, run nothing.
    Validate(ValidateArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Pipeline file, or a directory containing `pipeline.toml`.
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    /// Run only this asset (everything else counts as already succeeded).
    #[arg(long, value_name = "NAME")]
    pub asset: Option<String>,

    /// With `--asset` or `--tag`, also run everything downstream.
    #[arg(long)]
    pub downstream: bool,

    /// Number of concurrent workers. Defaults to `pipeline.concurrency`,
    /// then 8.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Start of the data interval: `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`.
    /// Default: yesterday.
    #[arg(long, value_name = "DATE")]
    pub start_date: Option<String>,

    /// End of the data interval. Default: today.
    #[arg(long, value_name = "DATE")]
    pub end_date: Option<String>,

    /// Environment from `[environment.<name>]`.
    #[arg(long, value_name = "NAME")]
    pub environment: Option<String>,

    /// Required to run against a production environment.
    #[arg(long)]
    pub force: bool,

    /// Run only assets carrying this tag.
    #[arg(long, value_name = "TAG", conflicts_with = "asset")]
    pub tag: Option<String>,

    /// Skip assets carrying this tag.
    #[arg(long, value_name = "TAG")]
    pub exclude_tag: Option<String>,

    /// Restrict the run to one kind of task.
    #[arg(long, value_enum, value_name = "KIND")]
    pub only: Option<OnlyFilter>,
}

#[derive(Debug, Clone, Args)]
pub struct ValidateArgs {
    /// Pipeline file, or a directory containing `pipeline.toml`.
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,
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
