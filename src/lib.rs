// src/lib.rs

pub mod cli;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod types;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command, RunArgs, ValidateArgs};
use crate::dag::Scheduler;
use crate::engine::{CancelHandle, LogObserver, Observers, ProgressPrinter};
use crate::errors::AssetdagError;
use crate::exec::context::{default_end_date, default_start_date};
use crate::exec::{ConcurrentExecutor, ExecutionContext, build_registry, parse_date};
use crate::pipeline::{Pipeline, load_and_validate};
use crate::report::RunSummary;
use crate::types::Status;

/// Worker count when neither `--workers` nor `pipeline.concurrency` is set.
pub const DEFAULT_WORKERS: usize = 8;

/// High-level entry point used by `main.rs`.
///
/// Returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    match args.command {
        Command::Run(run_args) => run_pipeline(run_args).await,
        Command::Validate(validate_args) => validate(validate_args),
    }
}

/// Execute a pipeline.
///
/// This wires together:
/// - pipeline loading and run parameters
/// - scheduler marking for partial runs
/// - operator registry and worker pool
/// - Ctrl-C handling
/// - the final report
pub async fn run_pipeline(args: RunArgs) -> Result<i32> {
    let pipeline = Arc::new(load_and_validate(&args.path)?);
    println!(
        "Analyzed the pipeline '{}' with {} assets.",
        pipeline.name(),
        pipeline.assets.len()
    );

    let mut ctx = build_context(&args, &pipeline)?;
    let workers = args
        .workers
        .or(pipeline.settings.concurrency)
        .unwrap_or(DEFAULT_WORKERS);

    let observers = Observers::new().with(LogObserver).with(ProgressPrinter);
    let mut scheduler = Scheduler::new(Arc::clone(&pipeline)).with_observers(observers.clone());
    apply_run_filters(&mut scheduler, &args)?;

    let registry = build_registry(&scheduler);
    let executor = ConcurrentExecutor::new(registry, workers)?.with_observers(observers);

    // Ctrl-C → cancel the run; in-flight work drains.
    let cancel = CancelHandle::new();
    let signal = cancel.signal();
    ctx = ctx.with_cancel(signal.clone());
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        cancel.cancel();
    });

    info!(
        run_id = %ctx.run_id,
        workers,
        start_date = %ctx.start_date,
        end_date = %ctx.end_date,
        environment = ctx.environment.as_deref().unwrap_or("-"),
        "starting pipeline execution"
    );
    println!("\nStarting the pipeline execution...\n");

    let channels = scheduler.worker_channels()?;
    let handles = executor.start(channels, ctx);

    let started = Instant::now();
    let results = scheduler.run(signal).await?;
    let duration = started.elapsed();

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "worker task panicked");
        }
    }

    let summary = RunSummary::new(&results, &scheduler, duration);
    summary.print();
    Ok(summary.exit_code())
}

/// Resolve dates and environment into an [`ExecutionContext`].
fn build_context(args: &RunArgs, pipeline: &Pipeline) -> Result<ExecutionContext> {
    let start_date = match args.start_date.as_deref() {
        Some(s) => parse_date(s)?,
        None => default_start_date(),
    };
    let end_date = match args.end_date.as_deref() {
        Some(s) => parse_date(s)?,
        None => default_end_date(),
    };
    if start_date > end_date {
        return Err(AssetdagError::ConfigError(format!(
            "start date {start_date} is after end date {end_date}"
        ))
        .into());
    }

    let mut ctx = ExecutionContext::new(start_date, end_date);

    if let Some(name) = args.environment.as_deref() {
        let env = pipeline.environments.get(name).ok_or_else(|| {
            AssetdagError::ConfigError(format!(
                "unknown environment '{name}'; defined: {:?}",
                pipeline.environments.keys().collect::<Vec<_>>()
            ))
        })?;

        if env.production && !args.force {
            return Err(AssetdagError::ConfigError(format!(
                "environment '{name}' is a production environment; pass --force to run against it"
            ))
            .into());
        }

        ctx = ctx.with_environment(name, env);
    }

    Ok(ctx)
}

/// Pre-run marking from `--asset`, `--tag`, `--exclude-tag` and `--only`.
pub fn apply_run_filters(scheduler: &mut Scheduler, args: &RunArgs) -> Result<()> {
    if let Some(asset) = args.asset.as_deref() {
        println!("Running only the asset '{asset}'");
        if args.downstream {
            println!("The downstream tasks will be executed as well.");
        }
        scheduler.mark_all(Status::Succeeded);
        scheduler.mark_asset(asset, Status::Pending, args.downstream)?;
    } else if let Some(tag) = args.tag.as_deref() {
        scheduler.mark_all(Status::Succeeded);
        let matched = scheduler.mark_by_tag(tag, Status::Pending, args.downstream);
        if matched == 0 {
            return Err(AssetdagError::ConfigError(format!("no asset is tagged '{tag}'")).into());
        }
        println!("Running {matched} assets tagged '{tag}'");
    } else if args.downstream {
        println!("Ignoring the '--downstream' flag since you are running the whole pipeline");
    }

    if let Some(tag) = args.exclude_tag.as_deref() {
        let excluded = scheduler.mark_by_tag(tag, Status::Skipped, false);
        debug!(tag, excluded, "excluded tagged assets");
    }

    if let Some(only) = args.only {
        for &kind in only.excluded_kinds() {
            let skipped = scheduler.mark_pending_instances_by_kind(kind, Status::Skipped);
            debug!(%kind, skipped, "skipped instances filtered out by --only");
        }
    }

    Ok(())
}

/// Validate a pipeline and print its task graph without executing anything.
pub fn validate(args: ValidateArgs) -> Result<i32> {
    let pipeline = Arc::new(load_and_validate(&args.path)?);
    let scheduler = Scheduler::new(Arc::clone(&pipeline));
    print!("{}", render_plan(&scheduler));
    debug!("validate complete (no execution)");
    Ok(0)
}

/// Text listing of every asset and its task instances.
pub fn render_plan(scheduler: &Scheduler) -> String {
    use std::fmt::Write as _;

    let pipeline = scheduler.pipeline();
    let graph = scheduler.graph();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "pipeline '{}' is valid: {} assets, {} tasks",
        pipeline.name(),
        pipeline.assets.len(),
        scheduler.instance_count()
    );

    for asset in pipeline.assets.iter() {
        let _ = writeln!(out, "  - {} [{}]", asset.name, asset.asset_type);
        if !asset.depends.is_empty() {
            let _ = writeln!(out, "      depends: {}", asset.depends.join(", "));
        }
        if !asset.tags.is_empty() {
            let _ = writeln!(out, "      tags: {}", asset.tags.join(", "));
        }
        for &id in graph.instances_of(&asset.name) {
            let instance = &graph.instances()[id];
            let _ = writeln!(out, "      task: {} ({})", instance.human_id(), instance.kind());
        }
    }

    out
}
