//! volclean - resumable duplicate scanning and plan-based cleanup
//!
//! Pipeline:
//!
//! 1. [`index`]: fingerprint trusted roots into a [`index::MasterIndex`]
//! 2. [`batch`]: classify an external root against it in resumable batches
//! 3. [`plan`]: turn the batch reports into a deterministic [`plan::ActionPlan`]
//! 4. [`actions`]: dry-run or apply the plan behind a verified backup

pub mod actions;
pub mod artifact;
pub mod batch;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod index;
pub mod logging;
pub mod output;
pub mod plan;
pub mod progress;
pub mod prompt;
pub mod scanner;
pub mod signal;
pub mod workspace;

use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use bytesize::ByteSize;
use yansi::Paint;

use crate::actions::{ExecutionMode, ExecutionReport, PlanExecutor};
use crate::batch::{BatchCoordinator, RunRequest, RunSummary};
use crate::cli::{Cli, Commands, ExecuteArgs, IndexArgs, PlanArgs, ScanArgs};
use crate::config::Config;
use crate::error::ExitCode;
use crate::index::{IndexBuilder, MasterIndex};
use crate::output::csv::PlanCsv;
use crate::plan::{ActionKind, ActionPlan, SaveOutcome};
use crate::progress::{Progress, ProgressCallback};
use crate::workspace::WorkLayout;

/// Shared state for one invocation.
struct AppContext {
    config: Config,
    layout: WorkLayout,
    shutdown: signal::ShutdownHandler,
    progress: Option<Arc<dyn ProgressCallback>>,
    quiet: bool,
}

/// Run the command described by `cli`.
///
/// Returns the exit code for completed runs; fatal problems are errors.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = cli.work_dir {
        config.work_dir = Some(dir);
    }
    match &cli.command {
        Commands::Index(args) => {
            if let Some(threads) = args.io_threads {
                config.io_threads = threads;
            }
        }
        Commands::Scan(args) => {
            if let Some(threads) = args.io_threads {
                config.io_threads = threads;
            }
            if let Some(size) = args.batch_size {
                config.batch_size = size;
            }
        }
        _ => {}
    }
    config.validate().context("Invalid configuration")?;

    let layout = WorkLayout::new(config.resolved_work_dir()?);
    let shutdown = signal::install_handler().context("Failed to install Ctrl+C handler")?;
    let progress: Option<Arc<dyn ProgressCallback>> = if cli.no_progress || cli.quiet {
        None
    } else {
        Some(Arc::new(Progress::new(false)))
    };
    log::debug!("Work directory: {}", layout.base().display());

    let ctx = AppContext {
        config,
        layout,
        shutdown,
        progress,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Index(args) => run_index(&ctx, &args),
        Commands::Scan(args) => run_scan(&ctx, &args),
        Commands::Plan(args) => run_plan(&ctx, &args),
        Commands::DryRun(args) => run_execute(&ctx, &args, ExecutionMode::DryRun),
        Commands::Execute(args) => run_execute(&ctx, &args, ExecutionMode::Live),
    }
}

fn run_index(ctx: &AppContext, args: &IndexArgs) -> anyhow::Result<ExitCode> {
    let mut builder = IndexBuilder::new(ctx.config.scan_config())
        .with_io_threads(ctx.config.io_threads)
        .with_chunk_size(ctx.config.chunk_size)
        .with_shutdown_flag(ctx.shutdown.get_flag());
    if let Some(ref progress) = ctx.progress {
        builder = builder.with_progress_callback(Arc::clone(progress));
    }

    let (index, stats) = builder.build(&args.roots).context("Failed to build master index")?;
    let path = ctx.layout.index_path();
    index
        .save(&path)
        .with_context(|| format!("Failed to save master index to {}", path.display()))?;

    if !ctx.quiet {
        println!(
            "{} {} entries ({}) from {} files; {} shadowed, {} unreadable",
            "Indexed".green().bold(),
            index.len(),
            ByteSize::b(index.total_size()),
            stats.files_seen,
            stats.shadowed,
            stats.unreadable,
        );
        println!("Master index: {}", path.display());
    }

    if stats.unreadable > 0 || stats.walk_errors > 0 {
        Ok(ExitCode::PartialSuccess)
    } else {
        Ok(ExitCode::Success)
    }
}

fn run_scan(ctx: &AppContext, args: &ScanArgs) -> anyhow::Result<ExitCode> {
    let index_path = ctx.layout.index_path();
    let master = Arc::new(MasterIndex::load(&index_path).context("Failed to load master index")?);
    log::info!("Loaded master index with {} entries", master.len());

    let mut coordinator = BatchCoordinator::new(
        ctx.layout.clone(),
        ctx.config.scan_config(),
        ctx.config.io_threads,
        ctx.config.chunk_size,
    )?
    .with_shutdown_flag(ctx.shutdown.get_flag());
    if let Some(ref progress) = ctx.progress {
        coordinator = coordinator.with_progress_callback(Arc::clone(progress));
    }

    let request = RunRequest {
        batch_size: ctx.config.batch_size,
        start_batch: args.batch,
        count: args.count.map(|c| usize::try_from(c).unwrap_or(usize::MAX)),
        restart: args.restart,
    };
    let summary = coordinator
        .run(&args.root, &master, &request)
        .with_context(|| format!("Failed to scan {}", args.root.display()))?;

    if !ctx.quiet {
        print_scan_summary(ctx, &summary);
    }

    Ok(if summary.interrupted {
        ExitCode::Interrupted
    } else if summary.failures() > 0 {
        ExitCode::PartialSuccess
    } else {
        ExitCode::Success
    })
}

fn print_scan_summary(ctx: &AppContext, summary: &RunSummary) {
    for batch in &summary.batches {
        println!(
            "Batch {:>5}: files {}..{} | {} duplicates ({}) | {} unique | {} unreadable",
            batch.batch_number,
            batch.start_index + 1,
            batch.end_index,
            batch.duplicates_found,
            ByteSize::b(batch.duplicate_bytes),
            batch.uniques_found,
            batch.failures.len(),
        );
    }
    println!(
        "{} {} duplicates ({}) in {} batches",
        "Found".green().bold(),
        summary.duplicates_found(),
        ByteSize::b(summary.duplicate_bytes()),
        summary.batches.len(),
    );
    if summary.failures() > 0 {
        println!("{} {} files could not be read", "Warning:".yellow().bold(), summary.failures());
    }
    if summary.completed {
        println!("All {} files of {} classified", summary.total_files, summary.root.display());
        println!("Reports: {}", ctx.layout.scan_dir(&summary.root).display());
    } else {
        let state = if summary.interrupted { "Interrupted" } else { "Paused" };
        println!(
            "{} at file {} of {}; run the same command to resume",
            state.yellow().bold(),
            summary.next_start_index,
            summary.total_files,
        );
    }
}

fn run_plan(ctx: &AppContext, args: &PlanArgs) -> anyhow::Result<ExitCode> {
    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("Cannot resolve root {}", args.root.display()))?;
    let reports = batch::load_reports(&ctx.layout, &root).context("Failed to load batch reports")?;
    let rules = ctx.config.purpose_rules()?;
    let plan = plan::build_plan_from_reports(&reports, &rules).context("Failed to build plan")?;

    let path = ctx.layout.plan_path(&plan.id);
    match plan
        .save(&path)
        .with_context(|| format!("Failed to save plan to {}", path.display()))?
    {
        SaveOutcome::Written => log::info!("Plan written to {}", path.display()),
        SaveOutcome::AlreadyPresent => log::info!("Identical plan already at {}", path.display()),
    }
    if let Some(ref output) = args.output {
        PlanCsv::new(&plan)
            .write_file(output)
            .with_context(|| format!("Failed to write {}", output.display()))?;
    }

    if !ctx.quiet {
        print_plan_summary(&plan);
        println!("Plan: {}", path.display());
    }
    Ok(ExitCode::Success)
}

fn print_plan_summary(plan: &ActionPlan) {
    let counts = plan.counts_by_kind();
    println!(
        "{} {}: {} delete, {} rename, {} relocate, {} keep; {} reclaimable",
        "Plan".green().bold(),
        plan.id,
        counts[&ActionKind::Delete],
        counts[&ActionKind::Rename],
        counts[&ActionKind::Relocate],
        counts[&ActionKind::Keep],
        ByteSize::b(plan.reclaimable_bytes()),
    );
}

fn run_execute(ctx: &AppContext, args: &ExecuteArgs, mode: ExecutionMode) -> anyhow::Result<ExitCode> {
    let plan = ActionPlan::load(&args.plan)
        .with_context(|| format!("Failed to load plan {}", args.plan.display()))?;
    if !ctx.quiet {
        print_plan_summary(&plan);
    }

    if mode == ExecutionMode::Live && plan.mutating().next().is_some() && !args.yes {
        if !std::io::stdin().is_terminal() {
            bail!("Refusing to modify files without confirmation; pass --yes");
        }
        if !prompt::confirm("Back up and apply this plan?", Some(false))? {
            println!("Aborted; nothing was changed.");
            return Ok(ExitCode::Success);
        }
    }

    let mut options = ctx.config.execute_options();
    if args.permanent {
        options.use_trash = false;
    }
    let mut executor =
        PlanExecutor::new(ctx.layout.clone(), options).with_shutdown_flag(ctx.shutdown.get_flag());
    if let Some(ref progress) = ctx.progress {
        executor = executor.with_progress_callback(Arc::clone(progress));
    }

    let (report, path) = executor
        .execute(&plan, mode)
        .with_context(|| format!("Failed to execute plan {}", plan.id))?;

    if !ctx.quiet {
        print_execution_summary(&report, &path);
    }

    Ok(if report.interrupted {
        ExitCode::Interrupted
    } else if report.summary.failed() > 0 {
        ExitCode::PartialSuccess
    } else {
        ExitCode::Success
    })
}

fn print_execution_summary(report: &ExecutionReport, path: &Path) {
    let label = match report.mode {
        ExecutionMode::DryRun => "Dry run",
        ExecutionMode::Live => "Executed",
    };
    println!("{} {}", label.green().bold(), report.summary);
    for failure in report.failures() {
        println!(
            "  {} {} {}: {}",
            "failed".red(),
            failure.kind,
            failure.source.display(),
            failure.detail
        );
    }
    if let Some(ref backup) = report.backup {
        println!("Backup: {}", backup.display());
    }
    println!("Report: {}", path.display());
}
