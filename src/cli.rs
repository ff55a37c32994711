//! Command-line interface definitions for volclean.
//!
//! Global options (verbosity, config, work directory) plus one subcommand per
//! stage of the pipeline:
//!
//! ```bash
//! # Build the master index from trusted storage
//! volclean index /vol/master
//!
//! # Classify an external drive, two batches at a time
//! volclean scan /mnt/external --count 2
//!
//! # Build a plan from every batch report of the root
//! volclean plan /mnt/external
//!
//! # Preview, then apply
//! volclean dry-run ~/.local/share/volclean/plans/plan_0123456789abcdef.json
//! volclean execute ~/.local/share/volclean/plans/plan_0123456789abcdef.json
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Resumable duplicate scanning and safe, plan-based cleanup.
///
/// volclean indexes trusted storage, classifies external files against it in
/// resumable batches, and turns the results into a reviewable plan that is
/// only applied after a verified backup.
#[derive(Debug, Parser)]
#[command(name = "volclean")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (default: <config dir>/volclean/config.toml)
    #[arg(long, global = true, value_name = "FILE", env = "VOLCLEAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Work directory for indexes, scan reports, plans, reports and backups
    #[arg(long, global = true, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Do not draw progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Print fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build and save the master index from trusted roots
    Index(IndexArgs),
    /// Classify an external root against the master index, batch by batch
    Scan(ScanArgs),
    /// Build an action plan from every batch report of a root
    Plan(PlanArgs),
    /// Report what a plan would do without touching anything
    DryRun(ExecuteArgs),
    /// Back up, then apply a plan
    Execute(ExecuteArgs),
}

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Trusted roots; earlier roots win when contents repeat
    #[arg(value_name = "ROOT", required = true)]
    pub roots: Vec<PathBuf>,

    /// Number of fingerprinting threads
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// External root to classify
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Start at this batch (1-based) instead of resuming
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub batch: Option<u64>,

    /// Process at most this many batches
    #[arg(long, value_name = "M", value_parser = clap::value_parser!(u64).range(1..))]
    pub count: Option<u64>,

    /// Files per batch
    #[arg(long, value_name = "S")]
    pub batch_size: Option<usize>,

    /// Discard the saved checkpoint and start from the first file
    #[arg(long, conflicts_with = "batch")]
    pub restart: bool,

    /// Number of fingerprinting threads
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Root whose batch reports feed the plan
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Also write the plan as CSV to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ExecuteArgs {
    /// Plan file written by `volclean plan`
    #[arg(value_name = "PLAN")]
    pub plan: PathBuf,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Delete duplicates permanently even if the config enables the trash
    #[arg(long)]
    pub permanent: bool,
}
