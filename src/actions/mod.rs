//! Plan execution.
//!
//! - [`executor`]: applies a plan action by action, dry-run or live
//! - [`backup`]: the tar.gz archive every live run must create first
//! - [`delete`]: duplicate removal via the system trash or permanently
//! - [`moves`]: RENAME/RELOCATE with a cross-filesystem fallback
//! - [`report`]: per-action outcomes and aggregates
//!
//! ```no_run
//! use volclean::actions::{ExecuteOptions, ExecutionMode, PlanExecutor};
//! use volclean::plan::ActionPlan;
//! use volclean::workspace::WorkLayout;
//!
//! let layout = WorkLayout::new("/var/lib/volclean");
//! let plan = ActionPlan::load(&layout.plan_path("0123456789abcdef")).unwrap();
//! let executor = PlanExecutor::new(layout, ExecuteOptions::default());
//! let (report, path) = executor.execute(&plan, ExecutionMode::DryRun).unwrap();
//! println!("{} -> {}", report.summary, path.display());
//! ```

pub mod backup;
pub mod delete;
pub mod executor;
pub mod moves;
pub mod report;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::ArtifactError;

pub use backup::{create_backup, read_manifest, verify_backup, BackupError, BackupInfo, BackupManifest};
pub use delete::{delete_duplicate, delete_to_trash, permanent_delete, DeleteError};
pub use executor::{ExecuteOptions, PlanExecutor};
pub use moves::{move_file, MoveError};
pub use report::{ActionOutcome, ActionStatus, ExecutionReport, ExecutionSummary};

/// Whether a run may touch the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    DryRun,
    Live,
}

impl ExecutionMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DryRun => "dry_run",
            Self::Live => "live",
        }
    }
}

/// Run-level execution failures. Per-action failures are outcomes, not
/// errors.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The backup gate failed; nothing was mutated.
    #[error("Backup failed, no changes were made: {0}")]
    Backup(#[from] BackupError),

    #[error("Failed to write execution report: {0}")]
    Artifact(#[from] ArtifactError),
}
