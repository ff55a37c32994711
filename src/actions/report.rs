//! Execution reports.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ExecutionMode;
use crate::artifact::{self, Artifact, ArtifactError};
use crate::plan::ActionKind;
use crate::workspace::{timestamp_tag, WorkLayout};

/// Final state of one planned action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Dry run: what would happen was recorded, nothing was touched.
    Reported,
    Completed,
    SkippedExists,
    SkippedMissing,
    /// KEEP: no filesystem effect.
    Unchanged,
    Failed,
}

impl ActionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reported => "reported",
            Self::Completed => "completed",
            Self::SkippedExists => "skipped_exists",
            Self::SkippedMissing => "skipped_missing",
            Self::Unchanged => "unchanged",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_skip(self) -> bool {
        matches!(self, Self::SkippedExists | Self::SkippedMissing)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Position of the action in the plan.
    pub index: usize,
    pub kind: ActionKind,
    pub source: PathBuf,
    /// Resolved destination, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    pub status: ActionStatus,
    pub detail: String,
    /// Bytes removed (DELETE) or moved (RENAME/RELOCATE) when completed.
    pub bytes: u64,
}

/// Aggregates derived from the outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub count_by_status: BTreeMap<ActionStatus, usize>,
    pub files_deleted: usize,
    pub files_renamed: usize,
    pub files_relocated: usize,
    pub bytes_reclaimed: u64,
}

impl ExecutionSummary {
    #[must_use]
    pub fn from_outcomes(outcomes: &[ActionOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            *summary.count_by_status.entry(outcome.status).or_insert(0) += 1;
            if outcome.status != ActionStatus::Completed {
                continue;
            }
            match outcome.kind {
                ActionKind::Delete => {
                    summary.files_deleted += 1;
                    summary.bytes_reclaimed += outcome.bytes;
                }
                ActionKind::Rename => summary.files_renamed += 1,
                ActionKind::Relocate => summary.files_relocated += 1,
                ActionKind::Keep => {}
            }
        }
        summary
    }

    #[must_use]
    pub fn count(&self, status: ActionStatus) -> usize {
        self.count_by_status.get(&status).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(ActionStatus::Failed)
    }
}

impl fmt::Display for ExecutionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} deleted, {} renamed, {} relocated, {} skipped, {} failed; {} reclaimed",
            self.files_deleted,
            self.files_renamed,
            self.files_relocated,
            self.count(ActionStatus::SkippedExists) + self.count(ActionStatus::SkippedMissing),
            self.failed(),
            ByteSize::b(self.bytes_reclaimed)
        )
    }
}

/// Record of one execution run. Written once, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub id: String,
    pub plan_id: String,
    pub mode: ExecutionMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Stopped early by Ctrl+C; actions after the last outcome did not run.
    pub interrupted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    pub outcomes: Vec<ActionOutcome>,
    pub summary: ExecutionSummary,
}

impl Artifact for ExecutionReport {
    const KIND: &'static str = "execution_report";
    const VERSION: u32 = 1;
}

impl ExecutionReport {
    #[must_use]
    pub fn new(
        plan_id: &str,
        mode: ExecutionMode,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        interrupted: bool,
        backup: Option<PathBuf>,
        outcomes: Vec<ActionOutcome>,
    ) -> Self {
        let summary = ExecutionSummary::from_outcomes(&outcomes);
        Self {
            id: format!("exec_{plan_id}_{}_{}", mode.as_str(), timestamp_tag(started_at)),
            plan_id: plan_id.to_string(),
            mode,
            started_at,
            finished_at,
            interrupted,
            backup,
            outcomes,
            summary,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ActionOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == ActionStatus::Failed)
    }

    /// Write under `reports/`, never replacing an earlier report.
    ///
    /// If a report with the same id exists (two runs within a millisecond),
    /// `_1`, `_2`, ... is appended to the id.
    pub fn save(&mut self, layout: &WorkLayout) -> Result<PathBuf, ArtifactError> {
        let base = self.id.clone();
        let mut attempt = 0usize;
        loop {
            let path = layout.report_path(&self.id);
            match artifact::write_new(&path, self) {
                Ok(()) => return Ok(path),
                Err(ArtifactError::AlreadyExists(_)) if attempt < 100 => {
                    attempt += 1;
                    self.id = format!("{base}_{attempt}");
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        artifact::read(path)
    }
}
