//! Action plans: the reviewable set of intended filesystem changes.
//!
//! - [`rules`]: ordered purpose rules deciding RENAME/RELOCATE for unique files
//! - [`naming`]: descriptive names and deterministic `_n` collision suffixes
//! - [`builder`]: classified files to [`ActionPlan`]
//!
//! Plans are written once under `plans/plan_<id>.json` and never edited.

pub mod builder;
pub mod naming;
pub mod rules;
pub mod types;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::artifact::{self, ArtifactError};

pub use builder::{build_plan, build_plan_from_reports, PlanContext};
pub use rules::{Disposition, PurposeRule, PurposeRules, RuleSpec};
pub use types::{ActionKind, ActionPlan, Destination, PlannedAction};

/// Errors from plan construction and persistence.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A destination could not be made unique. The plan is not emitted.
    #[error("Destination conflict at {destination}: {reason}")]
    Conflict { destination: String, reason: String },

    #[error("Invalid purpose rule '{category}': {reason}")]
    InvalidRule { category: String, reason: String },

    #[error("No batch reports to plan from; run a scan first")]
    NoReports,

    #[error("Batch reports cover different roots: {expected} and {found}")]
    MixedRoots { expected: PathBuf, found: PathBuf },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Whether [`ActionPlan::save`] wrote a new file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    /// An identical plan already exists at the path.
    AlreadyPresent,
}

impl ActionPlan {
    /// Write the plan without ever replacing an existing file.
    ///
    /// # Errors
    ///
    /// [`ArtifactError::AlreadyExists`] (wrapped) if a different plan is
    /// already stored at `path`.
    pub fn save(&self, path: &Path) -> Result<SaveOutcome, PlanError> {
        match artifact::write_new(path, self) {
            Ok(()) => Ok(SaveOutcome::Written),
            Err(ArtifactError::AlreadyExists(existing)) => match Self::load(&existing) {
                Ok(stored) if stored == *self => Ok(SaveOutcome::AlreadyPresent),
                _ => Err(PlanError::Artifact(ArtifactError::AlreadyExists(existing))),
            },
            Err(e) => Err(e.into()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, PlanError> {
        Ok(artifact::read(path)?)
    }
}
