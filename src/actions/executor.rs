use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;

use super::backup::{create_backup, BackupInfo};
use super::delete::delete_duplicate;
use super::moves::move_file;
use super::report::{ActionOutcome, ActionStatus, ExecutionReport};
use super::{ExecuteError, ExecutionMode};
use crate::plan::{ActionKind, ActionPlan, Destination, PlannedAction};
use crate::progress::ProgressCallback;
use crate::workspace::WorkLayout;

/// Settings that affect how actions are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Send deleted duplicates to the system trash instead of removing them.
    pub use_trash: bool,
    /// Store directory per RELOCATE category.
    pub stores: BTreeMap<String, PathBuf>,
}

/// Applies an [`ActionPlan`] one action at a time.
pub struct PlanExecutor {
    layout: WorkLayout,
    options: ExecuteOptions,
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl PlanExecutor {
    #[must_use]
    pub fn new(layout: WorkLayout, options: ExecuteOptions) -> Self {
        Self {
            layout,
            options,
            shutdown_flag: None,
            progress_callback: None,
        }
    }

    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Execute `plan` and write its report.
    ///
    /// In live mode a verified backup of every source is created first; if
    /// that fails nothing is touched and no report is written. After the
    /// backup gate each action succeeds or fails on its own. Shutdown is
    /// checked between actions.
    pub fn execute(
        &self,
        plan: &ActionPlan,
        mode: ExecutionMode,
    ) -> Result<(ExecutionReport, PathBuf), ExecuteError> {
        let started_at = Utc::now();
        log::info!(
            "Executing plan {} ({} actions, {})",
            plan.id,
            plan.actions.len(),
            mode.as_str()
        );

        let backup = if mode == ExecutionMode::Live && plan.mutating().next().is_some() {
            if let Some(ref callback) = self.progress_callback {
                callback.on_phase_start("backup", 0);
            }
            let path = self.fresh_backup_path(plan, started_at);
            let result = create_backup(plan, &path, started_at);
            if let Some(ref callback) = self.progress_callback {
                callback.on_phase_end("backup");
            }
            let info: BackupInfo = result?;
            Some(info.path)
        } else {
            None
        };

        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_start("execute", plan.actions.len());
        }
        let mut outcomes = Vec::with_capacity(plan.actions.len());
        let mut interrupted = false;
        for (index, action) in plan.actions.iter().enumerate() {
            if self.is_shutdown_requested() {
                log::info!("Stopping before action {}: shutdown requested", index + 1);
                interrupted = true;
                break;
            }
            let outcome = self.apply(index, action, mode);
            if outcome.status == ActionStatus::Failed {
                log::warn!("{} {} failed: {}", action.kind, action.source.display(), outcome.detail);
            }
            if let Some(ref callback) = self.progress_callback {
                callback.on_progress(index + 1, &action.source.to_string_lossy());
            }
            outcomes.push(outcome);
        }
        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_end("execute");
        }

        let mut report = ExecutionReport::new(
            &plan.id,
            mode,
            started_at,
            Utc::now(),
            interrupted,
            backup,
            outcomes,
        );
        let path = report.save(&self.layout)?;
        log::info!("Execution report written to {}", path.display());
        Ok((report, path))
    }

    fn apply(&self, index: usize, action: &PlannedAction, mode: ExecutionMode) -> ActionOutcome {
        let mut outcome = ActionOutcome {
            index,
            kind: action.kind,
            source: action.source.clone(),
            destination: None,
            status: ActionStatus::Unchanged,
            detail: String::new(),
            bytes: 0,
        };

        if action.kind == ActionKind::Keep {
            outcome.detail = action.rationale.clone();
            return outcome;
        }

        let destination = match action.destination.as_ref() {
            Some(d) => match self.resolve(d) {
                Ok(path) => Some(path),
                Err(reason) => return fail(outcome, mode, reason),
            },
            None => None,
        };
        outcome.destination = destination.clone();

        if let Some(ref to) = destination {
            if to != &action.source && to.symlink_metadata().is_ok() {
                let detail = format!("{} already exists", to.display());
                return skip(outcome, mode, ActionStatus::SkippedExists, detail);
            }
        }
        if action.source.symlink_metadata().is_err() {
            return skip(outcome, mode, ActionStatus::SkippedMissing, "source no longer exists".into());
        }

        if mode == ExecutionMode::DryRun {
            outcome.status = ActionStatus::Reported;
            outcome.detail = describe(action, destination.as_deref());
            return outcome;
        }

        let result = match action.kind {
            ActionKind::Delete => match action.duplicate_of {
                Some(ref kept) => delete_duplicate(&action.source, action.size, kept, self.options.use_trash)
                    .map_err(|e| e.to_string()),
                None => Err("DELETE without a kept copy".to_string()),
            },
            ActionKind::Rename | ActionKind::Relocate => match destination {
                Some(ref to) => move_file(&action.source, to).map_err(|e| e.to_string()),
                None => Err(format!("{} without a destination", action.kind)),
            },
            // Returned early above
            ActionKind::Keep => Ok(0),
        };

        match result {
            Ok(bytes) => {
                outcome.status = ActionStatus::Completed;
                outcome.bytes = bytes;
                outcome.detail = describe(action, destination.as_deref());
            }
            Err(reason) => {
                outcome.status = ActionStatus::Failed;
                outcome.detail = reason;
            }
        }
        outcome
    }

    fn fresh_backup_path(&self, plan: &ActionPlan, at: chrono::DateTime<Utc>) -> PathBuf {
        let base = self.layout.backup_path(&plan.id, at);
        let mut path = base.clone();
        let mut attempt = 0;
        while path.symlink_metadata().is_ok() {
            attempt += 1;
            let name = base
                .file_name()
                .map(|n| n.to_string_lossy().replace(".tar.gz", &format!("_{attempt}.tar.gz")))
                .unwrap_or_default();
            path = base.with_file_name(name);
        }
        path
    }

    fn resolve(&self, destination: &Destination) -> Result<PathBuf, String> {
        if let Some(path) = destination.resolve(&self.options.stores) {
            return Ok(path);
        }
        let Destination::Store { category, .. } = destination else {
            return Err(format!("cannot resolve {destination}"));
        };
        let mut reason = format!("no store configured for category '{category}'");
        if let Some(close) = closest_store(category, self.options.stores.keys()) {
            reason.push_str(&format!(" (did you mean '{close}'?)"));
        }
        Err(reason)
    }
}

fn closest_store<'a>(category: &str, stores: impl Iterator<Item = &'a String>) -> Option<&'a str> {
    stores
        .map(|s| (strsim::jaro_winkler(category, s), s))
        .filter(|(score, _)| *score > 0.8)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, s)| s.as_str())
}

fn describe(action: &PlannedAction, destination: Option<&Path>) -> String {
    match (action.kind, destination, action.duplicate_of.as_ref()) {
        (ActionKind::Delete, _, Some(kept)) => format!("delete; kept copy at {}", kept.display()),
        (_, Some(to), _) => format!("{} to {}", action.kind.as_str().to_lowercase(), to.display()),
        _ => action.rationale.clone(),
    }
}

/// A dry run reports what a live run would skip.
fn skip(mut outcome: ActionOutcome, mode: ExecutionMode, status: ActionStatus, detail: String) -> ActionOutcome {
    match mode {
        ExecutionMode::DryRun => {
            outcome.status = ActionStatus::Reported;
            outcome.detail = format!("would skip ({status}): {detail}");
        }
        ExecutionMode::Live => {
            outcome.status = status;
            outcome.detail = detail;
        }
    }
    outcome
}

/// A dry run reports what would fail instead of failing.
fn fail(mut outcome: ActionOutcome, mode: ExecutionMode, reason: String) -> ActionOutcome {
    outcome.status = match mode {
        ExecutionMode::DryRun => ActionStatus::Reported,
        ExecutionMode::Live => ActionStatus::Failed,
    };
    outcome.detail = match mode {
        ExecutionMode::DryRun => format!("would fail: {reason}"),
        ExecutionMode::Live => reason,
    };
    outcome
}
