use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::naming::{derive_name, NameAllocator};
use super::rules::{Disposition, PurposeRules};
use super::{ActionKind, ActionPlan, Destination, PlanError, PlannedAction};
use crate::batch::BatchReport;
use crate::duplicates::{Classification, ClassifiedFile};

/// Plan-level metadata supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanContext {
    pub root: PathBuf,
    pub created_at: DateTime<Utc>,
    pub source_batch_ids: Vec<String>,
}

/// Turn classified files into an ordered [`ActionPlan`].
///
/// Duplicates become DELETE. Unique files consult `rules` and become
/// RENAME, RELOCATE or KEEP. Actions are ordered DELETE, then RENAME and
/// RELOCATE, then KEEP, each group in input order. A file appearing more
/// than once gets the action of its first appearance.
///
/// # Errors
///
/// [`PlanError::Conflict`] if a destination cannot be made unique. No plan
/// is produced in that case.
pub fn build_plan(
    files: &[ClassifiedFile],
    rules: &PurposeRules,
    context: PlanContext,
) -> Result<ActionPlan, PlanError> {
    let mut seen: HashSet<&Path> = HashSet::with_capacity(files.len());
    let mut allocator = NameAllocator::new();
    let mut deletes = Vec::new();
    let mut moves = Vec::new();
    let mut keeps = Vec::new();

    for file in files {
        let source = file.record.path.as_path();
        if !seen.insert(source) {
            log::debug!("{} appears in more than one batch; keeping first", source.display());
            continue;
        }
        let size = file.record.size;

        match &file.classification {
            Classification::MasterDuplicate { of } => deletes.push(PlannedAction::delete(
                source.to_path_buf(),
                size,
                of.clone(),
                format!("identical content already kept in master index at {}", of.display()),
            )),
            Classification::BatchDuplicate { of } => deletes.push(PlannedAction::delete(
                source.to_path_buf(),
                size,
                of.clone(),
                format!("identical content seen earlier in batch at {}", of.display()),
            )),
            Classification::Unique => {
                let action = plan_unique(source, size, rules, &mut allocator)?;
                if action.kind == ActionKind::Keep {
                    keeps.push(action);
                } else {
                    moves.push(action);
                }
            }
        }
    }

    let mut actions = deletes;
    actions.extend(moves);
    actions.extend(keeps);
    validate_destinations(&actions)?;

    let id = plan_id(&context, &actions);
    log::info!(
        "Plan {}: {} actions from {} batch reports",
        id,
        actions.len(),
        context.source_batch_ids.len()
    );
    Ok(ActionPlan {
        id,
        root: context.root,
        created_at: context.created_at,
        source_batch_ids: context.source_batch_ids,
        actions,
    })
}

/// Build a plan from every batch report of one root.
///
/// `created_at` is the newest report's timestamp. Rescanning an unchanged
/// batch keeps its report timestamp, so re-planning reproduces the same plan.
pub fn build_plan_from_reports(
    reports: &[BatchReport],
    rules: &PurposeRules,
) -> Result<ActionPlan, PlanError> {
    let first = reports.first().ok_or(PlanError::NoReports)?;
    if let Some(other) = reports.iter().find(|r| r.root != first.root) {
        return Err(PlanError::MixedRoots {
            expected: first.root.clone(),
            found: other.root.clone(),
        });
    }

    let created_at = reports
        .iter()
        .map(|r| r.created_at)
        .max()
        .unwrap_or(first.created_at);
    let files: Vec<ClassifiedFile> = reports.iter().flat_map(|r| r.files.iter().cloned()).collect();

    build_plan(
        &files,
        rules,
        PlanContext {
            root: first.root.clone(),
            created_at,
            source_batch_ids: reports.iter().map(BatchReport::id).collect(),
        },
    )
}

fn plan_unique(
    source: &Path,
    size: u64,
    rules: &PurposeRules,
    allocator: &mut NameAllocator,
) -> Result<PlannedAction, PlanError> {
    let Some(rule) = rules.first_match(source) else {
        return Ok(PlannedAction::keep(source.to_path_buf(), size, "no reliable signal"));
    };
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = derive_name(&rule.category, &file_name);

    match rule.disposition {
        Disposition::Rename => {
            if name == file_name {
                return Ok(PlannedAction::keep(
                    source.to_path_buf(),
                    size,
                    format!("already named for {}", rule.category),
                ));
            }
            let dir = source.parent().unwrap_or_else(|| Path::new(""));
            let to = allocator.claim_path(dir, &name)?;
            Ok(PlannedAction::rename(
                source.to_path_buf(),
                size,
                to,
                format!("matches {} rule", rule.category),
            ))
        }
        Disposition::Relocate => {
            let file_name = allocator.claim_store(&rule.category, &name)?;
            Ok(PlannedAction::relocate(
                source.to_path_buf(),
                size,
                rule.category.clone(),
                file_name,
                format!("belongs in {} store", rule.category),
            ))
        }
    }
}

/// No two actions may share a destination, and no destination may be
/// another action's source.
fn validate_destinations(actions: &[PlannedAction]) -> Result<(), PlanError> {
    let sources: HashSet<&Path> = actions.iter().map(|a| a.source.as_path()).collect();
    let mut destinations: HashSet<&Destination> = HashSet::new();
    for action in actions {
        let Some(ref destination) = action.destination else {
            continue;
        };
        if !destinations.insert(destination) {
            return Err(PlanError::Conflict {
                destination: destination.to_string(),
                reason: "scheduled by more than one action".into(),
            });
        }
        if destination.path().is_some_and(|p| sources.contains(p)) {
            return Err(PlanError::Conflict {
                destination: destination.to_string(),
                reason: "is the source of another action".into(),
            });
        }
    }
    Ok(())
}

fn plan_id(context: &PlanContext, actions: &[PlannedAction]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(context.root.to_string_lossy().as_bytes());
    hasher.update(context.created_at.to_rfc3339().as_bytes());
    for id in &context.source_batch_ids {
        hasher.update(id.as_bytes());
    }
    for action in actions {
        hasher.update(action.kind.as_str().as_bytes());
        hasher.update(action.source.to_string_lossy().as_bytes());
        if let Some(ref destination) = action.destination {
            hasher.update(destination.to_string().as_bytes());
        }
        if let Some(ref kept) = action.duplicate_of {
            hasher.update(kept.to_string_lossy().as_bytes());
        }
        hasher.update(&action.size.to_le_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex()[..16].to_string()
}
