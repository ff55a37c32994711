use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;

/// What a planned action does to its source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Keep,
    Rename,
    Relocate,
    Delete,
}

impl ActionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keep => "KEEP",
            Self::Rename => "RENAME",
            Self::Relocate => "RELOCATE",
            Self::Delete => "DELETE",
        }
    }

    /// Whether executing this kind touches the filesystem.
    #[must_use]
    pub fn is_mutating(self) -> bool {
        !matches!(self, Self::Keep)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a RENAME or RELOCATE sends its source.
///
/// RELOCATE names a store category; the directory is resolved at execution
/// time from configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Destination {
    Path { path: PathBuf },
    Store { category: String, file_name: String },
}

impl Destination {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Path { path } => Some(path),
            Self::Store { .. } => None,
        }
    }

    /// Resolve to a concrete path given the configured store directories.
    #[must_use]
    pub fn resolve(&self, stores: &BTreeMap<String, PathBuf>) -> Option<PathBuf> {
        match self {
            Self::Path { path } => Some(path.clone()),
            Self::Store {
                category,
                file_name,
            } => stores.get(category).map(|dir| dir.join(file_name)),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path { path } => write!(f, "{}", path.display()),
            Self::Store {
                category,
                file_name,
            } => write!(f, "store:{category}/{file_name}"),
        }
    }
}

/// One entry of an [`ActionPlan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub kind: ActionKind,
    pub source: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Destination>,
    /// Kept copy, for DELETE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<PathBuf>,
    /// Source size at scan time.
    pub size: u64,
    pub rationale: String,
}

impl PlannedAction {
    #[must_use]
    pub fn keep(source: PathBuf, size: u64, rationale: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Keep,
            source,
            destination: None,
            duplicate_of: None,
            size,
            rationale: rationale.into(),
        }
    }

    #[must_use]
    pub fn delete(source: PathBuf, size: u64, duplicate_of: PathBuf, rationale: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Delete,
            source,
            destination: None,
            duplicate_of: Some(duplicate_of),
            size,
            rationale: rationale.into(),
        }
    }

    #[must_use]
    pub fn rename(source: PathBuf, size: u64, to: PathBuf, rationale: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Rename,
            source,
            destination: Some(Destination::Path { path: to }),
            duplicate_of: None,
            size,
            rationale: rationale.into(),
        }
    }

    #[must_use]
    pub fn relocate(
        source: PathBuf,
        size: u64,
        category: String,
        file_name: String,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            kind: ActionKind::Relocate,
            source,
            destination: Some(Destination::Store {
                category,
                file_name,
            }),
            duplicate_of: None,
            size,
            rationale: rationale.into(),
        }
    }
}

/// A reviewable, reproducible set of intended filesystem changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPlan {
    /// Digest of the actions; identical inputs give identical ids.
    pub id: String,
    pub root: PathBuf,
    pub created_at: DateTime<Utc>,
    pub source_batch_ids: Vec<String>,
    pub actions: Vec<PlannedAction>,
}

impl Artifact for ActionPlan {
    const KIND: &'static str = "action_plan";
    const VERSION: u32 = 1;
}

impl ActionPlan {
    /// Number of actions per kind. Every kind is present, possibly zero.
    #[must_use]
    pub fn counts_by_kind(&self) -> BTreeMap<ActionKind, usize> {
        let mut counts: BTreeMap<ActionKind, usize> = [
            ActionKind::Keep,
            ActionKind::Rename,
            ActionKind::Relocate,
            ActionKind::Delete,
        ]
        .into_iter()
        .map(|k| (k, 0))
        .collect();
        for action in &self.actions {
            *counts.entry(action.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Bytes freed if every DELETE succeeds.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.actions
            .iter()
            .filter(|a| a.kind == ActionKind::Delete)
            .map(|a| a.size)
            .sum()
    }

    /// Actions that will touch the filesystem in a live run.
    pub fn mutating(&self) -> impl Iterator<Item = &PlannedAction> {
        self.actions.iter().filter(|a| a.kind.is_mutating())
    }
}
