//! Duplicate classification against the master index and the current batch.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::index::MasterIndex;
use crate::scanner::{Fingerprint, Hash};

/// Outcome of classifying one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// Content already present in the master index at `of`.
    MasterDuplicate { of: PathBuf },
    /// Content seen earlier in the same batch at `of`.
    BatchDuplicate { of: PathBuf },
    Unique,
}

impl Classification {
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, Self::Unique)
    }

    /// The retained copy, for duplicates.
    #[must_use]
    pub fn duplicate_of(&self) -> Option<&Path> {
        match self {
            Self::MasterDuplicate { of } | Self::BatchDuplicate { of } => Some(of),
            Self::Unique => None,
        }
    }
}

/// Full hashes already seen in the current batch, with the first path.
pub type SeenInBatch = HashMap<Hash, PathBuf>;

/// Classify one fingerprint.
///
/// Lookup is by full hash only. A fingerprint without a full hash is always
/// `Unique`. The master index wins over the batch. A `Unique` file with a
/// full hash is recorded in `seen_in_batch` so later copies in the batch
/// classify as `BatchDuplicate`.
pub fn classify(
    fingerprint: &Fingerprint,
    path: &Path,
    master_index: &MasterIndex,
    seen_in_batch: &mut SeenInBatch,
) -> Classification {
    let Some(full) = fingerprint.full else {
        return Classification::Unique;
    };

    if let Some(entry) = master_index.lookup(&full) {
        if entry.path != path {
            return Classification::MasterDuplicate {
                of: entry.path.clone(),
            };
        }
        // The master file itself was scanned; it is not its own duplicate.
        return Classification::Unique;
    }

    if let Some(first) = seen_in_batch.get(&full) {
        if first != path {
            return Classification::BatchDuplicate { of: first.clone() };
        }
        return Classification::Unique;
    }

    seen_in_batch.insert(full, path.to_path_buf());
    Classification::Unique
}

/// Per-scan classification state.
///
/// Owns a shared handle to the read-only master index plus the batch-scoped
/// seen table. Each batch starts with an empty table.
#[derive(Debug)]
pub struct ScanSession {
    master: Arc<MasterIndex>,
    seen: SeenInBatch,
}

impl ScanSession {
    #[must_use]
    pub fn new(master: Arc<MasterIndex>) -> Self {
        Self {
            master,
            seen: SeenInBatch::new(),
        }
    }

    #[must_use]
    pub fn master(&self) -> &MasterIndex {
        &self.master
    }

    /// Forget everything seen in the previous batch.
    pub fn begin_batch(&mut self) {
        self.seen.clear();
    }

    /// Which files need a full hash, given the batch's quick signatures.
    ///
    /// A file needs one when its quick signature matches a trusted file or
    /// another file in the batch. All others are provably unique. `None`
    /// entries (unreadable files) never need one.
    #[must_use]
    pub fn needs_full_hash(&self, quick: &[Option<Hash>]) -> Vec<bool> {
        let mut counts: HashMap<&Hash, usize> = HashMap::new();
        for q in quick.iter().flatten() {
            *counts.entry(q).or_insert(0) += 1;
        }
        let shared: HashSet<&Hash> = counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(q, _)| q)
            .collect();

        quick
            .iter()
            .map(|q| {
                q.as_ref()
                    .is_some_and(|q| self.master.contains_quick(q) || shared.contains(q))
            })
            .collect()
    }

    /// Classify the next file of the batch, in enumeration order.
    pub fn classify(&mut self, fingerprint: &Fingerprint, path: &Path) -> Classification {
        classify(fingerprint, path, &self.master, &mut self.seen)
    }
}
