//! Master index: the trusted `full_hash -> file` table.
//!
//! Built once from one or more trusted roots, persisted as a checksummed
//! artifact and loaded read-only by every scan. At most one entry exists per
//! content hash; when several trusted files share content, the first in
//! enumeration order is kept.

mod builder;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::{self, Artifact, ArtifactError};
use crate::scanner::hasher::hex_hash;
use crate::scanner::parallel::PoolError;
use crate::scanner::{Hash, ScanError};

pub use builder::{IndexBuildStats, IndexBuilder};

/// Errors from building, loading or saving the master index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The persisted index cannot be trusted. Fatal.
    #[error("master index is corrupt ({path}): {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// No index has been built yet.
    #[error("master index not found at {0}; run `volclean index <ROOT>` first")]
    Missing(PathBuf),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Artifact(ArtifactError),

    #[error("index build interrupted")]
    Interrupted,
}

/// One trusted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(with = "hex_hash")]
    pub hash: Hash,
    pub path: PathBuf,
    pub size: u64,
    /// Quick signature, used to decide whether candidates need a full hash.
    #[serde(with = "hex_hash")]
    pub quick: Hash,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexPayload {
    roots: Vec<PathBuf>,
    created_at: DateTime<Utc>,
    shadowed: usize,
    entries: Vec<IndexEntry>,
}

/// The trusted content table.
#[derive(Debug, Clone, Default)]
pub struct MasterIndex {
    roots: Vec<PathBuf>,
    created_at: Option<DateTime<Utc>>,
    entries: BTreeMap<Hash, IndexEntry>,
    quick: HashSet<Hash>,
    shadowed: usize,
}

impl MasterIndex {
    /// Empty index for the given trusted roots.
    #[must_use]
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }

    /// Insert an entry unless its hash is already present.
    ///
    /// Returns `false` (and counts the file as shadowed) on a repeat.
    pub fn insert(&mut self, entry: IndexEntry) -> bool {
        if let Some(existing) = self.entries.get(&entry.hash) {
            log::debug!(
                "Trusted duplicate {} shadowed by {}",
                entry.path.display(),
                existing.path.display()
            );
            self.shadowed += 1;
            return false;
        }
        self.quick.insert(entry.quick);
        self.entries.insert(entry.hash, entry);
        true
    }

    #[must_use]
    pub fn lookup(&self, hash: &Hash) -> Option<&IndexEntry> {
        self.entries.get(hash)
    }

    /// Whether some trusted file has this quick signature.
    #[must_use]
    pub fn contains_quick(&self, quick: &Hash) -> bool {
        self.quick.contains(quick)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Trusted files dropped because an earlier file had the same content.
    #[must_use]
    pub fn shadowed(&self) -> usize {
        self.shadowed
    }

    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    /// Total bytes of unique trusted content.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }

    /// Persist atomically.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let payload = IndexPayload {
            roots: self.roots.clone(),
            created_at: self.created_at.unwrap_or_else(Utc::now),
            shadowed: self.shadowed,
            entries: self.entries.values().cloned().collect(),
        };
        artifact::write_atomic(path, &payload).map_err(IndexError::Artifact)?;
        log::info!(
            "Saved master index with {} entries to {}",
            self.len(),
            path.display()
        );
        Ok(())
    }

    /// Load and verify a persisted index.
    ///
    /// # Errors
    ///
    /// Any parse, checksum or version failure is [`IndexError::Corrupt`];
    /// a missing file is [`IndexError::Missing`].
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let payload: IndexPayload = artifact::read(path).map_err(|e| match e {
            ArtifactError::Io { ref source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                IndexError::Missing(path.to_path_buf())
            }
            e if e.is_corruption() => IndexError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
            e => IndexError::Artifact(e),
        })?;

        let mut index = Self::new(payload.roots);
        index.created_at = Some(payload.created_at);
        for entry in payload.entries {
            if !index.insert(entry) {
                return Err(IndexError::Corrupt {
                    path: path.to_path_buf(),
                    reason: "duplicate hash entry".to_string(),
                });
            }
        }
        index.shadowed = payload.shadowed;
        log::debug!("Loaded master index: {} entries", index.len());
        Ok(index)
    }

    pub(crate) fn set_created_at(&mut self, at: DateTime<Utc>) {
        self.created_at = Some(at);
    }
}

impl Artifact for IndexPayload {
    const KIND: &'static str = "master_index";
    const VERSION: u32 = 1;
}
