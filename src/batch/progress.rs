//! Resumable scan checkpoint.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::BatchError;
use crate::artifact::{self, Artifact, ArtifactError};

/// How far a root's scan has progressed.
///
/// `next_start_index` only ever grows and marks the end of the contiguous
/// prefix of the enumeration that has been classified and reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub root: PathBuf,
    pub last_batch_number: u64,
    pub next_start_index: usize,
    pub total_files_at_scan_start: usize,
    pub batch_size: usize,
    pub timestamp: DateTime<Utc>,
}

impl Artifact for ScanProgress {
    const KIND: &'static str = "scan_progress";
    const VERSION: u32 = 1;
}

impl ScanProgress {
    #[must_use]
    pub fn new(root: PathBuf, total_files: usize, batch_size: usize) -> Self {
        Self {
            root,
            last_batch_number: 0,
            next_start_index: 0,
            total_files_at_scan_start: total_files,
            batch_size,
            timestamp: Utc::now(),
        }
    }

    /// Record a completed batch.
    ///
    /// # Errors
    ///
    /// [`BatchError::NonMonotonic`] if `next_start_index` does not grow.
    pub fn advance(
        &mut self,
        batch_number: u64,
        next_start_index: usize,
        at: DateTime<Utc>,
    ) -> Result<(), BatchError> {
        if next_start_index <= self.next_start_index {
            return Err(BatchError::NonMonotonic {
                current: self.next_start_index,
                proposed: next_start_index,
            });
        }
        self.last_batch_number = batch_number;
        self.next_start_index = next_start_index;
        self.timestamp = at;
        Ok(())
    }

    /// Whether every file of the enumeration has been processed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.next_start_index >= self.total_files_at_scan_start
    }

    /// Load a checkpoint; `None` when none exists.
    pub fn load(path: &Path) -> Result<Option<Self>, BatchError> {
        match artifact::read::<Self>(path) {
            Ok(progress) => Ok(Some(progress)),
            Err(ArtifactError::Io { ref source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Ok(None)
            }
            Err(e) => Err(BatchError::Artifact(e)),
        }
    }

    /// Durably write the checkpoint (temp file, fsync, rename).
    pub fn save(&self, path: &Path) -> Result<(), BatchError> {
        artifact::write_atomic(path, self).map_err(BatchError::Artifact)
    }

    /// Remove a checkpoint file if present.
    pub fn clear(path: &Path) -> Result<(), BatchError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(BatchError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
