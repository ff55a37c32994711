//! Duplicate detection.
//!
//! A file is a duplicate only when its full BLAKE3 hash matches a trusted
//! file in the master index or an earlier file of the same batch.

pub mod classifier;

use serde::{Deserialize, Serialize};

use crate::scanner::{FileRecord, Fingerprint};

pub use classifier::{classify, Classification, ScanSession, SeenInBatch};

/// A file with its fingerprint and classification, as stored in batch
/// reports and consumed by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedFile {
    pub record: FileRecord,
    pub fingerprint: Fingerprint,
    pub classification: Classification,
}

impl ClassifiedFile {
    #[must_use]
    pub fn new(record: FileRecord, fingerprint: Fingerprint, classification: Classification) -> Self {
        Self {
            record,
            fingerprint,
            classification,
        }
    }

    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        self.classification.is_duplicate()
    }
}
