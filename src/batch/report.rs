//! Per-batch classification report.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::duplicates::ClassifiedFile;

/// A file that could not be fingerprinted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub path: PathBuf,
    pub reason: String,
}

/// Everything learned about one batch. Input to the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub root: PathBuf,
    pub batch_number: u64,
    pub start_index: usize,
    pub end_index: usize,
    pub total_files: usize,
    pub created_at: DateTime<Utc>,
    /// Classified files in enumeration order.
    pub files: Vec<ClassifiedFile>,
    pub failures: Vec<FailureRecord>,
}

impl Artifact for BatchReport {
    const KIND: &'static str = "batch_report";
    const VERSION: u32 = 1;
}

impl BatchReport {
    /// Stable identifier recorded in plans built from this report.
    #[must_use]
    pub fn id(&self) -> String {
        format!("batch_{:05}", self.batch_number)
    }

    /// Same slice and findings, ignoring when the report was written.
    #[must_use]
    pub fn same_findings(&self, other: &Self) -> bool {
        self.root == other.root
            && self.batch_number == other.batch_number
            && self.start_index == other.start_index
            && self.end_index == other.end_index
            && self.total_files == other.total_files
            && self.files == other.files
            && self.failures == other.failures
    }

    pub fn duplicates(&self) -> impl Iterator<Item = &ClassifiedFile> {
        self.files.iter().filter(|f| f.is_duplicate())
    }

    #[must_use]
    pub fn outcome(&self) -> BatchOutcome {
        let duplicates: Vec<&ClassifiedFile> = self.duplicates().collect();
        BatchOutcome {
            batch_number: self.batch_number,
            start_index: self.start_index,
            end_index: self.end_index,
            duplicates_found: duplicates.len(),
            uniques_found: self.files.len() - duplicates.len(),
            duplicate_bytes: duplicates.iter().map(|f| f.record.size).sum(),
            failures: self.failures.clone(),
        }
    }
}

/// Summary returned by `process_batch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub batch_number: u64,
    pub start_index: usize,
    /// Exclusive end of the processed slice.
    pub end_index: usize,
    pub duplicates_found: usize,
    pub uniques_found: usize,
    pub duplicate_bytes: u64,
    pub failures: Vec<FailureRecord>,
}
