//! Resumable batch scanning of untrusted roots.
//!
//! A root's files are enumerated in a deterministic order and processed in
//! fixed-size slices. Each completed batch writes a [`BatchReport`], a
//! duplicate CSV and then a durable [`ScanProgress`] checkpoint, so an
//! interrupted run picks up at the first unprocessed file.

pub mod coordinator;
pub mod progress;
pub mod report;

use std::path::PathBuf;

use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::output::csv::CsvOutputError;
use crate::scanner::parallel::PoolError;
use crate::scanner::ScanError;

pub use coordinator::{load_reports, BatchCoordinator, RunRequest, RunSummary};
pub use progress::ScanProgress;
pub use report::{BatchOutcome, BatchReport, FailureRecord};

/// Errors from batch processing.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("Failed to write duplicate CSV: {0}")]
    Csv(#[from] CsvOutputError),

    /// A checkpoint update would move `next_start_index` backwards.
    #[error("Checkpoint would not advance: next start index {current} -> {proposed}")]
    NonMonotonic { current: usize, proposed: usize },

    #[error("Batch interrupted by user")]
    Interrupted,

    #[error("Invalid batch request: {0}")]
    InvalidRequest(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
