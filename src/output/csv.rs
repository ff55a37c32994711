//! CSV exports for human review.
//!
//! # Batch duplicates
//!
//! One row per duplicate found in a batch:
//!
//! - `external_path`: the duplicate that would be removed
//! - `master_path`: the copy that is kept (trusted file, or the first copy
//!   seen in the batch)
//! - `size`: bytes
//! - `filename`: final path component of `external_path`
//! - `suggested_action`: always `DELETE`
//!
//! # Plans
//!
//! One row per planned action: `kind, source, destination, duplicate_of,
//! size, rationale`.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::batch::BatchReport;
use crate::plan::ActionPlan;

/// Errors that can occur during CSV output generation.
#[derive(Debug, Error)]
pub enum CsvOutputError {
    /// I/O error during writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during CSV serialization.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize)]
struct DuplicateRow<'a> {
    external_path: String,
    master_path: String,
    size: u64,
    filename: String,
    suggested_action: &'a str,
}

/// Duplicate listing for one batch.
pub struct DuplicateCsv<'a> {
    report: &'a BatchReport,
}

impl<'a> DuplicateCsv<'a> {
    #[must_use]
    pub fn new(report: &'a BatchReport) -> Self {
        Self { report }
    }

    /// Write the rows to `writer`.
    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), CsvOutputError> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        for file in self.report.duplicates() {
            let Some(kept) = file.classification.duplicate_of() else {
                continue;
            };
            csv_writer.serialize(DuplicateRow {
                external_path: file.record.path.to_string_lossy().into_owned(),
                master_path: kept.to_string_lossy().into_owned(),
                size: file.record.size,
                filename: file.record.file_name(),
                suggested_action: "DELETE",
            })?;
        }

        // Header-only output when the batch has no duplicates
        if self.report.duplicates().next().is_none() {
            csv_writer.write_record([
                "external_path",
                "master_path",
                "size",
                "filename",
                "suggested_action",
            ])?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// Write to `path`, replacing any previous file atomically.
    pub fn write_file(&self, path: &Path) -> Result<(), CsvOutputError> {
        write_replacing(path, |file| self.write_to(file))
    }
}

#[derive(Debug, Serialize)]
struct PlanRow {
    kind: &'static str,
    source: String,
    destination: String,
    duplicate_of: String,
    size: u64,
    rationale: String,
}

/// Action listing for a plan.
pub struct PlanCsv<'a> {
    plan: &'a ActionPlan,
}

impl<'a> PlanCsv<'a> {
    #[must_use]
    pub fn new(plan: &'a ActionPlan) -> Self {
        Self { plan }
    }

    pub fn write_to<W: io::Write>(&self, writer: W) -> Result<(), CsvOutputError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for action in &self.plan.actions {
            csv_writer.serialize(PlanRow {
                kind: action.kind.as_str(),
                source: action.source.to_string_lossy().into_owned(),
                destination: action
                    .destination
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                duplicate_of: action
                    .duplicate_of
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                size: action.size,
                rationale: action.rationale.clone(),
            })?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_file(&self, path: &Path) -> Result<(), CsvOutputError> {
        write_replacing(path, |file| self.write_to(file))
    }
}

fn write_replacing<F>(path: &Path, write: F) -> Result<(), CsvOutputError>
where
    F: FnOnce(&File) -> Result<(), CsvOutputError>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let file = File::create(&tmp)?;
    write(&file)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}
