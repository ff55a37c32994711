//! On-disk layout of the work directory.
//!
//! ```text
//! <work_dir>/
//!   index/master_index.json
//!   scans/<root-key>/progress.json
//!   scans/<root-key>/batch_00001.json
//!   scans/<root-key>/batch_00001_duplicates.csv
//!   plans/plan_<plan-id>.json
//!   reports/exec_<plan-id>_<mode>_<timestamp>.json
//!   backups/backup_<plan-id>_<timestamp>.tar.gz
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Paths of every artifact under one work directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkLayout {
    base: PathBuf,
}

impl WorkLayout {
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.base.join("index").join("master_index.json")
    }

    #[must_use]
    pub fn scan_dir(&self, root: &Path) -> PathBuf {
        self.base.join("scans").join(root_key(root))
    }

    #[must_use]
    pub fn progress_path(&self, root: &Path) -> PathBuf {
        self.scan_dir(root).join("progress.json")
    }

    #[must_use]
    pub fn batch_report_path(&self, root: &Path, batch_number: u64) -> PathBuf {
        self.scan_dir(root)
            .join(format!("batch_{batch_number:05}.json"))
    }

    #[must_use]
    pub fn batch_csv_path(&self, root: &Path, batch_number: u64) -> PathBuf {
        self.scan_dir(root)
            .join(format!("batch_{batch_number:05}_duplicates.csv"))
    }

    #[must_use]
    pub fn plans_dir(&self) -> PathBuf {
        self.base.join("plans")
    }

    #[must_use]
    pub fn plan_path(&self, plan_id: &str) -> PathBuf {
        self.plans_dir().join(format!("plan_{plan_id}.json"))
    }

    #[must_use]
    pub fn reports_dir(&self) -> PathBuf {
        self.base.join("reports")
    }

    #[must_use]
    pub fn report_path(&self, report_id: &str) -> PathBuf {
        self.reports_dir().join(format!("{report_id}.json"))
    }

    #[must_use]
    pub fn backups_dir(&self) -> PathBuf {
        self.base.join("backups")
    }

    #[must_use]
    pub fn backup_path(&self, plan_id: &str, at: DateTime<Utc>) -> PathBuf {
        self.backups_dir()
            .join(format!("backup_{plan_id}_{}.tar.gz", timestamp_tag(at)))
    }

    /// Batch report files for `root`, ordered by batch number.
    ///
    /// A missing scan directory yields an empty list.
    pub fn batch_reports(&self, root: &Path) -> io::Result<Vec<(u64, PathBuf)>> {
        let dir = self.scan_dir(root);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut reports = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(number) = name
                .strip_prefix("batch_")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|digits| digits.parse::<u64>().ok())
            {
                reports.push((number, path));
            }
        }
        reports.sort_by_key(|(number, _)| *number);
        Ok(reports)
    }
}

/// Stable directory name for a scan root: a readable tail plus a short
/// digest of the full path, so two roots never share a directory.
#[must_use]
pub fn root_key(root: &Path) -> String {
    let tail: String = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string())
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(40)
        .collect();
    let digest = blake3::hash(root.to_string_lossy().as_bytes()).to_hex();
    format!("{tail}-{}", &digest.as_str()[..12])
}

/// Compact UTC timestamp used in artifact file names.
#[must_use]
pub fn timestamp_tag(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%S%.3fZ").to_string()
}
