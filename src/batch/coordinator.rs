use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;

use super::{BatchError, BatchOutcome, BatchReport, FailureRecord, ScanProgress};
use crate::artifact;
use crate::duplicates::{ClassifiedFile, ScanSession};
use crate::index::MasterIndex;
use crate::output::csv::DuplicateCsv;
use crate::progress::ProgressCallback;
use crate::scanner::{FileRecord, Fingerprint, FingerprintPool, Hash, HashError, Hasher, ScanConfig, Walker};
use crate::workspace::WorkLayout;

/// Which batches a [`BatchCoordinator::run`] should process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub batch_size: usize,
    /// 1-based batch to start from; `None` resumes from the checkpoint.
    pub start_batch: Option<u64>,
    /// Maximum number of batches; `None` runs to the end.
    pub count: Option<usize>,
    /// Discard any checkpoint and start over.
    pub restart: bool,
}

impl RunRequest {
    #[must_use]
    pub fn resume(batch_size: usize) -> Self {
        Self {
            batch_size,
            start_batch: None,
            count: None,
            restart: false,
        }
    }
}

/// Result of a multi-batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub root: PathBuf,
    pub total_files: usize,
    pub batches: Vec<BatchOutcome>,
    pub next_start_index: usize,
    pub completed: bool,
    pub interrupted: bool,
}

impl RunSummary {
    #[must_use]
    pub fn duplicates_found(&self) -> usize {
        self.batches.iter().map(|b| b.duplicates_found).sum()
    }

    #[must_use]
    pub fn uniques_found(&self) -> usize {
        self.batches.iter().map(|b| b.uniques_found).sum()
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.batches.iter().map(|b| b.failures.len()).sum()
    }

    #[must_use]
    pub fn duplicate_bytes(&self) -> u64 {
        self.batches.iter().map(|b| b.duplicate_bytes).sum()
    }
}

/// Drives scanning of untrusted roots in fixed-size, resumable batches.
pub struct BatchCoordinator {
    layout: WorkLayout,
    scan_config: ScanConfig,
    pool: FingerprintPool,
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
    enumerations: HashMap<PathBuf, Arc<Vec<FileRecord>>>,
}

impl BatchCoordinator {
    /// Create a coordinator with an `io_threads`-wide fingerprint pool.
    pub fn new(
        layout: WorkLayout,
        scan_config: ScanConfig,
        io_threads: usize,
        chunk_size: usize,
    ) -> Result<Self, BatchError> {
        let pool = FingerprintPool::new(io_threads, Hasher::new().with_chunk_size(chunk_size))?;
        Ok(Self {
            layout,
            scan_config,
            pool,
            shutdown_flag: None,
            progress_callback: None,
            enumerations: HashMap::new(),
        })
    }

    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.pool = self.pool.with_shutdown_flag(Arc::clone(&flag));
        self.shutdown_flag = Some(flag);
        self
    }

    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.pool = self.pool.with_progress_callback(Arc::clone(&callback));
        self.progress_callback = Some(callback);
        self
    }

    #[must_use]
    pub fn layout(&self) -> &WorkLayout {
        &self.layout
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Deterministic enumeration of `root`, built once per coordinator.
    pub fn enumerate(&mut self, root: &Path) -> Result<(PathBuf, Arc<Vec<FileRecord>>), BatchError> {
        let mut walker = Walker::new(root, 0, self.scan_config.clone())?;
        let canonical = walker.root().to_path_buf();
        if let Some(files) = self.enumerations.get(&canonical) {
            return Ok((canonical, Arc::clone(files)));
        }
        if let Some(ref flag) = self.shutdown_flag {
            walker = walker.with_shutdown_flag(Arc::clone(flag));
        }

        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_start("walking", 0);
        }
        let mut files = Vec::new();
        let mut walk_errors = 0usize;
        for item in walker.walk() {
            match item {
                Ok(file) => {
                    files.push(file);
                    if let Some(ref callback) = self.progress_callback {
                        if files.len() % 256 == 0 {
                            callback.on_progress(files.len(), "");
                        }
                    }
                }
                Err(e) => {
                    log::debug!("Enumeration error: {}", e);
                    walk_errors += 1;
                }
            }
        }
        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_end("walking");
        }
        if self.is_shutdown_requested() {
            return Err(BatchError::Interrupted);
        }

        log::info!(
            "Enumerated {} files under {} ({} entries unreadable)",
            files.len(),
            canonical.display(),
            walk_errors
        );
        let files = Arc::new(files);
        self.enumerations.insert(canonical.clone(), Arc::clone(&files));
        Ok((canonical, files))
    }

    /// Process one batch: the files `[start_index, start_index + batch_size)`
    /// of the root's enumeration.
    ///
    /// Writes the batch report and the duplicate CSV, then durably advances
    /// the checkpoint when the batch extends the contiguous processed
    /// prefix. Returns `None` when `start_index` is past the end.
    ///
    /// If shutdown is requested while the batch is being fingerprinted, the
    /// batch is abandoned without writing anything.
    pub fn process_batch(
        &mut self,
        root: &Path,
        master_index: &Arc<MasterIndex>,
        batch_number: u64,
        start_index: usize,
        batch_size: usize,
    ) -> Result<Option<BatchOutcome>, BatchError> {
        if batch_size == 0 {
            return Err(BatchError::InvalidRequest("batch size must be at least 1".into()));
        }
        if batch_number == 0 {
            return Err(BatchError::InvalidRequest("batch numbers start at 1".into()));
        }

        let (root, files) = self.enumerate(root)?;
        let total = files.len();
        if start_index >= total {
            log::debug!("Batch {} starts at {} of {}: nothing to do", batch_number, start_index, total);
            return Ok(None);
        }
        let end_index = start_index.saturating_add(batch_size).min(total);
        let slice: Vec<&FileRecord> = files[start_index..end_index].iter().collect();
        log::info!(
            "Batch {}: files {}..{} of {} under {}",
            batch_number,
            start_index,
            end_index,
            total,
            root.display()
        );

        let (classified, failures) = self.classify_slice(master_index, &slice)?;

        let report_path = self.layout.batch_report_path(&root, batch_number);
        let mut report = BatchReport {
            root: root.clone(),
            batch_number,
            start_index,
            end_index,
            total_files: total,
            created_at: Utc::now(),
            files: classified,
            failures,
        };
        // Unchanged findings keep the earlier timestamp
        if let Some(previous) = previous_report(&report_path) {
            if previous.same_findings(&report) {
                report.created_at = previous.created_at;
            }
        }
        artifact::write_atomic(&report_path, &report)?;
        DuplicateCsv::new(&report).write_file(&self.layout.batch_csv_path(&root, batch_number))?;

        self.checkpoint(&root, total, batch_size, batch_number, start_index, end_index)?;

        let outcome = report.outcome();
        log::info!(
            "Batch {} done: {} duplicates, {} unique, {} unreadable",
            batch_number,
            outcome.duplicates_found,
            outcome.uniques_found,
            outcome.failures.len()
        );
        Ok(Some(outcome))
    }

    fn classify_slice(
        &self,
        master_index: &Arc<MasterIndex>,
        slice: &[&FileRecord],
    ) -> Result<(Vec<ClassifiedFile>, Vec<FailureRecord>), BatchError> {
        let mut failures = Vec::new();
        let mut failed = vec![false; slice.len()];

        let quick_results = self.pool.quick_signatures(slice);
        let mut quick: Vec<Option<Hash>> = Vec::with_capacity(slice.len());
        for (i, result) in quick_results.into_iter().enumerate() {
            match result {
                Ok(q) => quick.push(Some(q)),
                Err(e) if e.is_interrupted() => return Err(BatchError::Interrupted),
                Err(e) => {
                    failures.push(failure(slice[i], &e));
                    failed[i] = true;
                    quick.push(None);
                }
            }
        }

        let mut session = ScanSession::new(Arc::clone(master_index));
        session.begin_batch();
        let needs_full = session.needs_full_hash(&quick);
        let candidates: Vec<&FileRecord> = slice
            .iter()
            .zip(&needs_full)
            .filter(|(_, needs)| **needs)
            .map(|(file, _)| *file)
            .collect();
        log::debug!(
            "{} of {} files need a full hash",
            candidates.len(),
            slice.len()
        );

        let mut full_results = self.pool.full_hashes(&candidates).into_iter();
        let mut full: Vec<Option<Hash>> = vec![None; slice.len()];
        for (i, needs) in needs_full.iter().enumerate() {
            if !*needs {
                continue;
            }
            match full_results.next() {
                Some(Ok(h)) => full[i] = Some(h),
                Some(Err(e)) if e.is_interrupted() => return Err(BatchError::Interrupted),
                Some(Err(e)) => {
                    failures.push(failure(slice[i], &e));
                    failed[i] = true;
                }
                None => {}
            }
        }

        // Sequential, in enumeration order, so "first seen" is deterministic
        let mut classified = Vec::with_capacity(slice.len());
        for (i, file) in slice.iter().enumerate() {
            if failed[i] {
                continue;
            }
            let Some(q) = quick[i] else { continue };
            let fingerprint = match full[i] {
                Some(h) => Fingerprint::complete(q, h),
                None => Fingerprint::quick_only(q),
            };
            let classification = session.classify(&fingerprint, &file.path);
            classified.push(ClassifiedFile::new((*file).clone(), fingerprint, classification));
        }

        failures.sort_by(|a, b| a.path.cmp(&b.path));
        Ok((classified, failures))
    }

    fn checkpoint(
        &self,
        root: &Path,
        total: usize,
        batch_size: usize,
        batch_number: u64,
        start_index: usize,
        end_index: usize,
    ) -> Result<(), BatchError> {
        let path = self.layout.progress_path(root);
        let mut progress = match ScanProgress::load(&path)? {
            Some(p) => {
                if p.total_files_at_scan_start != total {
                    log::warn!(
                        "File count under {} changed from {} to {} since the scan started; batch boundaries may have shifted",
                        root.display(),
                        p.total_files_at_scan_start,
                        total
                    );
                }
                p
            }
            None => ScanProgress::new(root.to_path_buf(), total, batch_size),
        };

        if start_index <= progress.next_start_index && end_index > progress.next_start_index {
            progress.advance(batch_number, end_index, Utc::now())?;
            progress.total_files_at_scan_start = total;
            if progress.is_complete() {
                ScanProgress::clear(&path)?;
                log::info!("Scan of {} complete; checkpoint removed", root.display());
            } else {
                progress.save(&path)?;
                log::debug!("Checkpoint: next start index {}", progress.next_start_index);
            }
        } else {
            log::debug!(
                "Batch {} does not extend the processed prefix (next start {}); checkpoint unchanged",
                batch_number,
                progress.next_start_index
            );
        }
        Ok(())
    }

    /// Process batches until the root is done, `count` batches have run, or
    /// shutdown is requested. Shutdown is honoured only between batches.
    pub fn run(
        &mut self,
        root: &Path,
        master_index: &Arc<MasterIndex>,
        request: &RunRequest,
    ) -> Result<RunSummary, BatchError> {
        if request.batch_size == 0 {
            return Err(BatchError::InvalidRequest("batch size must be at least 1".into()));
        }
        let (root, files) = self.enumerate(root)?;
        let total = files.len();
        let progress_path = self.layout.progress_path(&root);

        if request.restart {
            ScanProgress::clear(&progress_path)?;
            log::info!("Discarded checkpoint for {}", root.display());
        }

        let (mut batch_number, mut start_index) = match request.start_batch {
            Some(0) => return Err(BatchError::InvalidRequest("batch numbers start at 1".into())),
            Some(n) => (n, usize::try_from(n - 1).unwrap_or(usize::MAX).saturating_mul(request.batch_size)),
            None => match ScanProgress::load(&progress_path)? {
                Some(p) => {
                    log::info!(
                        "Resuming {} at file {} (batch {})",
                        root.display(),
                        p.next_start_index,
                        p.last_batch_number + 1
                    );
                    (p.last_batch_number + 1, p.next_start_index)
                }
                None => (1, 0),
            },
        };

        let mut summary = RunSummary {
            root: root.clone(),
            total_files: total,
            batches: Vec::new(),
            next_start_index: start_index,
            completed: false,
            interrupted: false,
        };

        loop {
            if request.count.is_some_and(|c| summary.batches.len() >= c) {
                break;
            }
            if self.is_shutdown_requested() {
                log::info!("Stopping before batch {}: shutdown requested", batch_number);
                summary.interrupted = true;
                break;
            }
            match self.process_batch(&root, master_index, batch_number, start_index, request.batch_size) {
                Ok(Some(outcome)) => {
                    start_index = outcome.end_index;
                    summary.next_start_index = start_index;
                    summary.batches.push(outcome);
                    batch_number += 1;
                }
                Ok(None) => break,
                Err(BatchError::Interrupted) => {
                    log::info!("Batch {} abandoned: shutdown requested", batch_number);
                    summary.interrupted = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        summary.completed = summary.next_start_index >= total;
        Ok(summary)
    }

    /// Every batch report for `root`, ordered by batch number.
    pub fn load_reports(&self, root: &Path) -> Result<Vec<BatchReport>, BatchError> {
        let root = root.canonicalize().map_err(|source| BatchError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        load_reports(&self.layout, &root)
    }
}

/// Load every batch report stored for an already-canonical root.
pub fn load_reports(layout: &WorkLayout, root: &Path) -> Result<Vec<BatchReport>, BatchError> {
    let paths = layout.batch_reports(root).map_err(|source| BatchError::Io {
        path: layout.scan_dir(root),
        source,
    })?;
    paths
        .into_iter()
        .map(|(_, path)| artifact::read::<BatchReport>(&path).map_err(BatchError::Artifact))
        .collect()
}

/// The report a previous run left at `path`, if it still loads.
fn previous_report(path: &Path) -> Option<BatchReport> {
    if !path.exists() {
        return None;
    }
    match artifact::read::<BatchReport>(path) {
        Ok(report) => Some(report),
        Err(e) => {
            log::warn!("Replacing unreadable batch report {}: {}", path.display(), e);
            None
        }
    }
}

fn failure(file: &FileRecord, error: &HashError) -> FailureRecord {
    FailureRecord {
        path: file.path.clone(),
        reason: error.to_string(),
    }
}
