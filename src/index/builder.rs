use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;

use super::{IndexEntry, IndexError, MasterIndex};
use crate::progress::ProgressCallback;
use crate::scanner::{self, FileRecord, FingerprintPool, Hasher, ScanConfig};

/// Counters from one index build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexBuildStats {
    pub files_seen: usize,
    pub entries: usize,
    pub shadowed: usize,
    pub unreadable: usize,
    pub walk_errors: usize,
}

/// Builds a [`MasterIndex`] from trusted roots.
pub struct IndexBuilder {
    scan_config: ScanConfig,
    io_threads: usize,
    chunk_size: usize,
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl IndexBuilder {
    #[must_use]
    pub fn new(scan_config: ScanConfig) -> Self {
        Self {
            scan_config,
            io_threads: 4,
            chunk_size: scanner::hasher::DEFAULT_CHUNK_SIZE,
            shutdown_flag: None,
            progress_callback: None,
        }
    }

    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads;
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Walk every root, fully hash every file and index them in order.
    ///
    /// Unreadable trusted files are logged and left out; they never fail the
    /// build.
    pub fn build(&self, roots: &[PathBuf]) -> Result<(MasterIndex, IndexBuildStats), IndexError> {
        let walkers = scanner::scan_roots(roots, &self.scan_config, self.shutdown_flag.clone())?;
        let mut stats = IndexBuildStats::default();

        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_start("walking", 0);
        }
        let mut files: Vec<FileRecord> = Vec::new();
        for walker in &walkers {
            log::info!("Indexing trusted root {}", walker.root().display());
            let (found, errors) = walker.collect_files();
            stats.walk_errors += errors.len();
            files.extend(found);
            if let Some(ref callback) = self.progress_callback {
                callback.on_progress(files.len(), &walker.root().to_string_lossy());
            }
        }
        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_end("walking");
        }
        if self.is_shutdown_requested() {
            return Err(IndexError::Interrupted);
        }
        stats.files_seen = files.len();

        let hasher = Hasher::new().with_chunk_size(self.chunk_size);
        let mut pool = FingerprintPool::new(self.io_threads, hasher)?;
        if let Some(ref flag) = self.shutdown_flag {
            pool = pool.with_shutdown_flag(Arc::clone(flag));
        }
        if let Some(ref callback) = self.progress_callback {
            pool = pool.with_progress_callback(Arc::clone(callback));
        }

        let refs: Vec<&FileRecord> = files.iter().collect();
        let fingerprints = pool.fingerprints(&refs);
        if self.is_shutdown_requested() {
            return Err(IndexError::Interrupted);
        }

        let mut index = MasterIndex::new(walkers.iter().map(|w| w.root().to_path_buf()).collect());
        for (file, result) in files.iter().zip(fingerprints) {
            match result {
                Ok(fp) => {
                    let Some(full) = fp.full else { continue };
                    index.insert(IndexEntry {
                        hash: full,
                        path: file.path.clone(),
                        size: file.size,
                        quick: fp.quick,
                    });
                }
                Err(e) => {
                    log::warn!("Skipping unreadable trusted file: {}", e);
                    stats.unreadable += 1;
                }
            }
        }
        index.set_created_at(Utc::now());

        stats.entries = index.len();
        stats.shadowed = index.shadowed();
        log::info!(
            "Master index: {} unique entries from {} files ({} shadowed, {} unreadable)",
            stats.entries,
            stats.files_seen,
            stats.shadowed,
            stats.unreadable
        );
        Ok((index, stats))
    }
}
