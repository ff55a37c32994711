//! Bounded parallel fingerprinting.
//!
//! A dedicated rayon pool with `io_threads` workers keeps at most that many
//! files open at once. Each call returns results in input order; the
//! `collect` is the join point, so no result is observed before every
//! worker has finished.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use super::{FileRecord, Fingerprint, Hash, HashError, Hasher};
use crate::progress::ProgressCallback;

/// Error building the worker pool.
#[derive(Debug, thiserror::Error)]
#[error("failed to build fingerprint thread pool: {0}")]
pub struct PoolError(#[from] rayon::ThreadPoolBuildError);

/// Thread pool plus hasher used to fingerprint batches of files.
pub struct FingerprintPool {
    pool: rayon::ThreadPool,
    hasher: Arc<Hasher>,
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for FingerprintPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintPool")
            .field("threads", &self.pool.current_num_threads())
            .field("hasher", &self.hasher)
            .finish_non_exhaustive()
    }
}

impl FingerprintPool {
    /// Build a pool with `io_threads` workers (at least one).
    ///
    /// # Errors
    ///
    /// Returns [`PoolError`] if the OS refuses to spawn the threads.
    pub fn new(io_threads: usize, hasher: Hasher) -> Result<Self, PoolError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(io_threads.max(1))
            .thread_name(|i| format!("volclean-io-{i}"))
            .build()?;
        Ok(Self {
            pool,
            hasher: Arc::new(hasher),
            shutdown_flag: None,
            progress_callback: None,
        })
    }

    /// Skip remaining files, and abort in-flight full hashes, once the flag
    /// is raised.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        let hasher = (*self.hasher).clone().with_shutdown_flag(Arc::clone(&flag));
        self.hasher = Arc::new(hasher);
        self.shutdown_flag = Some(flag);
        self
    }

    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Quick signatures for every record, in input order.
    pub fn quick_signatures(&self, files: &[&FileRecord]) -> Vec<Result<Hash, HashError>> {
        self.run("quick", files, |hasher, file| {
            hasher.quick_signature(&file.path)
        })
    }

    /// Full hashes for every record, in input order.
    pub fn full_hashes(&self, files: &[&FileRecord]) -> Vec<Result<Hash, HashError>> {
        self.run("fullhash", files, |hasher, file| hasher.full_hash(&file.path))
    }

    /// Complete fingerprints (quick and full) for every record.
    pub fn fingerprints(&self, files: &[&FileRecord]) -> Vec<Result<Fingerprint, HashError>> {
        self.run("fullhash", files, |hasher, file| hasher.fingerprint(file))
    }

    fn run<T, F>(&self, phase: &str, files: &[&FileRecord], op: F) -> Vec<Result<T, HashError>>
    where
        T: Send,
        F: Fn(&Hasher, &FileRecord) -> Result<T, HashError> + Sync,
    {
        if files.is_empty() {
            return Vec::new();
        }
        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_start(phase, files.len());
        }

        let done = AtomicUsize::new(0);
        let hasher = &*self.hasher;
        let results = self.pool.install(|| {
            files
                .par_iter()
                .map(|file| {
                    if self.is_shutdown_requested() {
                        return Err(HashError::Interrupted(file.path.clone()));
                    }
                    let result = op(hasher, file);
                    if let Err(ref e) = result {
                        if !e.is_interrupted() {
                            log::warn!("Failed to {} {}: {}", phase, file.path.display(), e);
                        }
                    }
                    if let Some(ref callback) = self.progress_callback {
                        let current = done.fetch_add(1, Ordering::Relaxed) + 1;
                        callback.on_progress(current, file.path.to_string_lossy().as_ref());
                        callback.on_item_completed(file.size);
                    }
                    result
                })
                .collect()
        });

        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_end(phase);
        }
        results
    }
}
