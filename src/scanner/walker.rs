//! Directory walker built on jwalk.
//!
//! Children of every directory are sorted by file name before descent, so
//! the enumeration order of an unchanged tree is stable across runs. That
//! order is what batch indices refer to when a scan is resumed.
//!
//! Excluded directories are removed from the child list inside
//! `process_read_dir`, so they are never opened.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use jwalk::WalkDir;

use super::{ExclusionRules, FileRecord, ScanConfig, ScanError};

/// Deterministic walker over a single scan root.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    root_id: usize,
    config: ScanConfig,
    rules: Arc<ExclusionRules>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a walker for `root`.
    ///
    /// The root is canonicalized so every [`FileRecord::path`] is absolute.
    ///
    /// # Errors
    ///
    /// Fails when the root is missing or not a directory, or when an
    /// exclusion pattern does not compile.
    pub fn new(root: &Path, root_id: usize, config: ScanConfig) -> Result<Self, ScanError> {
        let root = root.canonicalize().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ScanError::NotFound(root.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => {
                ScanError::PermissionDenied(root.to_path_buf())
            }
            _ => ScanError::Io {
                path: root.to_path_buf(),
                source: e,
            },
        })?;
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root));
        }

        let rules = ExclusionRules::new(&root, &config.exclude)?;
        log::debug!(
            "Walker for {} with {} exclusion rule(s)",
            root.display(),
            rules.len()
        );

        Ok(Self {
            root,
            root_id,
            config,
            rules: Arc::new(rules),
            shutdown_flag: None,
        })
    }

    /// Stop iteration as soon as the flag is raised.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Canonical scan root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree, yielding regular files in deterministic order.
    ///
    /// Per-entry problems are yielded as [`ScanError`] values rather than
    /// ending the walk. Empty files and files outside the extension
    /// allow-list are skipped.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileRecord, ScanError>> {
        let rules = Arc::clone(&self.rules);
        let walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(self.config.skip_hidden)
            .process_read_dir(move |_depth, _path, _read_dir_state, children| {
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
                children.retain(|entry| match entry {
                    Ok(entry) => {
                        let path = entry.path();
                        let is_dir = entry.file_type().is_dir();
                        if rules.is_excluded(&path, is_dir) {
                            log::trace!(
                                "Excluded {} ({})",
                                path.display(),
                                rules.matching_pattern(&path, is_dir).unwrap_or("")
                            );
                            false
                        } else {
                            true
                        }
                    }
                    Err(_) => true,
                });
            });

        let root = self.root.clone();
        let root_id = self.root_id;
        let config = self.config.clone();
        let shutdown = self.shutdown_flag.clone();

        walk_dir.into_iter().filter_map(move |entry_result| {
            if shutdown.as_ref().is_some_and(|f| f.load(Ordering::SeqCst)) {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                return None;
            }

            match entry_result {
                Ok(entry) => {
                    let path = entry.path();
                    if path == root {
                        return None;
                    }

                    let file_type = entry.file_type();
                    if file_type.is_dir() {
                        return None;
                    }

                    let is_symlink = file_type.is_symlink();
                    if is_symlink && !config.follow_symlinks {
                        log::trace!("Skipping symlink: {}", path.display());
                        return None;
                    }

                    let metadata = if config.follow_symlinks {
                        std::fs::metadata(&path)
                    } else {
                        std::fs::symlink_metadata(&path)
                    };
                    let metadata = match metadata {
                        Ok(m) => m,
                        Err(e) => return Some(Err(handle_io_error(&path, e))),
                    };
                    if !metadata.is_file() {
                        return None;
                    }

                    process_file_entry(path, &metadata, root_id, &config).map(Ok)
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| root.clone(), std::borrow::ToOwned::to_owned);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    Some(Err(handle_jwalk_error(path, e)))
                }
            }
        })
    }

    /// Collect the full enumeration, logging and dropping per-entry errors.
    #[must_use]
    pub fn collect_files(&self) -> (Vec<FileRecord>, Vec<ScanError>) {
        let mut files = Vec::new();
        let mut errors = Vec::new();
        for item in self.walk() {
            match item {
                Ok(file) => files.push(file),
                Err(e) => errors.push(e),
            }
        }
        (files, errors)
    }
}

fn process_file_entry(
    path: PathBuf,
    metadata: &Metadata,
    root_id: usize,
    config: &ScanConfig,
) -> Option<FileRecord> {
    let size = metadata.len();

    // Empty files all share one hash and are usually placeholders
    if size == 0 {
        log::debug!("Skipping empty file: {}", path.display());
        return None;
    }

    if !config.extensions.is_empty() {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if !config.extensions.iter().any(|e| *e == extension) {
            log::trace!("Skipping file due to extension filter: {}", path.display());
            return None;
        }
    }

    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

    Some(FileRecord {
        path,
        size,
        modified: DateTime::<Utc>::from(modified),
        root_id,
    })
}

fn handle_io_error(path: &Path, error: std::io::Error) -> ScanError {
    use std::io::ErrorKind;

    match error.kind() {
        ErrorKind::PermissionDenied => {
            log::warn!("Permission denied: {}", path.display());
            ScanError::PermissionDenied(path.to_path_buf())
        }
        ErrorKind::NotFound => {
            log::debug!("File not found (may have been deleted): {}", path.display());
            ScanError::NotFound(path.to_path_buf())
        }
        _ => {
            log::warn!("I/O error for {}: {}", path.display(), error);
            ScanError::Io {
                path: path.to_path_buf(),
                source: error,
            }
        }
    }
}

fn handle_jwalk_error(path: PathBuf, error: jwalk::Error) -> ScanError {
    match error.io_error().map(std::io::Error::kind) {
        Some(std::io::ErrorKind::PermissionDenied) => ScanError::PermissionDenied(path),
        Some(std::io::ErrorKind::NotFound) => ScanError::NotFound(path),
        _ => ScanError::Io {
            path,
            source: std::io::Error::other(error.to_string()),
        },
    }
}

/// Scan one root with default options and the given exclusion patterns.
///
/// # Errors
///
/// Fails when the root is unusable or a pattern is invalid.
pub fn scan(
    root: &Path,
    exclusion_patterns: &[String],
) -> Result<impl Iterator<Item = Result<FileRecord, ScanError>>, ScanError> {
    let config = ScanConfig::default().with_exclude(exclusion_patterns.to_vec());
    Ok(Walker::new(root, 0, config)?.walk())
}

/// Walk several roots in order, tagging each record with its root index.
///
/// # Errors
///
/// Fails before walking anything if any root is unusable.
pub fn scan_roots(
    roots: &[PathBuf],
    config: &ScanConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
) -> Result<Vec<Walker>, ScanError> {
    roots
        .iter()
        .enumerate()
        .map(|(id, root)| {
            let walker = Walker::new(root, id, config.clone())?;
            Ok(match &shutdown_flag {
                Some(flag) => walker.with_shutdown_flag(Arc::clone(flag)),
                None => walker,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    /// Create a test directory with some files.
    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();

        let mut f = File::create(dir.path().join("file1.txt")).unwrap();
        writeln!(f, "Hello, world!").unwrap();

        let mut f = File::create(dir.path().join("file2.txt")).unwrap();
        writeln!(f, "Another file").unwrap();

        let subdir = dir.path().join("subdir");
        fs::create_dir(&subdir).unwrap();
        let mut f = File::create(subdir.join("nested.txt")).unwrap();
        writeln!(f, "Nested file content").unwrap();

        dir
    }

    fn names(files: &[FileRecord]) -> Vec<String> {
        files.iter().map(FileRecord::file_name).collect()
    }

    #[test]
    fn test_walker_finds_files() {
        let dir = create_test_dir();
        let walker = Walker::new(dir.path(), 0, ScanConfig::default()).unwrap();

        let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();

        assert_eq!(files.len(), 3);
        for file in &files {
            assert!(file.size > 0);
            assert!(file.path.is_absolute());
            assert_eq!(file.root_id, 0);
        }
    }

    #[test]
    fn test_walker_order_is_sorted_and_stable() {
        let dir = TempDir::new().unwrap();
        for name in ["c.txt", "a.txt", "b.txt"] {
            fs::write(dir.path().join(name), name).unwrap();
        }
        fs::create_dir(dir.path().join("a_dir")).unwrap();
        fs::write(dir.path().join("a_dir").join("z.txt"), "z").unwrap();

        let walker = Walker::new(dir.path(), 0, ScanConfig::default()).unwrap();
        let first = names(&walker.collect_files().0);
        let second = names(&walker.collect_files().0);

        assert_eq!(first, vec!["a.txt", "z.txt", "b.txt", "c.txt"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_walker_skip_empty_files() {
        let dir = TempDir::new().unwrap();
        File::create(dir.path().join("empty.txt")).unwrap();
        fs::write(dir.path().join("full.txt"), "data").unwrap();

        let walker = Walker::new(dir.path(), 0, ScanConfig::default()).unwrap();
        assert_eq!(names(&walker.collect_files().0), vec!["full.txt"]);
    }

    #[test]
    fn test_walker_skip_hidden_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".hidden"), "x").unwrap();
        fs::write(dir.path().join("visible"), "x").unwrap();

        let all = Walker::new(dir.path(), 0, ScanConfig::default()).unwrap();
        assert_eq!(all.collect_files().0.len(), 2);

        let visible =
            Walker::new(dir.path(), 0, ScanConfig::default().with_skip_hidden(true)).unwrap();
        assert_eq!(names(&visible.collect_files().0), vec!["visible"]);
    }

    #[test]
    fn test_walker_prunes_excluded_directories() {
        let dir = create_test_dir();
        let modules = dir.path().join("node_modules").join("pkg");
        fs::create_dir_all(&modules).unwrap();
        fs::write(modules.join("index.js"), "module").unwrap();

        let config = ScanConfig::default().with_exclude(vec!["node_modules/".into()]);
        let walker = Walker::new(dir.path(), 0, config).unwrap();
        let files = walker.collect_files().0;

        assert_eq!(files.len(), 3);
        assert!(files
            .iter()
            .all(|f| !f.path.components().any(|c| c.as_os_str() == "node_modules")));
    }

    #[test]
    fn test_walker_absolute_exclusion() {
        let dir = create_test_dir();
        let sub = dir.path().canonicalize().unwrap().join("subdir");
        let config =
            ScanConfig::default().with_exclude(vec![sub.to_string_lossy().into_owned()]);
        let walker = Walker::new(dir.path(), 0, config).unwrap();

        assert_eq!(names(&walker.collect_files().0), vec!["file1.txt", "file2.txt"]);
    }

    #[test]
    fn test_walker_extension_filter() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.PDF"), "pdf").unwrap();
        fs::write(dir.path().join("b.txt"), "txt").unwrap();

        let config = ScanConfig::default().with_extensions(vec!["pdf".into()]);
        let walker = Walker::new(dir.path(), 0, config).unwrap();
        assert_eq!(names(&walker.collect_files().0), vec!["a.PDF"]);
    }

    #[test]
    fn test_walker_shutdown_flag() {
        let dir = create_test_dir();
        let flag = Arc::new(AtomicBool::new(true));
        let walker = Walker::new(dir.path(), 0, ScanConfig::default())
            .unwrap()
            .with_shutdown_flag(flag);

        assert_eq!(walker.walk().count(), 0);
    }

    #[test]
    fn test_walker_handles_nonexistent_path() {
        let err = Walker::new(Path::new("/nonexistent/volclean/root"), 0, ScanConfig::default())
            .unwrap_err();
        assert!(matches!(err, ScanError::NotFound(_)));
    }

    #[test]
    fn test_walker_rejects_file_root() {
        let dir = create_test_dir();
        let err = Walker::new(&dir.path().join("file1.txt"), 0, ScanConfig::default())
            .unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory(_)));
    }

    #[test]
    fn test_scan_roots_tags_root_ids() {
        let a = create_test_dir();
        let b = create_test_dir();
        let walkers = scan_roots(
            &[a.path().to_path_buf(), b.path().to_path_buf()],
            &ScanConfig::default(),
            None,
        )
        .unwrap();

        let ids: Vec<usize> = walkers
            .iter()
            .flat_map(|w| w.collect_files().0)
            .map(|f| f.root_id)
            .collect();
        assert_eq!(ids, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_scan_convenience() {
        let dir = create_test_dir();
        let files: Vec<_> = scan(dir.path(), &["*.txt".to_string()])
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        assert!(files.is_empty());
    }
}
