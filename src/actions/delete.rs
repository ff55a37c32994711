//! Duplicate removal: system trash or permanent deletion.
//!
//! A duplicate is only removed after its kept copy has been confirmed to
//! exist and be readable, and after its own size has been checked against
//! the size recorded when the plan was built.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Error type for deletion operations.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// File was not found (may have been deleted or moved).
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// File size differs from the size recorded in the plan.
    #[error("file changed since the plan was built: {path} ({expected} bytes planned, {found} now)")]
    Modified {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    #[error("kept copy no longer exists: {0}")]
    KeptCopyMissing(PathBuf),

    #[error("kept copy is not readable: {path}: {source}")]
    KeptCopyUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("trash operation failed for {path}: {message}")]
    TrashFailed { path: PathBuf, message: String },

    #[error("permanent delete failed for {path}: {message}")]
    PermanentDeleteFailed { path: PathBuf, message: String },

    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DeleteError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p)
            | Self::PermissionDenied(p)
            | Self::KeptCopyMissing(p)
            | Self::Modified { path: p, .. }
            | Self::KeptCopyUnreadable { path: p, .. }
            | Self::TrashFailed { path: p, .. }
            | Self::PermanentDeleteFailed { path: p, .. }
            | Self::Io { path: p, .. } => p,
        }
    }
}

fn metadata(path: &Path) -> Result<fs::Metadata, DeleteError> {
    fs::metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => DeleteError::NotFound(path.to_path_buf()),
        io::ErrorKind::PermissionDenied => DeleteError::PermissionDenied(path.to_path_buf()),
        _ => DeleteError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })
}

/// Confirm the kept copy exists and its content can be read.
pub fn verify_kept_copy(path: &Path) -> Result<(), DeleteError> {
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            DeleteError::KeptCopyMissing(path.to_path_buf())
        } else {
            DeleteError::KeptCopyUnreadable {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;
    io::copy(&mut (&mut file).take(1), &mut io::sink())
        .map_err(|e| DeleteError::KeptCopyUnreadable {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(())
}

/// Move a file to the system trash. Returns its size.
pub fn delete_to_trash(path: &Path) -> Result<u64, DeleteError> {
    let size = metadata(path)?.len();

    trash::delete(path).map_err(|e| {
        log::error!("Trash operation failed for {}: {}", path.display(), e);
        DeleteError::TrashFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })?;

    log::info!("Moved to trash: {} ({} bytes)", path.display(), size);
    Ok(size)
}

/// Permanently remove a file. Returns its size.
pub fn permanent_delete(path: &Path) -> Result<u64, DeleteError> {
    let size = metadata(path)?.len();

    fs::remove_file(path).map_err(|e| {
        log::error!("Permanent delete failed for {}: {}", path.display(), e);
        DeleteError::PermanentDeleteFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })?;

    log::info!("Permanently deleted: {} ({} bytes)", path.display(), size);
    Ok(size)
}

/// Remove `path`, a duplicate of `kept`, after verifying both.
pub fn delete_duplicate(
    path: &Path,
    expected_size: u64,
    kept: &Path,
    use_trash: bool,
) -> Result<u64, DeleteError> {
    verify_kept_copy(kept)?;

    let found = metadata(path)?.len();
    if found != expected_size {
        log::warn!(
            "Not deleting {}: size changed from {} to {}",
            path.display(),
            expected_size,
            found
        );
        return Err(DeleteError::Modified {
            path: path.to_path_buf(),
            expected: expected_size,
            found,
        });
    }

    if use_trash {
        delete_to_trash(path)
    } else {
        permanent_delete(path)
    }
}
