//! RENAME and RELOCATE file moves.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MoveError {
    #[error("destination already exists: {0}")]
    DestinationExists(PathBuf),

    #[error("copy of {source_path} to {destination} is {found} bytes, expected {expected}")]
    SizeMismatch {
        source_path: PathBuf,
        destination: PathBuf,
        expected: u64,
        found: u64,
    },

    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> MoveError + '_ {
    move |source| MoveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Move `source` to `destination`, creating parent directories.
///
/// Never replaces an existing destination. Moves across filesystems fall
/// back to copy, size check and removal of the source. Returns the number
/// of bytes moved.
pub fn move_file(source: &Path, destination: &Path) -> Result<u64, MoveError> {
    if destination.symlink_metadata().is_ok() {
        return Err(MoveError::DestinationExists(destination.to_path_buf()));
    }
    let size = fs::metadata(source).map_err(io_err(source))?.len();
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    match fs::rename(source, destination) {
        Ok(()) => {
            log::info!("Moved {} -> {}", source.display(), destination.display());
            Ok(size)
        }
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            log::debug!(
                "{} and {} are on different filesystems; copying",
                source.display(),
                destination.display()
            );
            copy_then_remove(source, destination, size)
        }
        Err(e) => Err(io_err(source)(e)),
    }
}

fn copy_then_remove(source: &Path, destination: &Path, size: u64) -> Result<u64, MoveError> {
    let copied = fs::copy(source, destination).map_err(io_err(destination))?;
    if copied != size {
        let _ = fs::remove_file(destination);
        return Err(MoveError::SizeMismatch {
            source_path: source.to_path_buf(),
            destination: destination.to_path_buf(),
            expected: size,
            found: copied,
        });
    }
    fs::remove_file(source).map_err(io_err(source))?;
    log::info!("Copied {} -> {} and removed source", source.display(), destination.display());
    Ok(size)
}
