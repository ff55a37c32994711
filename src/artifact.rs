//! Checksummed, versioned JSON envelopes for every persisted artifact.
//!
//! Each artifact (master index, scan progress, batch report, plan, execution
//! report) is written as:
//!
//! ```json
//! { "kind": "plan", "version": 1, "checksum": "<sha256>", "payload": { ... } }
//! ```
//!
//! The checksum covers the compact JSON of the payload after it has been
//! converted to a `serde_json::Value`, so key order never affects it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A persisted document type.
pub trait Artifact: Serialize + DeserializeOwned {
    /// Tag stored in the envelope; loading a file of another kind fails.
    const KIND: &'static str;
    /// Current format version. Loading any other version fails.
    const VERSION: u32;
}

/// Errors reading or writing artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("integrity check failed for {0}: checksum mismatch")]
    ChecksumMismatch(PathBuf),

    #[error("{path} holds a '{found}' artifact, expected '{expected}'")]
    KindMismatch {
        path: PathBuf,
        expected: &'static str,
        found: String,
    },

    #[error("unsupported {kind} version {found} in {path} (current is {expected})")]
    UnsupportedVersion {
        path: PathBuf,
        kind: &'static str,
        found: u32,
        expected: u32,
    },

    #[error("refusing to overwrite existing artifact: {0}")]
    AlreadyExists(PathBuf),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ArtifactError {
    /// True for failures that mean the file content cannot be trusted.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. }
                | Self::ChecksumMismatch(_)
                | Self::KindMismatch { .. }
                | Self::UnsupportedVersion { .. }
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    kind: String,
    version: u32,
    checksum: String,
    payload: serde_json::Value,
}

fn checksum_of(payload: &serde_json::Value) -> Result<String, ArtifactError> {
    let compact = serde_json::to_string(payload)?;
    let mut hasher = Sha256::new();
    hasher.update(compact.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn io_error(path: &Path, source: io::Error) -> ArtifactError {
    ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Serialize an artifact into its pretty-printed envelope.
pub fn to_json<T: Artifact>(artifact: &T) -> Result<String, ArtifactError> {
    let payload = serde_json::to_value(artifact)?;
    let envelope = Envelope {
        kind: T::KIND.to_string(),
        version: T::VERSION,
        checksum: checksum_of(&payload)?,
        payload,
    };
    Ok(serde_json::to_string_pretty(&envelope)?)
}

/// Parse and verify an envelope read from `path`.
pub fn from_json<T: Artifact>(path: &Path, content: &str) -> Result<T, ArtifactError> {
    let envelope: Envelope = serde_json::from_str(content).map_err(|e| ArtifactError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if envelope.kind != T::KIND {
        return Err(ArtifactError::KindMismatch {
            path: path.to_path_buf(),
            expected: T::KIND,
            found: envelope.kind,
        });
    }

    if checksum_of(&envelope.payload)? != envelope.checksum {
        return Err(ArtifactError::ChecksumMismatch(path.to_path_buf()));
    }

    if envelope.version != T::VERSION {
        return Err(ArtifactError::UnsupportedVersion {
            path: path.to_path_buf(),
            kind: T::KIND,
            found: envelope.version,
            expected: T::VERSION,
        });
    }

    serde_json::from_value(envelope.payload).map_err(|e| ArtifactError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load and verify an artifact.
pub fn read<T: Artifact>(path: &Path) -> Result<T, ArtifactError> {
    let content = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    from_json(path, &content)
}

/// Durably replace `path` with the artifact.
///
/// The envelope goes to a sibling temp file which is synced and renamed over
/// the target, so readers see either the old or the new content.
pub fn write_atomic<T: Artifact>(path: &Path, artifact: &T) -> Result<(), ArtifactError> {
    let json = to_json(artifact)?;
    ensure_parent(path)?;

    let tmp = temp_sibling(path);
    {
        let mut file = File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| io_error(&tmp, e))?;
        file.sync_all().map_err(|e| io_error(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        io_error(path, e)
    })?;
    sync_parent(path);
    Ok(())
}

/// Write an artifact that must never be overwritten (plans, reports).
pub fn write_new<T: Artifact>(path: &Path, artifact: &T) -> Result<(), ArtifactError> {
    let json = to_json(artifact)?;
    ensure_parent(path)?;

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                ArtifactError::AlreadyExists(path.to_path_buf())
            } else {
                io_error(path, e)
            }
        })?;
    file.write_all(json.as_bytes())
        .map_err(|e| io_error(path, e))?;
    file.sync_all().map_err(|e| io_error(path, e))?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<(), ArtifactError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))
        }
        _ => Ok(()),
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            if let Err(e) = dir.sync_all() {
                log::debug!("Failed to sync directory {}: {}", parent.display(), e);
            }
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}
