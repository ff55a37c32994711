//! Pre-execution backup archives.
//!
//! Before a live run mutates anything, every source the plan will touch is
//! copied into a gzip-compressed tar archive:
//!
//! ```text
//! files/000000/<file name>
//! files/000001/<file name>
//! ...
//! MANIFEST.json        archive path -> original absolute path
//! ```
//!
//! The archive is then re-opened and every entry read back. A live run
//! proceeds only when this succeeds.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tar::{Archive, Builder, EntryType, Header};
use thiserror::Error;

use crate::plan::ActionPlan;

/// Name of the manifest entry inside every archive.
pub const MANIFEST_NAME: &str = "MANIFEST.json";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("cannot read {path} for backup: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write backup archive {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("backup archive {path} failed verification: {reason}")]
    Verify { path: PathBuf, reason: String },

    #[error("failed to encode backup manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// One archived file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub archive_path: String,
    pub original_path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub plan_id: String,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<ManifestEntry>,
}

/// A created and verified archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub files: usize,
    pub bytes: u64,
}

/// Archive the sources of every mutating action in `plan` to `path`, then
/// verify the archive.
///
/// Sources that no longer exist are left out; the executor will report
/// them as missing without touching anything.
pub fn create_backup(
    plan: &ActionPlan,
    path: &Path,
    at: DateTime<Utc>,
) -> Result<BackupInfo, BackupError> {
    let write_err = |source| BackupError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let sources: BTreeSet<&Path> = plan.mutating().map(|a| a.source.as_path()).collect();
    let file = File::options()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(write_err)?;
    let mut builder = Builder::new(GzEncoder::new(BufWriter::new(file), Compression::default()));

    let mut manifest = BackupManifest {
        plan_id: plan.id.clone(),
        created_at: at,
        entries: Vec::with_capacity(sources.len()),
    };

    for source in sources {
        let metadata = match fs::metadata(source) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("Not archiving missing source {}", source.display());
                continue;
            }
            Err(e) => {
                return Err(BackupError::Unreadable {
                    path: source.to_path_buf(),
                    source: e,
                })
            }
        };
        let reader = File::open(source).map_err(|e| BackupError::Unreadable {
            path: source.to_path_buf(),
            source: e,
        })?;

        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let archive_path = format!("files/{:06}/{}", manifest.entries.len(), file_name);

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(metadata.len());
        header.set_mtime(
            metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_secs()),
        );
        builder
            .append_data(&mut header, &archive_path, reader)
            .map_err(|e| BackupError::Unreadable {
                path: source.to_path_buf(),
                source: e,
            })?;

        manifest.entries.push(ManifestEntry {
            archive_path,
            original_path: source.to_path_buf(),
            size: metadata.len(),
        });
    }

    let manifest_json = serde_json::to_vec_pretty(&manifest)?;
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_mode(0o644);
    header.set_size(manifest_json.len() as u64);
    header.set_mtime(u64::try_from(at.timestamp()).unwrap_or(0));
    builder
        .append_data(&mut header, MANIFEST_NAME, manifest_json.as_slice())
        .map_err(write_err)?;

    let encoder = builder.into_inner().map_err(write_err)?;
    let writer = encoder.finish().map_err(write_err)?;
    let file = writer
        .into_inner()
        .map_err(|e| write_err(e.into_error()))?;
    file.sync_all().map_err(write_err)?;

    let info = verify_backup(path, &manifest)?;
    log::info!(
        "Backup written to {} ({} files, {} bytes)",
        info.path.display(),
        info.files,
        info.bytes
    );
    Ok(info)
}

/// Re-read an archive and check it against `expected`.
///
/// Every entry must decompress fully to its recorded size, the embedded
/// manifest must equal `expected` and every manifest entry must be present.
pub fn verify_backup(path: &Path, expected: &BackupManifest) -> Result<BackupInfo, BackupError> {
    let fail = |reason: String| BackupError::Verify {
        path: path.to_path_buf(),
        reason,
    };

    let archive_len = fs::metadata(path)
        .map_err(|e| fail(e.to_string()))?
        .len();
    if archive_len == 0 {
        return Err(fail("archive is empty".into()));
    }

    let file = File::open(path).map_err(|e| fail(e.to_string()))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    let mut seen = BTreeSet::new();
    let mut stored_manifest: Option<BackupManifest> = None;
    let mut bytes = 0u64;

    for entry in archive.entries().map_err(|e| fail(e.to_string()))? {
        let mut entry = entry.map_err(|e| fail(e.to_string()))?;
        let name = entry
            .path()
            .map_err(|e| fail(e.to_string()))?
            .to_string_lossy()
            .into_owned();
        let declared = entry.header().size().map_err(|e| fail(e.to_string()))?;

        if name == MANIFEST_NAME {
            let mut json = Vec::new();
            entry
                .read_to_end(&mut json)
                .map_err(|e| fail(e.to_string()))?;
            let manifest = serde_json::from_slice(&json)
                .map_err(|e| fail(format!("unreadable manifest: {e}")))?;
            stored_manifest = Some(manifest);
            continue;
        }

        let read = io::copy(&mut entry, &mut io::sink()).map_err(|e| fail(e.to_string()))?;
        if read != declared {
            return Err(fail(format!("{name}: read {read} of {declared} bytes")));
        }
        bytes += read;
        seen.insert(name);
    }

    match stored_manifest {
        Some(ref m) if m == expected => {}
        Some(_) => return Err(fail("manifest does not match the plan".into())),
        None => return Err(fail("manifest missing".into())),
    }
    if let Some(missing) = expected
        .entries
        .iter()
        .find(|e| !seen.contains(&e.archive_path))
    {
        return Err(fail(format!("{} missing from archive", missing.original_path.display())));
    }

    Ok(BackupInfo {
        path: path.to_path_buf(),
        files: expected.entries.len(),
        bytes,
    })
}

/// Read the manifest of an existing archive, for manual recovery.
pub fn read_manifest(path: &Path) -> Result<BackupManifest, BackupError> {
    let fail = |reason: String| BackupError::Verify {
        path: path.to_path_buf(),
        reason,
    };
    let file = File::open(path).map_err(|e| fail(e.to_string()))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    for entry in archive.entries().map_err(|e| fail(e.to_string()))? {
        let mut entry = entry.map_err(|e| fail(e.to_string()))?;
        let is_manifest = entry
            .path()
            .map(|p| p.to_string_lossy() == MANIFEST_NAME)
            .unwrap_or(false);
        if is_manifest {
            let mut json = Vec::new();
            entry
                .read_to_end(&mut json)
                .map_err(|e| fail(e.to_string()))?;
            return serde_json::from_slice(&json).map_err(|e| fail(e.to_string()));
        }
    }
    Err(fail("manifest missing".into()))
}
