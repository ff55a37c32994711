//! BLAKE3 fingerprinting.
//!
//! Every file gets a cheap *quick signature* (its size plus the first
//! [`PREHASH_SIZE`] bytes). Files whose quick signature could collide with
//! something already known get a *full hash* of the whole content, streamed
//! in fixed-size chunks so memory use does not depend on file size.
//!
//! Two files with different quick signatures always have different content;
//! equal quick signatures prove nothing and only a full-hash match identifies
//! a duplicate.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{FileRecord, HashError};

/// Number of leading bytes covered by the quick signature.
pub const PREHASH_SIZE: usize = 4096;

/// Default read size for full hashing.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A 32-byte BLAKE3 digest.
pub type Hash = [u8; 32];

/// Render a digest as lowercase hex.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    blake3::Hash::from(*hash).to_hex().to_string()
}

/// Parse a 64-character hex digest.
#[must_use]
pub fn hex_to_hash(hex: &str) -> Option<Hash> {
    blake3::Hash::from_hex(hex).ok().map(|h| *h.as_bytes())
}

/// Serde adapter storing a [`Hash`] as hex.
pub mod hex_hash {
    use super::{hash_to_hex, hex_to_hash, Hash};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hash_to_hex(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex_to_hash(&s).ok_or_else(|| de::Error::custom(format!("invalid hash: {s}")))
    }
}

/// Serde adapter storing an `Option<Hash>` as hex or null.
pub mod hex_hash_opt {
    use super::{hash_to_hex, hex_to_hash, Hash};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Option<Hash>, serializer: S) -> Result<S::Ok, S::Error> {
        match hash {
            Some(h) => serializer.serialize_some(&hash_to_hex(h)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Hash>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => hex_to_hash(&s)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid hash: {s}"))),
            None => Ok(None),
        }
    }
}

/// Content identity of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// BLAKE3 of `size (u64 LE) || first PREHASH_SIZE bytes`.
    #[serde(with = "hex_hash")]
    pub quick: Hash,
    /// BLAKE3 of the full content. `None` when skipped because the quick
    /// signature already proved the file unique.
    #[serde(with = "hex_hash_opt", default)]
    pub full: Option<Hash>,
}

impl Fingerprint {
    #[must_use]
    pub fn quick_only(quick: Hash) -> Self {
        Self { quick, full: None }
    }

    #[must_use]
    pub fn complete(quick: Hash, full: Hash) -> Self {
        Self {
            quick,
            full: Some(full),
        }
    }

    /// Whether a full hash was computed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.full.is_some()
    }
}

/// Streaming BLAKE3 hasher.
#[derive(Debug, Clone)]
pub struct Hasher {
    chunk_size: usize,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            shutdown_flag: None,
        }
    }

    /// Set the read size used for full hashing. Values below 4 KiB are raised.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(4096);
        self
    }

    /// Abort long full-hash reads when the flag is raised.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Compute the quick signature, reading at most [`PREHASH_SIZE`] bytes.
    ///
    /// The size mixed in is the one observed when the file is opened, so a
    /// file that changed since enumeration is still signed consistently.
    pub fn quick_signature(&self, path: &Path) -> Result<Hash, HashError> {
        let file = File::open(path).map_err(|e| map_io_error(path, e))?;
        let size = file.metadata().map_err(|e| map_io_error(path, e))?.len();

        let mut head = Vec::with_capacity(PREHASH_SIZE);
        file.take(PREHASH_SIZE as u64)
            .read_to_end(&mut head)
            .map_err(|e| map_io_error(path, e))?;

        let mut hasher = blake3::Hasher::new();
        hasher.update(&size.to_le_bytes());
        hasher.update(&head);
        Ok(*hasher.finalize().as_bytes())
    }

    /// Compute the BLAKE3 hash of the whole file in constant memory.
    pub fn full_hash(&self, path: &Path) -> Result<Hash, HashError> {
        let mut file = File::open(path).map_err(|e| map_io_error(path, e))?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            if self.is_shutdown_requested() {
                return Err(HashError::Interrupted(path.to_path_buf()));
            }
            let read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_io_error(path, e)),
            };
            hasher.update(&buffer[..read]);
        }

        Ok(*hasher.finalize().as_bytes())
    }

    /// Compute both signatures for a record.
    pub fn fingerprint(&self, record: &FileRecord) -> Result<Fingerprint, HashError> {
        let quick = self.quick_signature(&record.path)?;
        let full = self.full_hash(&record.path)?;
        Ok(Fingerprint::complete(quick, full))
    }
}

/// Map an I/O failure to the matching [`HashError`] variant.
pub(crate) fn map_io_error(path: &Path, error: io::Error) -> HashError {
    match error.kind() {
        io::ErrorKind::NotFound => HashError::NotFound(path.to_path_buf()),
        io::ErrorKind::PermissionDenied => HashError::PermissionDenied(path.to_path_buf()),
        _ => HashError::Io {
            path: path.to_path_buf(),
            source: error,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_full_hash_matches_blake3() {
        let dir = TempDir::new().unwrap();
        let content = b"hello volclean";
        let path = write(&dir, "a.txt", content);

        let hash = Hasher::new().full_hash(&path).unwrap();
        assert_eq!(hash, *blake3::hash(content).as_bytes());
    }

    #[test]
    fn test_full_hash_spans_chunks() {
        let dir = TempDir::new().unwrap();
        let content: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let path = write(&dir, "big.bin", &content);

        let hasher = Hasher::new().with_chunk_size(4096);
        assert_eq!(
            hasher.full_hash(&path).unwrap(),
            *blake3::hash(&content).as_bytes()
        );
    }

    #[test]
    fn test_quick_signature_includes_size() {
        let dir = TempDir::new().unwrap();
        let mut long = vec![7u8; PREHASH_SIZE];
        let a = write(&dir, "a.bin", &long);
        long.push(9);
        let b = write(&dir, "b.bin", &long);

        let hasher = Hasher::new();
        assert_ne!(
            hasher.quick_signature(&a).unwrap(),
            hasher.quick_signature(&b).unwrap()
        );
    }

    #[test]
    fn test_quick_signature_equal_for_shared_prefix_and_size() {
        let dir = TempDir::new().unwrap();
        let mut first = vec![1u8; PREHASH_SIZE + 10];
        let mut second = first.clone();
        first[PREHASH_SIZE + 5] = 2;
        second[PREHASH_SIZE + 5] = 3;
        let a = write(&dir, "a.bin", &first);
        let b = write(&dir, "b.bin", &second);

        let hasher = Hasher::new();
        assert_eq!(
            hasher.quick_signature(&a).unwrap(),
            hasher.quick_signature(&b).unwrap()
        );
        assert_ne!(hasher.full_hash(&a).unwrap(), hasher.full_hash(&b).unwrap());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = Hasher::new()
            .full_hash(&dir.path().join("missing"))
            .unwrap_err();
        assert!(matches!(err, HashError::NotFound(_)));
    }

    #[test]
    fn test_shutdown_interrupts_full_hash() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.txt", b"data");
        let flag = Arc::new(AtomicBool::new(true));

        let err = Hasher::new()
            .with_shutdown_flag(flag)
            .full_hash(&path)
            .unwrap_err();
        assert!(matches!(err, HashError::Interrupted(_)));
    }

    #[test]
    fn test_hex_helpers() {
        let hash = *blake3::hash(b"x").as_bytes();
        let hex = hash_to_hex(&hash);
        assert_eq!(hex.len(), 64);
        assert_eq!(hex_to_hash(&hex), Some(hash));
        assert_eq!(hex_to_hash("zz"), None);
    }

    #[test]
    fn test_fingerprint_serde_uses_hex() {
        let fp = Fingerprint::quick_only([0xab; 32]);
        let json = serde_json::to_string(&fp).unwrap();
        assert!(json.contains(&"ab".repeat(32)));
        assert!(json.contains("\"full\":null"));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
        assert!(!back.is_complete());
    }
}
