//! Content-addressed blob files on disk.
//!
//! Each blob is stored at `<dir>/<fingerprint>.blob` behind a header holding
//! magic bytes, the container format version, the version of the producer
//! that wrote it, and a checksum of the payload.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use kiln_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::BlobError;
use crate::BlobStore;

/// Magic bytes identifying a Kiln blob file.
const BLOB_MAGIC: [u8; 4] = *b"KBLB";

/// Current blob container version. Increment on breaking changes to the
/// header or payload layout.
const BLOB_FORMAT_VERSION: u32 = 1;

/// File extension for blob files.
const BLOB_EXT: &str = "blob";
const TEMP_EXT: &str = "tmp";

/// Header prepended to every blob file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlobHeader {
    magic: [u8; 4],
    format_version: u32,
    producer_version: String,
    checksum: ContentHash,
}

/// A [`BlobStore`] backed by one file per fingerprint.
///
/// Blobs written by a different producer version are treated as misses, so a
/// compiler upgrade never reuses binaries produced by an older generator.
/// Writes go to a temporary file that is renamed into place, so concurrent
/// readers never observe a half-written blob.
pub struct FileBlobStore {
    dir: PathBuf,
    producer_version: String,
    temp_counter: AtomicU64,
}

impl FileBlobStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: &Path, producer_version: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            producer_version: producer_version.to_string(),
            temp_counter: AtomicU64::new(0),
        }
    }

    /// Returns the root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file path for a fingerprint.
    pub fn blob_path(&self, key: &ContentHash) -> PathBuf {
        self.dir.join(format!("{key}.{BLOB_EXT}"))
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, BlobError> {
        let header = BlobHeader {
            magic: BLOB_MAGIC,
            format_version: BLOB_FORMAT_VERSION,
            producer_version: self.producer_version.clone(),
            checksum: ContentHash::from_bytes(data),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| BlobError::Serialization {
                reason: e.to_string(),
            })?;

        // 4-byte header length (little-endian), header, payload
        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + data.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(data);
        Ok(output)
    }

    fn decode(&self, raw: &[u8]) -> Option<Vec<u8>> {
        if raw.len() < 4 {
            return None;
        }
        let header_len = u32::from_le_bytes(raw[..4].try_into().ok()?) as usize;
        let header_end = 4usize.checked_add(header_len)?;
        if raw.len() < header_end {
            return None;
        }

        let (header, read): (BlobHeader, usize) = bincode::serde::decode_from_slice(
            &raw[4..header_end],
            bincode::config::standard(),
        )
        .ok()?;
        if read != header_len
            || header.magic != BLOB_MAGIC
            || header.format_version != BLOB_FORMAT_VERSION
            || header.producer_version != self.producer_version
        {
            return None;
        }

        let payload = &raw[header_end..];
        if ContentHash::from_bytes(payload) != header.checksum {
            return None;
        }
        Some(payload.to_vec())
    }

    /// Removes blobs whose fingerprint is not in `live_keys`, along with
    /// temp files left by interrupted writes of other processes.
    ///
    /// Other files are left alone. Returns the number of files removed.
    pub fn gc(&self, live_keys: &[ContentHash]) -> Result<usize, BlobError> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let live: Vec<String> = live_keys.iter().map(ContentHash::to_string).collect();

        let mut removed = 0;
        let entries = std::fs::read_dir(&self.dir).map_err(|e| BlobError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| BlobError::Io {
                path: self.dir.clone(),
                source: e,
            })?;
            let path = entry.path();
            let stale = match path.extension().and_then(|e| e.to_str()) {
                Some(BLOB_EXT) => path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|stem| !live.iter().any(|k| k == stem)),
                Some(TEMP_EXT) => !is_own_temp(&path),
                _ => false,
            };
            if stale {
                std::fs::remove_file(&path).map_err(|e| BlobError::Io {
                    path: path.clone(),
                    source: e,
                })?;
                removed += 1;
            }
        }
        tracing::debug!(dir = %self.dir.display(), removed, "blob store gc");
        Ok(removed)
    }
}

/// Whether a temp file was named by this process, whose writes may still be
/// in flight.
fn is_own_temp(path: &Path) -> bool {
    let pid = std::process::id().to_string();
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').nth(1))
        .is_some_and(|p| p == pid)
}

impl BlobStore for FileBlobStore {
    fn load(&self, key: &ContentHash) -> Option<Vec<u8>> {
        let path = self.blob_path(key);
        let raw = std::fs::read(&path).ok()?;
        let payload = self.decode(&raw);
        if payload.is_none() {
            tracing::debug!(path = %path.display(), "discarding unreadable blob");
        }
        payload
    }

    fn store(&self, key: &ContentHash, data: &[u8]) -> Result<(), BlobError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| BlobError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        let output = self.encode(data)?;

        let path = self.blob_path(key);
        let serial = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let temp = self
            .dir
            .join(format!("{key}.{}.{serial}.{TEMP_EXT}", std::process::id()));
        if let Err(e) = std::fs::write(&temp, &output) {
            let _ = std::fs::remove_file(&temp);
            return Err(BlobError::Io {
                path: temp,
                source: e,
            });
        }
        std::fs::rename(&temp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&temp);
            BlobError::Io { path, source: e }
        })
    }
}
