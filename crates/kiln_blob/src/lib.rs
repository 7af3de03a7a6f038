//! Blob stores for compiled shader binaries.
//!
//! A blob store maps a request fingerprint ([`ContentHash`]) to opaque bytes.
//! The compilation pipeline consults it before running transforms and code
//! generation, and writes results back after a miss. Reads are fail-safe: a
//! missing, truncated, or corrupted blob is reported as a miss, never as an
//! error.

#![warn(missing_docs)]

pub mod error;
pub mod file;
pub mod memory;

pub use error::BlobError;
pub use file::FileBlobStore;
pub use memory::MemoryBlobStore;

use kiln_common::ContentHash;

/// A fingerprint-keyed store of opaque bytes, shared between threads.
pub trait BlobStore: Send + Sync {
    /// Returns the bytes stored under `key`, or `None` on any kind of miss.
    fn load(&self, key: &ContentHash) -> Option<Vec<u8>>;

    /// Stores `data` under `key`, replacing any previous value.
    fn store(&self, key: &ContentHash, data: &[u8]) -> Result<(), BlobError>;
}
