//! Error types for blob store operations.

use std::path::PathBuf;

/// Errors from writing or maintaining a blob store.
///
/// Reads never fail; these only surface from [`BlobStore::store`] and
/// maintenance such as [`FileBlobStore::gc`].
///
/// [`BlobStore::store`]: crate::BlobStore::store
/// [`FileBlobStore::gc`]: crate::FileBlobStore::gc
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// An I/O error occurred while reading or writing blob files.
    #[error("blob store I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A blob header could not be serialized.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}
