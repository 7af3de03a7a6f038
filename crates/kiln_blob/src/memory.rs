//! In-process blob store.

use std::sync::atomic::{AtomicU64, Ordering};

use kiln_common::ContentHash;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::BlobError;
use crate::BlobStore;

/// A [`BlobStore`] held in memory, counting hits and misses.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<FxHashMap<ContentHash, Vec<u8>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of loads that found a blob.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of loads that found nothing.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of successful stores.
    pub fn stores(&self) -> u64 {
        self.stores.load(Ordering::Relaxed)
    }

    /// Number of distinct blobs held.
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    /// Returns `true` if no blob is held.
    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }

    /// Fingerprints of every held blob, in no particular order.
    pub fn keys(&self) -> Vec<ContentHash> {
        self.blobs.lock().keys().copied().collect()
    }

    /// Overwrites a stored blob in place, for corrupting entries in tests.
    pub fn replace(&self, key: &ContentHash, data: Vec<u8>) -> bool {
        match self.blobs.lock().get_mut(key) {
            Some(slot) => {
                *slot = data;
                true
            }
            None => false,
        }
    }
}

impl BlobStore for MemoryBlobStore {
    fn load(&self, key: &ContentHash) -> Option<Vec<u8>> {
        let found = self.blobs.lock().get(key).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn store(&self, key: &ContentHash, data: &[u8]) -> Result<(), BlobError> {
        self.blobs.lock().insert(*key, data.to_vec());
        self.stores.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
