//! The concurrent compiled-module cache.
//!
//! One mutex guards the map, held only for a lookup or an insert. Compilation
//! happens outside the lock, so two threads missing on the same key both
//! compile; the second insert loses, and its native module is destroyed on
//! the spot. At most one module per key is ever stored.

use crate::device::{Device, NativeModuleHandle};
use crate::key::CacheKey;
use crate::pipeline::CompiledVariant;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A cached variant. Cloning shares the binary and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Native module owned by the cache.
    pub handle: NativeModuleHandle,
    /// Encoded binary.
    pub binary: Arc<[u8]>,
    /// Entry point name inside the binary.
    pub remapped_entry_point: Arc<str>,
    /// The entry point uses an input attachment.
    pub has_input_attachment: bool,
}

impl From<CompiledVariant> for CacheEntry {
    fn from(variant: CompiledVariant) -> Self {
        Self {
            handle: variant.handle,
            binary: variant.binary.into(),
            remapped_entry_point: variant.remapped_entry_point.into(),
            has_input_attachment: variant.has_input_attachment,
        }
    }
}

/// Cache traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Inserts that found an entry already present.
    pub lost_races: u64,
}

/// Compiled variants of one shader module, keyed by [`CacheKey`].
///
/// Borrows the device, which therefore outlives the cache. Dropping the cache
/// hands every stored module to the device's deferred deletion path.
pub struct CompiledModuleCache<'d> {
    device: &'d dyn Device,
    entries: Mutex<FxHashMap<CacheKey, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    lost_races: AtomicU64,
}

impl<'d> CompiledModuleCache<'d> {
    /// Creates an empty cache for modules of `device`.
    pub fn new(device: &'d dyn Device) -> Self {
        Self {
            device,
            entries: Mutex::new(FxHashMap::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            lost_races: AtomicU64::new(0),
        }
    }

    /// Looks up a variant.
    pub fn find(&self, key: &CacheKey) -> Option<CacheEntry> {
        let found = self.entries.lock().get(key).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Inserts `variant` unless `key` is already present, and returns the
    /// stored entry.
    ///
    /// When an entry already exists, the variant's module is destroyed
    /// immediately. It was never submitted, so the deferred path is not
    /// needed.
    pub fn add_or_get(&self, key: CacheKey, variant: CompiledVariant) -> CacheEntry {
        let candidate = CacheEntry::from(variant);
        let existing = {
            let mut entries = self.entries.lock();
            match entries.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    entries.insert(key, candidate.clone());
                    return candidate;
                }
            }
        };

        self.lost_races.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            entry_point = %key.entry_point,
            loser = %candidate.handle,
            winner = %existing.handle,
            "lost compilation race, destroying duplicate module"
        );
        self.device.destroy_shader_module(candidate.handle);
        existing
    }

    /// Number of stored variants.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            lost_races: self.lost_races.load(Ordering::Relaxed),
        }
    }
}

impl Drop for CompiledModuleCache<'_> {
    fn drop(&mut self) {
        let entries = std::mem::take(self.entries.get_mut());
        tracing::debug!(entries = entries.len(), "tearing down compiled module cache");
        for entry in entries.into_values() {
            self.device.defer_destroy_shader_module(entry.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::OverrideConstants;
    use crate::layout::PipelineLayout;
    use crate::software::SoftwareDevice;
    use kiln_codegen::{Code, CodegenFlags, ShaderBinary};
    use kiln_config::{Limits, Toggles};
    use kiln_ir::ShaderStage;

    fn device() -> SoftwareDevice {
        SoftwareDevice::new("test", Toggles::default(), Limits::default())
    }

    fn variant(device: &SoftwareDevice, name: &str) -> CompiledVariant {
        let binary = ShaderBinary {
            stage: ShaderStage::Fragment,
            entry_point: name.into(),
            workgroup_size: None,
            flags: CodegenFlags::default(),
            bindings: vec![],
            code: Code::Structured {
                functions: vec![],
                entry: vec![],
            },
        }
        .encode()
        .unwrap();
        let handle = device.create_shader_module(&binary, name).unwrap();
        CompiledVariant {
            handle,
            binary,
            remapped_entry_point: name.into(),
            has_input_attachment: false,
        }
    }

    fn key(layout: &PipelineLayout, scale: f64) -> CacheKey {
        CacheKey {
            layout: layout.id(),
            entry_point: "main".into(),
            overrides: [("scale", scale)].into_iter().collect::<OverrideConstants>(),
            max_subgroup_size_for_full_subgroups: None,
            emit_point_size: false,
        }
    }

    #[test]
    fn find_after_add_returns_entry() {
        let device = device();
        let layout = PipelineLayout::new(vec![]).unwrap();
        let cache = CompiledModuleCache::new(&device);
        assert!(cache.find(&key(&layout, 1.0)).is_none());

        let stored = cache.add_or_get(key(&layout, 1.0), variant(&device, "sym_0"));
        assert_eq!(cache.find(&key(&layout, 1.0)), Some(stored));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                lost_races: 0
            }
        );
    }

    #[test]
    fn loser_is_destroyed_immediately() {
        let device = device();
        let layout = PipelineLayout::new(vec![]).unwrap();
        let cache = CompiledModuleCache::new(&device);

        let first = variant(&device, "sym_0");
        let second = variant(&device, "sym_0");
        let loser = second.handle;

        let a = cache.add_or_get(key(&layout, 1.0), first);
        let b = cache.add_or_get(key(&layout, 1.0), second);
        assert_eq!(a, b);
        assert!(!device.is_live(loser));
        assert!(!device.is_pending_deletion(loser));
        assert!(device.is_live(a.handle));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().lost_races, 1);
    }

    #[test]
    fn distinct_keys_coexist() {
        let device = device();
        let layout = PipelineLayout::new(vec![]).unwrap();
        let cache = CompiledModuleCache::new(&device);
        let a = cache.add_or_get(key(&layout, 2.0), variant(&device, "a"));
        let b = cache.add_or_get(key(&layout, 3.0), variant(&device, "b"));
        assert_ne!(a.handle, b.handle);
        assert_eq!(cache.find(&key(&layout, 2.0)).unwrap().handle, a.handle);
        assert_eq!(cache.find(&key(&layout, 3.0)).unwrap().handle, b.handle);
    }

    #[test]
    fn drop_defers_destruction() {
        let device = device();
        let layout = PipelineLayout::new(vec![]).unwrap();
        let handle = {
            let cache = CompiledModuleCache::new(&device);
            cache.add_or_get(key(&layout, 1.0), variant(&device, "m")).handle
        };
        assert!(device.is_live(handle));
        assert!(device.is_pending_deletion(handle));
        device.wait_idle();
        assert!(!device.is_live(handle));
        assert_eq!(device.stats().destroyed_deferred, 1);
    }

    #[test]
    fn entries_share_payload() {
        let device = device();
        let layout = PipelineLayout::new(vec![]).unwrap();
        let cache = CompiledModuleCache::new(&device);
        let stored = cache.add_or_get(key(&layout, 1.0), variant(&device, "m"));
        let found = cache.find(&key(&layout, 1.0)).unwrap();
        assert!(Arc::ptr_eq(&stored.binary, &found.binary));
        assert!(Arc::ptr_eq(&stored.remapped_entry_point, &found.remapped_entry_point));
    }

    #[test]
    fn concurrent_inserts_keep_one_module() {
        let device = device();
        let layout = PipelineLayout::new(vec![]).unwrap();
        let cache = CompiledModuleCache::new(&device);
        let entries: Vec<CacheEntry> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        let v = variant(&device, "m");
                        cache.add_or_get(key(&layout, 1.0), v)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let winner = entries[0].handle;
        assert!(entries.iter().all(|e| e.handle == winner));
        assert_eq!(device.stats().live, 1);
        assert_eq!(device.stats().destroyed_immediately, 7);
    }
}
