//! A CPU-side device with a simulated GPU timeline.
//!
//! Submissions are numbered by serial. Deferred deletions are tagged with the
//! serial of the next submission and retired once [`SoftwareDevice::tick`]
//! reports that serial as completed.

use crate::device::{Device, DeviceError, NativeModuleHandle};
use kiln_codegen::binary::check_header;
use kiln_config::{KilnConfig, Limits, Toggles};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// A module held by the device.
#[derive(Debug, Clone)]
struct LiveModule {
    entry_point: String,
    size: usize,
}

#[derive(Debug, Default)]
struct DeviceState {
    live: FxHashMap<NativeModuleHandle, LiveModule>,
    deferred: Vec<(u64, NativeModuleHandle)>,
    next_handle: u64,
    last_submitted: u64,
    completed: u64,
    created: u64,
    destroyed_immediately: u64,
    destroyed_deferred: u64,
}

/// Counters describing the device's module traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Modules created.
    pub created: u64,
    /// Modules destroyed through the immediate path.
    pub destroyed_immediately: u64,
    /// Modules retired through the deferred path.
    pub destroyed_deferred: u64,
    /// Modules currently alive, pending deletions included.
    pub live: usize,
    /// Modules awaiting deferred deletion.
    pub pending_deletion: usize,
}

/// The software backend device.
pub struct SoftwareDevice {
    name: String,
    toggles: Toggles,
    limits: Limits,
    max_live_modules: Option<usize>,
    state: Mutex<DeviceState>,
}

impl SoftwareDevice {
    /// Creates a device with the given toggles and limits and no module budget.
    pub fn new(name: impl Into<String>, toggles: Toggles, limits: Limits) -> Self {
        Self {
            name: name.into(),
            toggles,
            limits,
            max_live_modules: None,
            state: Mutex::new(DeviceState {
                next_handle: 1,
                ..DeviceState::default()
            }),
        }
    }

    /// Creates a device from a loaded configuration.
    pub fn from_config(config: &KilnConfig) -> Self {
        Self::new(config.device.name.clone(), config.toggles, config.limits)
            .with_module_budget(config.device.max_live_modules)
    }

    /// Caps the number of live modules. Creation beyond the cap fails with
    /// [`DeviceError::OutOfMemory`].
    pub fn with_module_budget(mut self, max_live_modules: Option<usize>) -> Self {
        self.max_live_modules = max_live_modules;
        self
    }

    /// Marks all work recorded so far as submitted and returns its serial.
    pub fn submit(&self) -> u64 {
        let mut state = self.state.lock();
        state.last_submitted += 1;
        state.last_submitted
    }

    /// Reports `completed_serial` as finished on the GPU, retiring deferred
    /// deletions that waited on it. Returns the number of modules destroyed.
    pub fn tick(&self, completed_serial: u64) -> usize {
        let mut state = self.state.lock();
        let completed = completed_serial.min(state.last_submitted);
        state.completed = state.completed.max(completed);
        let completed = state.completed;

        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.deferred)
            .into_iter()
            .partition(|(serial, _)| *serial <= completed);
        state.deferred = waiting;
        for (_, handle) in &ready {
            state.live.remove(handle);
        }
        state.destroyed_deferred += ready.len() as u64;
        if !ready.is_empty() {
            tracing::trace!(completed, retired = ready.len(), "retired deferred modules");
        }
        ready.len()
    }

    /// Submits and completes all outstanding work, retiring every deferred
    /// deletion.
    pub fn wait_idle(&self) -> usize {
        let serial = self.submit();
        self.tick(serial)
    }

    /// Returns `true` if the handle refers to a module that has not been
    /// destroyed yet.
    pub fn is_live(&self, handle: NativeModuleHandle) -> bool {
        self.state.lock().live.contains_key(&handle)
    }

    /// Returns `true` if the handle is queued for deferred deletion.
    pub fn is_pending_deletion(&self, handle: NativeModuleHandle) -> bool {
        self.state.lock().deferred.iter().any(|(_, h)| *h == handle)
    }

    /// Entry point name a live module was created with.
    pub fn module_entry_point(&self, handle: NativeModuleHandle) -> Option<String> {
        self.state
            .lock()
            .live
            .get(&handle)
            .map(|m| m.entry_point.clone())
    }

    /// Total binary bytes held by live modules.
    pub fn live_bytes(&self) -> usize {
        self.state.lock().live.values().map(|m| m.size).sum()
    }

    /// Current counters.
    pub fn stats(&self) -> DeviceStats {
        let state = self.state.lock();
        DeviceStats {
            created: state.created,
            destroyed_immediately: state.destroyed_immediately,
            destroyed_deferred: state.destroyed_deferred,
            live: state.live.len(),
            pending_deletion: state.deferred.len(),
        }
    }
}

impl Device for SoftwareDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn toggles(&self) -> &Toggles {
        &self.toggles
    }

    fn limits(&self) -> &Limits {
        &self.limits
    }

    fn create_shader_module(
        &self,
        binary: &[u8],
        entry_point: &str,
    ) -> Result<NativeModuleHandle, DeviceError> {
        check_header(binary).map_err(|e| DeviceError::InvalidBinary(e.to_string()))?;

        let mut state = self.state.lock();
        if let Some(budget) = self.max_live_modules {
            if state.live.len() >= budget {
                return Err(DeviceError::OutOfMemory {
                    live: state.live.len(),
                    budget,
                });
            }
        }
        let handle = NativeModuleHandle::from_raw(state.next_handle);
        state.next_handle += 1;
        state.created += 1;
        state.live.insert(
            handle,
            LiveModule {
                entry_point: entry_point.to_string(),
                size: binary.len(),
            },
        );
        tracing::trace!(%handle, entry_point, "created shader module");
        Ok(handle)
    }

    fn destroy_shader_module(&self, handle: NativeModuleHandle) {
        let mut state = self.state.lock();
        if state.live.remove(&handle).is_some() {
            state.destroyed_immediately += 1;
            tracing::trace!(%handle, "destroyed shader module");
        } else {
            tracing::warn!(%handle, "destroy of unknown shader module");
        }
    }

    fn defer_destroy_shader_module(&self, handle: NativeModuleHandle) {
        let mut state = self.state.lock();
        if !state.live.contains_key(&handle) {
            tracing::warn!(%handle, "deferred destroy of unknown shader module");
            return;
        }
        let serial = state.last_submitted + 1;
        state.deferred.push((serial, handle));
        tracing::trace!(%handle, serial, "queued shader module for deletion");
    }
}
