//! The backend device interface.
//!
//! A device owns native shader-module objects. It exposes two destruction
//! paths with different preconditions:
//!
//! - [`Device::destroy_shader_module`] frees an object immediately. Only valid
//!   for objects that were never referenced by submitted GPU work, such as the
//!   loser of a cache insertion race.
//! - [`Device::defer_destroy_shader_module`] queues an object until all work
//!   submitted so far has completed. Used for everything that was published
//!   through the cache.

use kiln_config::{Limits, Toggles};
use std::fmt;

/// Opaque handle to a native shader-module object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeModuleHandle(u64);

impl NativeModuleHandle {
    /// Wraps a raw device-assigned value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NativeModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// A failure creating a native object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The device cannot hold another module.
    #[error("out of device memory: {live} shader modules live, budget is {budget}")]
    OutOfMemory {
        /// Modules alive at the time of the request, pending deletions included.
        live: usize,
        /// Configured budget.
        budget: usize,
    },

    /// The device rejected the binary.
    #[error("device rejected shader binary: {0}")]
    InvalidBinary(String),

    /// The device is no longer usable.
    #[error("device lost")]
    Lost,
}

/// A backend device that creates and destroys native shader modules.
///
/// Implementations must be usable from many threads at once.
pub trait Device: Send + Sync {
    /// Human-readable device name.
    fn name(&self) -> &str;

    /// Feature toggles that shape compilation.
    fn toggles(&self) -> &Toggles;

    /// Device limits.
    fn limits(&self) -> &Limits;

    /// Creates a native module from an encoded binary.
    fn create_shader_module(
        &self,
        binary: &[u8],
        entry_point: &str,
    ) -> Result<NativeModuleHandle, DeviceError>;

    /// Destroys a module that was never used by submitted work.
    fn destroy_shader_module(&self, handle: NativeModuleHandle);

    /// Destroys a module once all currently submitted work has completed.
    fn defer_destroy_shader_module(&self, handle: NativeModuleHandle);
}
