//! Configuration types deserialized from `kiln.toml`.

use serde::{Deserialize, Serialize};

/// The top-level configuration parsed from `kiln.toml`.
///
/// Every section is optional; an empty file yields the defaults of a
/// conservative software device with output validation enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct KilnConfig {
    /// Backend device selection and resource budget.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Device-wide feature toggles that steer transforms and code generation.
    #[serde(default)]
    pub toggles: Toggles,
    /// Device limits consulted by stage validation.
    #[serde(default)]
    pub limits: Limits,
    /// Persistent blob-store settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Backend device settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Human-readable device label used in logs.
    pub name: String,
    /// Maximum number of live native shader modules before creation fails
    /// with out-of-memory. `None` means unbounded.
    pub max_live_modules: Option<usize>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "software".to_string(),
            max_live_modules: None,
        }
    }
}

/// Device-wide toggles.
///
/// These are fixed for the lifetime of a device, so they participate in the
/// persistent fingerprint but not in the per-module cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Toggles {
    /// Skip the symbol-renaming transform; entry points keep their names.
    pub disable_symbol_renaming: bool,
    /// Generate through the flat lowered instruction form instead of
    /// encoding the structured program directly.
    pub use_lowered_ir: bool,
    /// Decode and check every generated binary before handing it to the device.
    pub validate_output: bool,
    /// Emit bounds-checked resource accesses.
    pub robust_buffer_access: bool,
    /// Zero-initialize workgroup memory in compute prologues.
    pub zero_initialize_workgroup_memory: bool,
    /// Pass matrix arguments by pointer rather than by value.
    pub pass_matrix_by_pointer: bool,
    /// Mark generated code as requiring subgroup-uniform control flow.
    pub subgroup_uniform_control_flow: bool,
}

impl Default for Toggles {
    fn default() -> Self {
        Self {
            disable_symbol_renaming: false,
            use_lowered_ir: true,
            validate_output: true,
            robust_buffer_access: true,
            zero_initialize_workgroup_memory: true,
            pass_matrix_by_pointer: false,
            subgroup_uniform_control_flow: false,
        }
    }
}

/// Device limits relevant to shader compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    /// Smallest subgroup size the device may run with.
    pub min_subgroup_size: u32,
    /// Largest subgroup size the device may run with.
    pub max_subgroup_size: u32,
    /// Maximum compute workgroup size in x.
    pub max_compute_workgroup_size_x: u32,
    /// Maximum compute workgroup size in y.
    pub max_compute_workgroup_size_y: u32,
    /// Maximum compute workgroup size in z.
    pub max_compute_workgroup_size_z: u32,
    /// Maximum product of the three workgroup dimensions.
    pub max_compute_invocations_per_workgroup: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_subgroup_size: 4,
            max_subgroup_size: 64,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_compute_invocations_per_workgroup: 256,
        }
    }
}

/// Persistent blob-store settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Directory for persisted compilation results. When absent, only an
    /// in-memory store is used.
    pub blob_dir: Option<String>,
}
