//! Request fingerprints and the blob-store payload format.

use kiln_codegen::GeneratorOptions;
use kiln_common::{ContentHash, ContentHasher, InternalError, KilnResult};
use kiln_config::{Limits, Toggles};
use kiln_ir::{OverrideId, ShaderStage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bumped whenever the fingerprint layout or payload format changes.
const FINGERPRINT_VERSION: u32 = 1;

/// Everything that determines the output of a compilation.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintInputs<'a> {
    /// Content hash of the whole program.
    pub program: &'a ContentHash,
    /// Requested stage.
    pub stage: ShaderStage,
    /// Requested entry point, as named in the program.
    pub entry_point: &'a str,
    /// Resolved override values.
    pub overrides: &'a BTreeMap<OverrideId, f64>,
    /// Device toggles.
    pub toggles: &'a Toggles,
    /// Device limits.
    pub limits: &'a Limits,
    /// Required full-subgroup size.
    pub max_subgroup_size_for_full_subgroups: Option<u32>,
    /// Generator options, remap included.
    pub generator: &'a GeneratorOptions,
}

/// Hashes every input of a compilation into one fingerprint.
pub fn request_fingerprint(inputs: &FingerprintInputs<'_>) -> ContentHash {
    let mut hasher = ContentHasher::new();
    hasher
        .write_u32(FINGERPRINT_VERSION)
        .write_hash(inputs.program)
        .write_str(&inputs.stage.to_string())
        .write_str(inputs.entry_point)
        .write_u64(inputs.overrides.len() as u64);
    for (id, value) in inputs.overrides {
        hasher.write_u32(id.as_raw()).write_f64(*value);
    }

    let t = inputs.toggles;
    hasher
        .write_bool(t.disable_symbol_renaming)
        .write_bool(t.use_lowered_ir)
        .write_bool(t.validate_output)
        .write_bool(t.robust_buffer_access)
        .write_bool(t.zero_initialize_workgroup_memory)
        .write_bool(t.pass_matrix_by_pointer)
        .write_bool(t.subgroup_uniform_control_flow);

    let l = inputs.limits;
    hasher
        .write_u32(l.min_subgroup_size)
        .write_u32(l.max_subgroup_size)
        .write_u32(l.max_compute_workgroup_size_x)
        .write_u32(l.max_compute_workgroup_size_y)
        .write_u32(l.max_compute_workgroup_size_z)
        .write_u32(l.max_compute_invocations_per_workgroup);

    match inputs.max_subgroup_size_for_full_subgroups {
        Some(size) => hasher.write_bool(true).write_u32(size),
        None => hasher.write_bool(false),
    };
    inputs.generator.hash_into(&mut hasher);
    hasher.finish()
}

/// A compiled binary as stored in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedBinary {
    /// Encoded native binary.
    pub binary: Vec<u8>,
    /// Entry point name inside the binary.
    pub remapped_entry_point: String,
}

impl CachedBinary {
    /// Serializes for storage.
    pub fn to_bytes(&self) -> KilnResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| InternalError::new(format!("failed to encode cached binary: {e}")))
    }

    /// Deserializes a stored blob. Anything malformed is `None`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (cached, read): (CachedBinary, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard()).ok()?;
        (read == bytes.len() && !cached.remapped_entry_point.is_empty()).then_some(cached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint(overrides: &BTreeMap<OverrideId, f64>, generator: &GeneratorOptions) -> ContentHash {
        let program = ContentHash::from_bytes(b"program");
        request_fingerprint(&FingerprintInputs {
            program: &program,
            stage: ShaderStage::Compute,
            entry_point: "main",
            overrides,
            toggles: &Toggles::default(),
            limits: &Limits::default(),
            max_subgroup_size_for_full_subgroups: None,
            generator,
        })
    }

    #[test]
    fn stable_for_identical_inputs() {
        let overrides = BTreeMap::from([(OverrideId::from_raw(0), 2.0)]);
        let generator = GeneratorOptions::default();
        assert_eq!(
            fingerprint(&overrides, &generator),
            fingerprint(&overrides, &generator)
        );
    }

    #[test]
    fn override_values_change_fingerprint() {
        let generator = GeneratorOptions::default();
        let a = BTreeMap::from([(OverrideId::from_raw(0), 2.0)]);
        let b = BTreeMap::from([(OverrideId::from_raw(0), 3.0)]);
        assert_ne!(fingerprint(&a, &generator), fingerprint(&b, &generator));
    }

    #[test]
    fn generator_options_change_fingerprint() {
        let overrides = BTreeMap::new();
        let plain = GeneratorOptions::default();
        let lowered = GeneratorOptions {
            use_lowered_ir: true,
            ..GeneratorOptions::default()
        };
        assert_ne!(fingerprint(&overrides, &plain), fingerprint(&overrides, &lowered));
    }

    #[test]
    fn cached_binary_rejects_garbage() {
        let cached = CachedBinary {
            binary: vec![1, 2, 3],
            remapped_entry_point: "sym_0".into(),
        };
        let bytes = cached.to_bytes().unwrap();
        assert_eq!(CachedBinary::from_bytes(&bytes), Some(cached));
        assert_eq!(CachedBinary::from_bytes(&bytes[..bytes.len() - 1]), None);
        assert_eq!(CachedBinary::from_bytes(b""), None);
    }
}
