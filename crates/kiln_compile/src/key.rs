//! Cache keys for compiled variants.

use crate::layout::LayoutId;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Pipeline-overridable constant values supplied by a programmable stage,
/// keyed by override name (or by numeric id written as a decimal string).
///
/// Values compare bit-for-bit, so `0.0` and `-0.0` are different constants
/// and a NaN equals itself.
#[derive(Debug, Clone, Default)]
pub struct OverrideConstants(BTreeMap<String, f64>);

impl OverrideConstants {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a constant, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) -> Option<f64> {
        self.0.insert(name.into(), value)
    }

    /// Looks up a constant.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Iterates in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of constants.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no constant is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for OverrideConstants {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(&other.0)
                .all(|((ka, va), (kb, vb))| ka == kb && va.to_bits() == vb.to_bits())
    }
}

impl Eq for OverrideConstants {}

impl Hash for OverrideConstants {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.0.len());
        for (name, value) in &self.0 {
            name.hash(state);
            value.to_bits().hash(state);
        }
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for OverrideConstants {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Identifies one compiled variant of a shader module.
///
/// The stage is not part of the key: an entry point name determines its
/// stage. Fragment-depth clamping is not part of the key either; callers
/// pass the same value for a given layout and entry point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Identity of the pipeline layout.
    pub layout: LayoutId,
    /// Requested entry point, as named in the program.
    pub entry_point: String,
    /// Supplied override constants.
    pub overrides: OverrideConstants,
    /// Subgroup size every workgroup must be a multiple of, if required.
    pub max_subgroup_size_for_full_subgroups: Option<u32>,
    /// Whether vertex shaders write point size.
    pub emit_point_size: bool,
}
