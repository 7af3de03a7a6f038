//! Module-scope resource bindings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The flavor of a buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferBindingType {
    /// Read-only uniform buffer.
    Uniform,
    /// Read-write storage buffer.
    Storage,
    /// Read-only storage buffer.
    ReadOnlyStorage,
    /// Storage buffer reserved for implementation-internal use.
    InternalStorage,
}

/// The kind of resource bound at a (group, binding) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// A uniform or storage buffer.
    Buffer(BufferBindingType),
    /// A sampler.
    Sampler,
    /// A sampled texture.
    Texture,
    /// A storage texture.
    StorageTexture,
    /// An external texture, expanded at compile time into two planes and a
    /// metadata buffer.
    ExternalTexture,
    /// A render-pass input attachment.
    InputAttachment,
}

impl BindingKind {
    /// Returns `true` if the resource supports [`Stmt::Store`](crate::Stmt::Store).
    pub fn is_writable(self) -> bool {
        matches!(
            self,
            BindingKind::Buffer(BufferBindingType::Storage | BufferBindingType::InternalStorage)
                | BindingKind::StorageTexture
        )
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BindingKind::Buffer(BufferBindingType::Uniform) => "uniform buffer",
            BindingKind::Buffer(BufferBindingType::Storage) => "storage buffer",
            BindingKind::Buffer(BufferBindingType::ReadOnlyStorage) => "read-only storage buffer",
            BindingKind::Buffer(BufferBindingType::InternalStorage) => "internal storage buffer",
            BindingKind::Sampler => "sampler",
            BindingKind::Texture => "texture",
            BindingKind::StorageTexture => "storage texture",
            BindingKind::ExternalTexture => "external texture",
            BindingKind::InputAttachment => "input attachment",
        };
        f.write_str(text)
    }
}

/// A source-side (group, binding) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BindingPoint {
    /// Bind group index.
    pub group: u32,
    /// Binding index within the group.
    pub binding: u32,
}

impl BindingPoint {
    /// Creates a binding point.
    pub const fn new(group: u32, binding: u32) -> Self {
        Self { group, binding }
    }
}

impl fmt::Display for BindingPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@group({}) @binding({})", self.group, self.binding)
    }
}

/// A module-scope resource variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    /// Module-scope name.
    pub name: String,
    /// Bind group index.
    pub group: u32,
    /// Binding index within the group.
    pub binding: u32,
    /// What is bound.
    pub kind: BindingKind,
}

impl Resource {
    /// Returns the (group, binding) pair of this resource.
    pub fn point(&self) -> BindingPoint {
        BindingPoint::new(self.group, self.binding)
    }
}
