//! Pipeline layouts: bind group layouts plus compacted destination slots.
//!
//! Slots are assigned once, at layout creation. Groups are laid out in group
//! order; inside a group, entries are ordered by kind (uniform buffers,
//! storage buffers, read-only storage buffers, samplers, textures, storage
//! textures, input attachments) and then by binding number. External
//! textures come last in their group and take three consecutive slots
//! (plane 0, plane 1, conversion metadata).

use kiln_codegen::ExternalTextureSlots;
use kiln_ir::{BindingKind, BindingPoint, BufferBindingType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LAYOUT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`PipelineLayout`].
///
/// Identities are never reused, so a cache key holding one stays unambiguous
/// after its layout is dropped. Two layouts with identical contents still
/// have different identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayoutId(u64);

impl LayoutId {
    fn fresh() -> Self {
        Self(NEXT_LAYOUT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identity.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LayoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layout#{}", self.0)
    }
}

/// One binding declared by a bind group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindGroupLayoutEntry {
    /// Binding number inside the group.
    pub binding: u32,
    /// Declared kind.
    pub kind: BindingKind,
}

/// Errors constructing a layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// A binding number appears twice in one group.
    #[error("binding {binding} declared twice in group {group}")]
    DuplicateBinding {
        /// Group index.
        group: u32,
        /// Binding number.
        binding: u32,
    },
}

/// Where a layout binding lands in the destination numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutSlot {
    /// A single slot.
    Single(u32),
    /// The three slots of an external texture.
    External(ExternalTextureSlots),
}

/// A resolved layout binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    /// Declared kind.
    pub kind: BindingKind,
    /// Destination slot(s).
    pub slot: LayoutSlot,
}

/// A pipeline layout with a process-unique identity.
#[derive(Debug)]
pub struct PipelineLayout {
    id: LayoutId,
    groups: Vec<Vec<BindGroupLayoutEntry>>,
    bindings: BTreeMap<BindingPoint, LayoutBinding>,
    slot_count: u32,
}

fn kind_rank(kind: BindingKind) -> u8 {
    match kind {
        BindingKind::Buffer(BufferBindingType::Uniform) => 0,
        BindingKind::Buffer(BufferBindingType::Storage | BufferBindingType::InternalStorage) => 1,
        BindingKind::Buffer(BufferBindingType::ReadOnlyStorage) => 2,
        BindingKind::Sampler => 3,
        BindingKind::Texture => 4,
        BindingKind::StorageTexture => 5,
        BindingKind::InputAttachment => 6,
        BindingKind::ExternalTexture => 7,
    }
}

impl PipelineLayout {
    /// Builds a layout from per-group entries, assigning destination slots.
    pub fn new(groups: Vec<Vec<BindGroupLayoutEntry>>) -> Result<Self, LayoutError> {
        let mut bindings = BTreeMap::new();
        let mut next = 0u32;
        for (group, entries) in groups.iter().enumerate() {
            let group = group as u32;
            let mut ordered: Vec<&BindGroupLayoutEntry> = entries.iter().collect();
            ordered.sort_by_key(|e| (kind_rank(e.kind), e.binding));
            for entry in ordered {
                let slot = if entry.kind == BindingKind::ExternalTexture {
                    let slots = ExternalTextureSlots {
                        plane0: next,
                        plane1: next + 1,
                        metadata: next + 2,
                    };
                    next += 3;
                    LayoutSlot::External(slots)
                } else {
                    next += 1;
                    LayoutSlot::Single(next - 1)
                };
                let point = BindingPoint::new(group, entry.binding);
                let resolved = LayoutBinding {
                    kind: entry.kind,
                    slot,
                };
                if bindings.insert(point, resolved).is_some() {
                    return Err(LayoutError::DuplicateBinding {
                        group,
                        binding: entry.binding,
                    });
                }
            }
        }
        Ok(Self {
            id: LayoutId::fresh(),
            groups,
            bindings,
            slot_count: next,
        })
    }

    /// Process-unique identity.
    pub fn id(&self) -> LayoutId {
        self.id
    }

    /// Number of bind groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Entries of one group as declared.
    pub fn group(&self, group: u32) -> Option<&[BindGroupLayoutEntry]> {
        self.groups.get(group as usize).map(Vec::as_slice)
    }

    /// Resolves a source binding point.
    pub fn binding(&self, point: BindingPoint) -> Option<&LayoutBinding> {
        self.bindings.get(&point)
    }

    /// The external-texture expansion of a binding, if it is one.
    pub fn external_texture_expansion(&self, point: BindingPoint) -> Option<ExternalTextureSlots> {
        match self.bindings.get(&point)?.slot {
            LayoutSlot::External(slots) => Some(slots),
            LayoutSlot::Single(_) => None,
        }
    }

    /// Total destination slots, three per external texture.
    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }
}
