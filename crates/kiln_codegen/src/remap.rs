//! Source-to-destination binding remapping.

use kiln_common::ContentHasher;
use kiln_ir::BindingPoint;
use std::collections::BTreeMap;

/// Destination slots of one external texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternalTextureSlots {
    /// First plane (luma or RGBA).
    pub plane0: u32,
    /// Second plane (chroma), bound to a placeholder for single-plane sources.
    pub plane1: u32,
    /// Uniform buffer with conversion parameters.
    pub metadata: u32,
}

/// Where one source binding lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemapTarget {
    /// A single destination slot.
    Slot(u32),
    /// The three slots of an expanded external texture.
    External(ExternalTextureSlots),
}

impl RemapTarget {
    /// Returns every destination slot, in plane0, plane1, metadata order for
    /// external textures.
    pub fn slots(&self) -> Vec<u32> {
        match *self {
            RemapTarget::Slot(slot) => vec![slot],
            RemapTarget::External(e) => vec![e.plane0, e.plane1, e.metadata],
        }
    }
}

/// Per-compilation table from source (group, binding) to destination slot,
/// partitioned by binding kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingRemap {
    /// Uniform buffers.
    pub uniform_buffers: BTreeMap<BindingPoint, u32>,
    /// Storage buffers of every flavor.
    pub storage_buffers: BTreeMap<BindingPoint, u32>,
    /// Samplers.
    pub samplers: BTreeMap<BindingPoint, u32>,
    /// Sampled textures.
    pub textures: BTreeMap<BindingPoint, u32>,
    /// Storage textures.
    pub storage_textures: BTreeMap<BindingPoint, u32>,
    /// Input attachments.
    pub input_attachments: BTreeMap<BindingPoint, u32>,
    /// External textures, each expanded to three slots.
    pub external_textures: BTreeMap<BindingPoint, ExternalTextureSlots>,
}

impl BindingRemap {
    /// Returns the number of destination slots. External textures count
    /// three each.
    pub fn len(&self) -> usize {
        self.uniform_buffers.len()
            + self.storage_buffers.len()
            + self.samplers.len()
            + self.textures.len()
            + self.storage_textures.len()
            + self.input_attachments.len()
            + 3 * self.external_textures.len()
    }

    /// Returns `true` if nothing is remapped.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn single_slot_tables(&self) -> [&BTreeMap<BindingPoint, u32>; 6] {
        [
            &self.uniform_buffers,
            &self.storage_buffers,
            &self.samplers,
            &self.textures,
            &self.storage_textures,
            &self.input_attachments,
        ]
    }

    /// Returns where `point` is remapped to, searching every partition.
    pub fn target(&self, point: BindingPoint) -> Option<RemapTarget> {
        if let Some(external) = self.external_textures.get(&point) {
            return Some(RemapTarget::External(*external));
        }
        self.single_slot_tables()
            .into_iter()
            .find_map(|table| table.get(&point).copied())
            .map(RemapTarget::Slot)
    }

    /// Returns every destination slot in ascending order.
    pub fn destination_slots(&self) -> Vec<u32> {
        let mut slots: Vec<u32> = self
            .single_slot_tables()
            .into_iter()
            .flat_map(|table| table.values().copied())
            .chain(
                self.external_textures
                    .values()
                    .flat_map(|e| [e.plane0, e.plane1, e.metadata]),
            )
            .collect();
        slots.sort_unstable();
        slots
    }

    /// Feeds the table into a fingerprint, partition by partition.
    pub fn hash_into(&self, hasher: &mut ContentHasher) {
        for (tag, table) in ["ub", "sb", "smp", "tex", "stex", "ia"]
            .into_iter()
            .zip(self.single_slot_tables())
        {
            hasher.write_str(tag).write_u64(table.len() as u64);
            for (point, slot) in table {
                hasher
                    .write_u32(point.group)
                    .write_u32(point.binding)
                    .write_u32(*slot);
            }
        }
        hasher
            .write_str("ext")
            .write_u64(self.external_textures.len() as u64);
        for (point, e) in &self.external_textures {
            hasher
                .write_u32(point.group)
                .write_u32(point.binding)
                .write_u32(e.plane0)
                .write_u32(e.plane1)
                .write_u32(e.metadata);
        }
    }
}
