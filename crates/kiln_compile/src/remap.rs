//! Binding remap construction from reflection and a pipeline layout.

use crate::error::{CompileError, V200, V205};
use crate::layout::{LayoutSlot, PipelineLayout};
use kiln_codegen::BindingRemap;
use kiln_diagnostics::Diagnostic;
use kiln_ir::{BindingKind, BufferBindingType, Resource};

/// The remap for one compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapOutcome {
    /// Source to destination slots, partitioned by kind.
    pub remap: BindingRemap,
    /// At least one input attachment is used.
    pub has_input_attachment: bool,
}

/// Whether a resource declared in the program may bind to a layout entry.
fn kinds_compatible(declared: BindingKind, layout: BindingKind) -> bool {
    use BufferBindingType::*;
    match (declared, layout) {
        (BindingKind::Buffer(d), BindingKind::Buffer(l)) => {
            d == l || (l == InternalStorage && matches!(d, Storage | ReadOnlyStorage))
        }
        (d, l) => d == l,
    }
}

/// Resolves every binding the entry point uses against `layout`.
pub fn build_binding_remap(
    bindings: &[Resource],
    layout: &PipelineLayout,
) -> Result<RemapOutcome, CompileError> {
    let mut outcome = RemapOutcome::default();
    for resource in bindings {
        let point = resource.point();
        let Some(entry) = layout.binding(point) else {
            return Err(CompileError::validation(
                Diagnostic::error(
                    V200,
                    format!("binding '{}' at {point} is not in the pipeline layout", resource.name),
                )
                .with_origin(format!("binding '{}'", resource.name))
                .with_help(format!("add a {} entry at {point} to the layout", resource.kind)),
            ));
        };
        if !kinds_compatible(resource.kind, entry.kind) {
            return Err(CompileError::validation(
                Diagnostic::error(
                    V205,
                    format!(
                        "binding '{}' at {point} is a {} but the layout declares a {}",
                        resource.name, resource.kind, entry.kind
                    ),
                )
                .with_origin(format!("binding '{}'", resource.name)),
            ));
        }

        let remap = &mut outcome.remap;
        let table = match (resource.kind, entry.slot) {
            (BindingKind::ExternalTexture, LayoutSlot::External(slots)) => {
                remap.external_textures.insert(point, slots);
                continue;
            }
            (_, LayoutSlot::External(_)) | (BindingKind::ExternalTexture, LayoutSlot::Single(_)) => {
                return Err(kiln_common::InternalError::new(format!(
                    "layout slot shape for {point} does not match a {}",
                    resource.kind
                ))
                .into());
            }
            (BindingKind::Buffer(BufferBindingType::Uniform), _) => &mut remap.uniform_buffers,
            (
                BindingKind::Buffer(
                    BufferBindingType::Storage
                    | BufferBindingType::ReadOnlyStorage
                    | BufferBindingType::InternalStorage,
                ),
                _,
            ) => &mut remap.storage_buffers,
            (BindingKind::Sampler, _) => &mut remap.samplers,
            (BindingKind::Texture, _) => &mut remap.textures,
            (BindingKind::StorageTexture, _) => &mut remap.storage_textures,
            (BindingKind::InputAttachment, _) => {
                outcome.has_input_attachment = true;
                &mut remap.input_attachments
            }
        };
        if let LayoutSlot::Single(slot) = entry.slot {
            table.insert(point, slot);
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::layout::BindGroupLayoutEntry;
    use kiln_codegen::ExternalTextureSlots;
    use kiln_ir::BindingPoint;

    fn resource(name: &str, group: u32, binding: u32, kind: BindingKind) -> Resource {
        Resource {
            name: name.into(),
            group,
            binding,
            kind,
        }
    }

    fn entry(binding: u32, kind: BindingKind) -> BindGroupLayoutEntry {
        BindGroupLayoutEntry { binding, kind }
    }

    #[test]
    fn uniform_sampler_and_external_texture_give_five_slots() {
        let uniform = BindingKind::Buffer(BufferBindingType::Uniform);
        let layout = PipelineLayout::new(vec![
            vec![entry(0, uniform), entry(1, BindingKind::Sampler)],
            vec![entry(0, BindingKind::ExternalTexture)],
        ])
        .unwrap();
        let bindings = vec![
            resource("params", 0, 0, uniform),
            resource("samp", 0, 1, BindingKind::Sampler),
            resource("video", 1, 0, BindingKind::ExternalTexture),
        ];

        let outcome = build_binding_remap(&bindings, &layout).unwrap();
        assert_eq!(outcome.remap.len(), 5);
        assert!(!outcome.has_input_attachment);
        assert_eq!(outcome.remap.uniform_buffers[&BindingPoint::new(0, 0)], 0);
        assert_eq!(outcome.remap.samplers[&BindingPoint::new(0, 1)], 1);
        assert_eq!(
            outcome.remap.external_textures[&BindingPoint::new(1, 0)],
            ExternalTextureSlots {
                plane0: 2,
                plane1: 3,
                metadata: 4
            }
        );
        let mut slots = outcome.remap.destination_slots();
        slots.sort_unstable();
        assert_eq!(slots, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn input_attachment_sets_flag() {
        let layout =
            PipelineLayout::new(vec![vec![entry(3, BindingKind::InputAttachment)]]).unwrap();
        let outcome = build_binding_remap(
            &[resource("color", 0, 3, BindingKind::InputAttachment)],
            &layout,
        )
        .unwrap();
        assert!(outcome.has_input_attachment);
        assert_eq!(outcome.remap.input_attachments.len(), 1);
    }

    #[test]
    fn missing_binding_is_validation_error() {
        let layout = PipelineLayout::new(vec![vec![]]).unwrap();
        let err = build_binding_remap(&[resource("tex", 0, 0, BindingKind::Texture)], &layout)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.diagnostic().unwrap().code, V200);
    }

    #[test]
    fn kind_mismatch_is_validation_error() {
        let layout = PipelineLayout::new(vec![vec![entry(0, BindingKind::Sampler)]]).unwrap();
        let err = build_binding_remap(&[resource("tex", 0, 0, BindingKind::Texture)], &layout)
            .unwrap_err();
        assert_eq!(err.diagnostic().unwrap().code, V205);
    }

    #[test]
    fn internal_storage_layout_accepts_storage_buffers() {
        let layout = PipelineLayout::new(vec![vec![entry(
            0,
            BindingKind::Buffer(BufferBindingType::InternalStorage),
        )]])
        .unwrap();
        let outcome = build_binding_remap(
            &[resource(
                "data",
                0,
                0,
                BindingKind::Buffer(BufferBindingType::ReadOnlyStorage),
            )],
            &layout,
        )
        .unwrap();
        assert_eq!(outcome.remap.storage_buffers.len(), 1);
    }

    #[test]
    fn read_only_declaration_does_not_match_uniform_layout() {
        let layout = PipelineLayout::new(vec![vec![entry(
            0,
            BindingKind::Buffer(BufferBindingType::Uniform),
        )]])
        .unwrap();
        assert!(build_binding_remap(
            &[resource(
                "data",
                0,
                0,
                BindingKind::Buffer(BufferBindingType::ReadOnlyStorage)
            )],
            &layout
        )
        .is_err());
    }
}
