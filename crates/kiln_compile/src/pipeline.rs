//! The transform pipeline: one compilation request to one native module.
//!
//! Each call is independent. The only state it touches is the optional blob
//! store and the device, which creates the native object at the end.

use crate::device::{Device, NativeModuleHandle};
use crate::error::{CompileError, V201, V202, V203, V204, V207, W200};
use crate::fingerprint::{request_fingerprint, CachedBinary, FingerprintInputs};
use crate::key::OverrideConstants;
use crate::layout::PipelineLayout;
use crate::remap::{build_binding_remap, RemapOutcome};
use kiln_blob::BlobStore;
use kiln_codegen::{generate, validate_binary, GeneratorOptions};
use kiln_common::{ContentHash, InternalError};
use kiln_config::{Limits, Toggles};
use kiln_diagnostics::{Diagnostic, DiagnosticSink};
use kiln_ir::{
    entry_point_metadata, EntryPoint, EntryPointMetadata, IrError, Override, OverrideId,
    Program, ShaderStage,
};
use kiln_transform::{
    Manager, Renamer, SingleEntryPoint, SubstituteOverride, SubstituteOverrideConfig,
    TransformError,
};
use std::collections::BTreeMap;

/// Collaborators a compilation runs against.
#[derive(Clone, Copy)]
pub struct CompileContext<'a> {
    /// Device that supplies toggles and limits and creates the native object.
    pub device: &'a dyn Device,
    /// Persistent store consulted before transforms run.
    pub blob_store: Option<&'a dyn BlobStore>,
    /// Receives non-fatal diagnostics.
    pub diagnostics: &'a DiagnosticSink,
}

/// The per-variant inputs of a compilation.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    /// Stage the pipeline uses the entry point for.
    pub stage: ShaderStage,
    /// Entry point, as named in the program.
    pub entry_point: &'a str,
    /// Override constants supplied by the programmable stage.
    pub constants: &'a OverrideConstants,
    /// Pipeline layout providing destination slots.
    pub layout: &'a PipelineLayout,
    /// Clamp fragment depth writes to `[0, 1]`.
    pub clamp_frag_depth: bool,
    /// Write point size in vertex shaders.
    pub emit_point_size: bool,
    /// Subgroup size the workgroup width must be a multiple of.
    pub max_subgroup_size_for_full_subgroups: Option<u32>,
}

/// A freshly compiled variant, not yet owned by any cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledVariant {
    /// Native module created by the device.
    pub handle: NativeModuleHandle,
    /// Encoded binary.
    pub binary: Vec<u8>,
    /// Entry point name inside the binary.
    pub remapped_entry_point: String,
    /// The entry point uses an input attachment.
    pub has_input_attachment: bool,
}

/// Compiles one variant of `program` and creates its native module.
///
/// `program_hash` must be `program.content_hash()`; callers compute it once
/// per program.
pub fn compile_variant(
    ctx: &CompileContext<'_>,
    program: &Program,
    program_hash: &ContentHash,
    request: &CompileRequest<'_>,
) -> Result<CompiledVariant, CompileError> {
    let _span = tracing::debug_span!(
        "compile_variant",
        entry_point = request.entry_point,
        stage = %request.stage
    )
    .entered();

    let metadata = entry_point_metadata(program, request.entry_point).map_err(|e| match e {
        IrError::EntryPointNotFound(name) => TransformError::EntryPointNotFound(name).into(),
        other => CompileError::from(other),
    })?;
    if metadata.stage != request.stage {
        return Err(CompileError::validation(
            Diagnostic::error(
                V204,
                format!(
                    "entry point '{}' is a {} shader, not a {} shader",
                    request.entry_point, metadata.stage, request.stage
                ),
            )
            .with_origin(format!("entry point '{}'", request.entry_point)),
        ));
    }

    let RemapOutcome {
        remap,
        has_input_attachment,
    } = build_binding_remap(&metadata.bindings, request.layout)?;

    let substitutions = if metadata.has_overrides() {
        resolve_overrides(program, request.constants)?
    } else {
        BTreeMap::new()
    };

    let toggles = ctx.device.toggles();
    let limits = ctx.device.limits();
    let options = GeneratorOptions {
        remap,
        clamp_frag_depth: request.clamp_frag_depth,
        emit_point_size: request.emit_point_size,
        robust_buffer_access: toggles.robust_buffer_access,
        zero_initialize_workgroup_memory: toggles.zero_initialize_workgroup_memory,
        pass_matrix_by_pointer: toggles.pass_matrix_by_pointer,
        subgroup_uniform_control_flow: toggles.subgroup_uniform_control_flow,
        use_lowered_ir: toggles.use_lowered_ir,
    };

    let fingerprint = request_fingerprint(&FingerprintInputs {
        program: program_hash,
        stage: request.stage,
        entry_point: request.entry_point,
        overrides: &substitutions,
        toggles,
        limits,
        max_subgroup_size_for_full_subgroups: request.max_subgroup_size_for_full_subgroups,
        generator: &options,
    });

    let cached = ctx
        .blob_store
        .and_then(|store| store.load(&fingerprint))
        .and_then(|bytes| {
            let decoded = CachedBinary::from_bytes(&bytes);
            if decoded.is_none() {
                tracing::debug!(%fingerprint, "discarding malformed cached binary");
            }
            decoded
        });

    let CachedBinary {
        binary,
        remapped_entry_point,
    } = match cached {
        Some(hit) => {
            tracing::debug!(%fingerprint, "blob store hit");
            hit
        }
        None => {
            if ctx.blob_store.is_some() {
                tracing::debug!(%fingerprint, "blob store miss");
            }
            let produced = produce_binary(
                program,
                request,
                &metadata,
                substitutions,
                &options,
                toggles,
                limits,
            )?;
            if let Some(store) = ctx.blob_store {
                write_back(ctx.diagnostics, store, &fingerprint, &produced);
            }
            tracing::info!(
                entry_point = request.entry_point,
                remapped = %produced.remapped_entry_point,
                bytes = produced.binary.len(),
                "compiled shader variant"
            );
            produced
        }
    };

    let handle = ctx
        .device
        .create_shader_module(&binary, &remapped_entry_point)?;
    Ok(CompiledVariant {
        handle,
        binary,
        remapped_entry_point,
        has_input_attachment,
    })
}

/// Maps supplied constants to override ids. Keys are override names or
/// decimal override ids.
fn resolve_overrides(
    program: &Program,
    constants: &OverrideConstants,
) -> Result<BTreeMap<OverrideId, f64>, CompileError> {
    let mut values = BTreeMap::new();
    for (key, value) in constants.iter() {
        let Some(declared) = declared_override(program, key) else {
            return Err(CompileError::validation(
                Diagnostic::error(V203, format!("override '{key}' is not declared by the program"))
                    .with_origin(format!("override '{key}'")),
            ));
        };
        if values.insert(declared.id, value).is_some() {
            return Err(CompileError::validation(
                Diagnostic::error(
                    V207,
                    format!("override '{}' is already initialized", declared.name),
                )
                .with_origin(format!("override '{key}'")),
            ));
        }
    }
    Ok(values)
}

/// Finds the override a constant key names, by name or by decimal id.
fn declared_override<'p>(program: &'p Program, key: &str) -> Option<&'p Override> {
    program.override_named(key).or_else(|| {
        let id = key.parse::<u32>().ok()?;
        program.overrides.iter().find(|o| o.id.as_raw() == id)
    })
}

/// Rewrites id-keyed constants to the declared override names.
///
/// Sets that name one override twice, or name undeclared overrides, are
/// returned unchanged so the pipeline can report them.
pub(crate) fn canonical_constants(
    program: &Program,
    constants: &OverrideConstants,
) -> OverrideConstants {
    let mut canonical = OverrideConstants::new();
    for (key, value) in constants.iter() {
        let Some(declared) = declared_override(program, key) else {
            return constants.clone();
        };
        if canonical.insert(declared.name.as_str(), value).is_some() {
            return constants.clone();
        }
    }
    canonical
}

/// Steps that a blob-store hit skips: transforms, name resolution,
/// stage validation, generation, and output validation.
fn produce_binary(
    program: &Program,
    request: &CompileRequest<'_>,
    metadata: &EntryPointMetadata,
    substitutions: BTreeMap<OverrideId, f64>,
    options: &GeneratorOptions,
    toggles: &Toggles,
    limits: &Limits,
) -> Result<CachedBinary, CompileError> {
    let mut manager = Manager::new();
    manager.add(SingleEntryPoint::new(request.entry_point));
    if !toggles.disable_symbol_renaming {
        manager.add(Renamer);
    }
    if metadata.has_overrides() {
        manager.add(SubstituteOverride::new(SubstituteOverrideConfig {
            values: substitutions,
        }));
    }
    tracing::trace!(transforms = ?manager.names(), "running transforms");
    let (transformed, outputs) = manager.run(program.clone())?;

    let remapped_entry_point = if toggles.disable_symbol_renaming {
        request.entry_point.to_string()
    } else {
        outputs
            .renamed(request.entry_point)
            .ok_or_else(|| {
                InternalError::new(format!(
                    "renamer produced no name for entry point '{}'",
                    request.entry_point
                ))
            })?
            .to_string()
    };

    if request.stage == ShaderStage::Compute {
        let entry = transformed.entry_point(&remapped_entry_point).ok_or_else(|| {
            InternalError::new(format!(
                "entry point '{remapped_entry_point}' missing after transforms"
            ))
        })?;
        validate_workgroup_size(
            request.entry_point,
            entry,
            limits,
            request.max_subgroup_size_for_full_subgroups,
        )?;
    }

    let generated = generate(&transformed, options)?;
    if generated.entry_point != remapped_entry_point {
        return Err(InternalError::new(format!(
            "generator emitted entry point '{}', expected '{remapped_entry_point}'",
            generated.entry_point
        ))
        .into());
    }

    if toggles.validate_output {
        validate_binary(&generated.bytes)
            .map_err(|e| CompileError::OutputValidation(e.to_diagnostic(request.entry_point)))?;
    }

    Ok(CachedBinary {
        binary: generated.bytes,
        remapped_entry_point,
    })
}

/// Checks a transformed compute entry point against device limits and the
/// full-subgroup requirement.
fn validate_workgroup_size(
    name: &str,
    entry: &EntryPoint,
    limits: &Limits,
    full_subgroups: Option<u32>,
) -> Result<(), CompileError> {
    let origin = format!("entry point '{name}'");
    let dims = entry
        .workgroup_size
        .as_ref()
        .ok_or_else(|| InternalError::new(format!("compute entry point '{name}' has no workgroup size")))?;
    let mut size = [0u32; 3];
    for (out, dim) in size.iter_mut().zip(dims) {
        *out = dim.as_const().ok_or_else(|| {
            InternalError::new(format!("workgroup size of '{name}' still refers to an override"))
        })?;
    }
    let [x, y, z] = size;

    let max = [
        limits.max_compute_workgroup_size_x,
        limits.max_compute_workgroup_size_y,
        limits.max_compute_workgroup_size_z,
    ];
    if size.contains(&0) || size.iter().zip(&max).any(|(s, m)| s > m) {
        return Err(CompileError::validation(
            Diagnostic::error(
                V202,
                format!(
                    "workgroup size ({x}, {y}, {z}) is outside the device limits ({}, {}, {})",
                    max[0], max[1], max[2]
                ),
            )
            .with_origin(origin),
        ));
    }
    let invocations = u64::from(x) * u64::from(y) * u64::from(z);
    if invocations > u64::from(limits.max_compute_invocations_per_workgroup) {
        return Err(CompileError::validation(
            Diagnostic::error(
                V202,
                format!(
                    "workgroup has {invocations} invocations, more than the limit of {}",
                    limits.max_compute_invocations_per_workgroup
                ),
            )
            .with_origin(origin),
        ));
    }

    if let Some(subgroup) = full_subgroups {
        if subgroup == 0 || x % subgroup != 0 {
            return Err(CompileError::validation(
                Diagnostic::error(
                    V201,
                    format!(
                        "workgroup size x ({x}) is not a multiple of the required subgroup size {subgroup}"
                    ),
                )
                .with_origin(origin)
                .with_note("full subgroups were requested for this pipeline"),
            ));
        }
    }
    Ok(())
}

/// Stores a produced binary. Failures become warnings.
fn write_back(
    diagnostics: &DiagnosticSink,
    store: &dyn BlobStore,
    fingerprint: &ContentHash,
    produced: &CachedBinary,
) {
    let result = produced
        .to_bytes()
        .map_err(|e| e.to_string())
        .and_then(|bytes| store.store(fingerprint, &bytes).map_err(|e| e.to_string()));
    if let Err(reason) = result {
        tracing::warn!(%fingerprint, %reason, "failed to write compiled binary to blob store");
        diagnostics.emit(
            Diagnostic::warning(W200, format!("compiled binary was not cached: {reason}"))
                .with_origin(format!("entry point '{}'", produced.remapped_entry_point)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::layout::BindGroupLayoutEntry;
    use crate::software::SoftwareDevice;
    use kiln_blob::{BlobError, MemoryBlobStore};
    use kiln_codegen::ShaderBinary;
    use kiln_ir::{
        BindingKind, BufferBindingType, Builtin, Expr, Override, Resource, ScalarType, Stmt,
        WorkgroupDim,
    };

    fn compute_program(width: WorkgroupDim) -> Program {
        Program {
            overrides: vec![
                Override {
                    id: OverrideId::from_raw(0),
                    name: "scale".into(),
                    ty: ScalarType::F32,
                    default: None,
                },
                Override {
                    id: OverrideId::from_raw(1),
                    name: "width".into(),
                    ty: ScalarType::U32,
                    default: Some(64.0),
                },
            ],
            resources: vec![Resource {
                name: "out".into(),
                group: 0,
                binding: 0,
                kind: BindingKind::Buffer(BufferBindingType::Storage),
            }],
            functions: vec![],
            entry_points: vec![EntryPoint {
                name: "main".into(),
                stage: ShaderStage::Compute,
                workgroup_size: Some([width, WorkgroupDim::Const(1), WorkgroupDim::Const(1)]),
                body: vec![Stmt::Store {
                    resource: "out".into(),
                    index: Expr::Builtin(Builtin::GlobalInvocationIndex),
                    value: Expr::override_ref("scale"),
                }],
            }],
        }
    }

    fn layout() -> PipelineLayout {
        PipelineLayout::new(vec![vec![BindGroupLayoutEntry {
            binding: 0,
            kind: BindingKind::Buffer(BufferBindingType::Storage),
        }]])
        .unwrap()
    }

    fn device() -> SoftwareDevice {
        SoftwareDevice::new("test", Toggles::default(), Limits::default())
    }

    fn compile(
        device: &SoftwareDevice,
        blob_store: Option<&dyn BlobStore>,
        sink: &DiagnosticSink,
        program: &Program,
        constants: &OverrideConstants,
        full_subgroups: Option<u32>,
    ) -> Result<CompiledVariant, CompileError> {
        let layout = layout();
        let ctx = CompileContext {
            device,
            blob_store,
            diagnostics: sink,
        };
        let hash = program.content_hash().unwrap();
        compile_variant(
            &ctx,
            program,
            &hash,
            &CompileRequest {
                stage: ShaderStage::Compute,
                entry_point: "main",
                constants,
                layout: &layout,
                clamp_frag_depth: false,
                emit_point_size: false,
                max_subgroup_size_for_full_subgroups: full_subgroups,
            },
        )
    }

    fn scale(value: f64) -> OverrideConstants {
        [("scale", value)].into_iter().collect()
    }

    #[test]
    fn compiles_and_creates_module() {
        let device = device();
        let sink = DiagnosticSink::new();
        let program = compute_program(WorkgroupDim::Const(64));
        let variant = compile(&device, None, &sink, &program, &scale(2.0), None).unwrap();
        assert!(device.is_live(variant.handle));
        assert_ne!(variant.remapped_entry_point, "main");
        assert!(!variant.has_input_attachment);
        let binary = ShaderBinary::decode(&variant.binary).unwrap();
        assert_eq!(binary.entry_point, variant.remapped_entry_point);
        assert_eq!(binary.workgroup_size, Some([64, 1, 1]));
    }

    #[test]
    fn renaming_can_be_disabled() {
        let toggles = Toggles {
            disable_symbol_renaming: true,
            ..Toggles::default()
        };
        let device = SoftwareDevice::new("test", toggles, Limits::default());
        let sink = DiagnosticSink::new();
        let program = compute_program(WorkgroupDim::Const(64));
        let variant = compile(&device, None, &sink, &program, &scale(1.0), None).unwrap();
        assert_eq!(variant.remapped_entry_point, "main");
    }

    #[test]
    fn half_subgroup_width_fails_full_subgroup_requirement() {
        let device = device();
        let sink = DiagnosticSink::new();
        let max = Limits::default().max_subgroup_size;

        let narrow = compute_program(WorkgroupDim::Const(max / 2));
        let err = compile(&device, None, &sink, &narrow, &scale(1.0), Some(max)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.diagnostic().unwrap().code, V201);

        let exact = compute_program(WorkgroupDim::Const(max));
        assert!(compile(&device, None, &sink, &exact, &scale(1.0), Some(max)).is_ok());
    }

    #[test]
    fn workgroup_width_from_override_is_validated_after_substitution() {
        let device = device();
        let sink = DiagnosticSink::new();
        let program = compute_program(WorkgroupDim::Override("width".into()));

        let mut constants = scale(1.0);
        constants.insert("width", 48.0);
        let err = compile(&device, None, &sink, &program, &constants, Some(32)).unwrap_err();
        assert_eq!(err.diagnostic().unwrap().code, V201);

        // Default width of 64 is a multiple of 32.
        assert!(compile(&device, None, &sink, &program, &scale(1.0), Some(32)).is_ok());
    }

    #[test]
    fn oversized_workgroup_rejected() {
        let device = device();
        let sink = DiagnosticSink::new();
        let program = compute_program(WorkgroupDim::Const(1024));
        let err = compile(&device, None, &sink, &program, &scale(1.0), None).unwrap_err();
        assert_eq!(err.diagnostic().unwrap().code, V202);
    }

    #[test]
    fn unknown_override_name_rejected() {
        let device = device();
        let sink = DiagnosticSink::new();
        let program = compute_program(WorkgroupDim::Const(64));
        let mut constants = scale(1.0);
        constants.insert("gain", 1.0);
        let err = compile(&device, None, &sink, &program, &constants, None).unwrap_err();
        assert_eq!(err.diagnostic().unwrap().code, V203);
    }

    #[test]
    fn overrides_accept_numeric_ids() {
        let device = device();
        let sink = DiagnosticSink::new();
        let program = compute_program(WorkgroupDim::Const(64));
        let by_id: OverrideConstants = [("0", 2.0)].into_iter().collect();
        let a = compile(&device, None, &sink, &program, &by_id, None).unwrap();
        let b = compile(&device, None, &sink, &program, &scale(2.0), None).unwrap();
        assert_eq!(a.binary, b.binary);
    }

    #[test]
    fn override_named_twice_rejected() {
        let device = device();
        let sink = DiagnosticSink::new();
        let program = compute_program(WorkgroupDim::Const(64));
        let mut constants = scale(2.0);
        constants.insert("0", 3.0);
        let err = compile(&device, None, &sink, &program, &constants, None).unwrap_err();
        let diag = err.diagnostic().unwrap();
        assert_eq!(diag.code, V207);
        assert!(diag.message.contains("'scale' is already initialized"));
        assert_eq!(device.stats().created, 0);
    }

    #[test]
    fn id_keys_canonicalize_to_names() {
        let program = compute_program(WorkgroupDim::Const(64));
        let by_id: OverrideConstants = [("0", 2.0)].into_iter().collect();
        assert_eq!(canonical_constants(&program, &by_id), scale(2.0));

        let mut both = scale(2.0);
        both.insert("0", 3.0);
        assert_eq!(canonical_constants(&program, &both), both);

        let unknown: OverrideConstants = [("7", 1.0)].into_iter().collect();
        assert_eq!(canonical_constants(&program, &unknown), unknown);
    }

    #[test]
    fn missing_override_value_rejected() {
        let device = device();
        let sink = DiagnosticSink::new();
        let program = compute_program(WorkgroupDim::Const(64));
        let err = compile(&device, None, &sink, &program, &OverrideConstants::new(), None)
            .unwrap_err();
        assert_eq!(err.diagnostic().unwrap().code.to_string(), "V211");
    }

    #[test]
    fn stage_mismatch_rejected() {
        let device = device();
        let sink = DiagnosticSink::new();
        let program = compute_program(WorkgroupDim::Const(64));
        let layout = layout();
        let constants = scale(1.0);
        let ctx = CompileContext {
            device: &device,
            blob_store: None,
            diagnostics: &sink,
        };
        let err = compile_variant(
            &ctx,
            &program,
            &program.content_hash().unwrap(),
            &CompileRequest {
                stage: ShaderStage::Fragment,
                entry_point: "main",
                constants: &constants,
                layout: &layout,
                clamp_frag_depth: false,
                emit_point_size: false,
                max_subgroup_size_for_full_subgroups: None,
            },
        )
        .unwrap_err();
        assert_eq!(err.diagnostic().unwrap().code, V204);
    }

    #[test]
    fn unknown_entry_point_rejected() {
        let device = device();
        let sink = DiagnosticSink::new();
        let mut program = compute_program(WorkgroupDim::Const(64));
        program.entry_points[0].name = "other".into();
        let err = compile(&device, None, &sink, &program, &scale(1.0), None).unwrap_err();
        assert_eq!(err.diagnostic().unwrap().code.to_string(), "V210");
    }

    #[test]
    fn device_failure_is_device_error() {
        let device = device().with_module_budget(Some(0));
        let sink = DiagnosticSink::new();
        let program = compute_program(WorkgroupDim::Const(64));
        let err = compile(&device, None, &sink, &program, &scale(1.0), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Device);
    }

    #[test]
    fn blob_store_hit_reuses_binary() {
        let device = device();
        let sink = DiagnosticSink::new();
        let store = MemoryBlobStore::new();
        let program = compute_program(WorkgroupDim::Const(64));

        let first = compile(&device, Some(&store), &sink, &program, &scale(2.0), None).unwrap();
        assert_eq!((store.misses(), store.stores()), (1, 1));
        let second = compile(&device, Some(&store), &sink, &program, &scale(2.0), None).unwrap();
        assert_eq!(store.hits(), 1);
        assert_eq!(first.binary, second.binary);
        assert_eq!(first.remapped_entry_point, second.remapped_entry_point);
        assert_ne!(first.handle, second.handle);

        compile(&device, Some(&store), &sink, &program, &scale(3.0), None).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn corrupt_blob_is_a_miss() {
        let device = device();
        let sink = DiagnosticSink::new();
        let store = MemoryBlobStore::new();
        let program = compute_program(WorkgroupDim::Const(64));

        let first = compile(&device, Some(&store), &sink, &program, &scale(2.0), None).unwrap();
        for key in store.keys() {
            assert!(store.replace(&key, b"garbage".to_vec()));
        }

        let second = compile(&device, Some(&store), &sink, &program, &scale(2.0), None).unwrap();
        assert_eq!(first.binary, second.binary);
        assert_eq!(store.stores(), 2);
    }

    struct FailingStore;

    impl BlobStore for FailingStore {
        fn load(&self, _key: &ContentHash) -> Option<Vec<u8>> {
            None
        }

        fn store(&self, _key: &ContentHash, _data: &[u8]) -> Result<(), BlobError> {
            Err(BlobError::Serialization {
                reason: "disk full".into(),
            })
        }
    }

    #[test]
    fn blob_write_failure_is_a_warning() {
        let device = device();
        let sink = DiagnosticSink::new();
        let program = compute_program(WorkgroupDim::Const(64));
        let variant = compile(&device, Some(&FailingStore), &sink, &program, &scale(1.0), None);
        assert!(variant.is_ok());
        let diags = sink.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, W200);
        assert!(!sink.has_errors());
    }
}
