//! Shader modules and compiled-variant lookup.

use crate::cache::{CacheEntry, CompiledModuleCache};
use crate::device::Device;
use crate::error::CompileError;
use crate::key::{CacheKey, OverrideConstants};
use crate::layout::PipelineLayout;
use crate::pipeline::{canonical_constants, compile_variant, CompileContext, CompileRequest};
use kiln_blob::BlobStore;
use kiln_common::ContentHash;
use kiln_diagnostics::DiagnosticSink;
use kiln_ir::{Program, ShaderStage};

/// The entry point and constants a pipeline uses from a module.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgrammableStage {
    /// Entry point name.
    pub entry_point: String,
    /// Override constants.
    pub constants: OverrideConstants,
}

impl ProgrammableStage {
    /// A stage with no override constants.
    pub fn new(entry_point: impl Into<String>) -> Self {
        Self {
            entry_point: entry_point.into(),
            constants: OverrideConstants::new(),
        }
    }

    /// Adds an override constant.
    pub fn with_constant(mut self, name: impl Into<String>, value: f64) -> Self {
        self.constants.insert(name, value);
        self
    }
}

/// A validated program and the cache of its compiled variants.
///
/// Safe to share between threads; [`get_compiled_variant`] may be called
/// concurrently for the same or different variants.
///
/// [`get_compiled_variant`]: ShaderModule::get_compiled_variant
pub struct ShaderModule<'d> {
    device: &'d dyn Device,
    blob_store: Option<&'d dyn BlobStore>,
    program: Program,
    program_hash: ContentHash,
    diagnostics: DiagnosticSink,
    cache: CompiledModuleCache<'d>,
}

impl<'d> ShaderModule<'d> {
    /// Validates `program` and creates a module with an empty cache.
    pub fn new(device: &'d dyn Device, program: Program) -> Result<Self, CompileError> {
        program.validate()?;
        let program_hash = program.content_hash()?;
        tracing::debug!(
            program = %program_hash,
            entry_points = program.entry_points.len(),
            "created shader module"
        );
        Ok(Self {
            device,
            blob_store: None,
            program,
            program_hash,
            diagnostics: DiagnosticSink::new(),
            cache: CompiledModuleCache::new(device),
        })
    }

    /// Consults `store` before compiling and writes new binaries back to it.
    pub fn with_blob_store(mut self, store: &'d dyn BlobStore) -> Self {
        self.blob_store = Some(store);
        self
    }

    /// The program.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Content hash of the program.
    pub fn content_hash(&self) -> &ContentHash {
        &self.program_hash
    }

    /// Non-fatal diagnostics emitted while compiling variants.
    pub fn diagnostics(&self) -> &DiagnosticSink {
        &self.diagnostics
    }

    /// The compiled-variant cache.
    pub fn cache(&self) -> &CompiledModuleCache<'d> {
        &self.cache
    }

    /// Returns the compiled variant for a pipeline, compiling it on a miss.
    ///
    /// Failures leave the cache untouched. Concurrent misses on one variant
    /// may each compile; all callers receive the single stored entry.
    pub fn get_compiled_variant(
        &self,
        stage: ShaderStage,
        programmable_stage: &ProgrammableStage,
        layout: &PipelineLayout,
        clamp_frag_depth: bool,
        emit_point_size: bool,
        max_subgroup_size_for_full_subgroups: Option<u32>,
    ) -> Result<CacheEntry, CompileError> {
        let constants = canonical_constants(&self.program, &programmable_stage.constants);
        let key = CacheKey {
            layout: layout.id(),
            entry_point: programmable_stage.entry_point.clone(),
            overrides: constants.clone(),
            max_subgroup_size_for_full_subgroups,
            emit_point_size,
        };
        if let Some(entry) = self.cache.find(&key) {
            tracing::debug!(
                entry_point = %key.entry_point,
                layout = %key.layout,
                "compiled variant cache hit"
            );
            return Ok(entry);
        }
        tracing::debug!(entry_point = %key.entry_point, "compiled variant cache miss");

        let ctx = CompileContext {
            device: self.device,
            blob_store: self.blob_store,
            diagnostics: &self.diagnostics,
        };
        let request = CompileRequest {
            stage,
            entry_point: &programmable_stage.entry_point,
            constants: &constants,
            layout,
            clamp_frag_depth,
            emit_point_size,
            max_subgroup_size_for_full_subgroups,
        };
        let variant = compile_variant(&ctx, &self.program, &self.program_hash, &request)?;
        Ok(self.cache.add_or_get(key, variant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::layout::BindGroupLayoutEntry;
    use crate::software::SoftwareDevice;
    use kiln_config::{Limits, Toggles};
    use kiln_ir::{
        BindingKind, BufferBindingType, Builtin, EntryPoint, Expr, Override, OverrideId, Resource,
        ScalarType, Stmt,
    };

    fn program() -> Program {
        Program {
            overrides: vec![Override {
                id: OverrideId::from_raw(0),
                name: "scale".into(),
                ty: ScalarType::F32,
                default: Some(1.0),
            }],
            resources: vec![Resource {
                name: "params".into(),
                group: 0,
                binding: 0,
                kind: BindingKind::Buffer(BufferBindingType::Uniform),
            }],
            functions: vec![],
            entry_points: vec![EntryPoint {
                name: "main".into(),
                stage: ShaderStage::Vertex,
                workgroup_size: None,
                body: vec![Stmt::WriteBuiltin {
                    builtin: Builtin::Position,
                    value: Expr::binary(
                        kiln_ir::BinaryOp::Mul,
                        Expr::load("params", Expr::u32(0)),
                        Expr::override_ref("scale"),
                    ),
                }],
            }],
        }
    }

    fn layout() -> PipelineLayout {
        PipelineLayout::new(vec![vec![BindGroupLayoutEntry {
            binding: 0,
            kind: BindingKind::Buffer(BufferBindingType::Uniform),
        }]])
        .unwrap()
    }

    fn device() -> SoftwareDevice {
        SoftwareDevice::new("test", Toggles::default(), Limits::default())
    }

    fn get(
        module: &ShaderModule<'_>,
        stage: &ProgrammableStage,
        layout: &PipelineLayout,
    ) -> Result<CacheEntry, CompileError> {
        module.get_compiled_variant(ShaderStage::Vertex, stage, layout, false, false, None)
    }

    #[test]
    fn second_call_is_a_cache_hit() {
        let device = device();
        let module = ShaderModule::new(&device, program()).unwrap();
        let layout = layout();
        let stage = ProgrammableStage::new("main").with_constant("scale", 2.0);

        let first = get(&module, &stage, &layout).unwrap();
        let second = get(&module, &stage, &layout).unwrap();
        assert_eq!(first, second);
        assert_eq!(device.stats().created, 1);
        assert_eq!(module.cache().stats().hits, 1);
    }

    #[test]
    fn override_id_and_name_share_one_entry() {
        let device = device();
        let module = ShaderModule::new(&device, program()).unwrap();
        let layout = layout();
        let named = ProgrammableStage::new("main").with_constant("scale", 2.0);
        let numbered = ProgrammableStage::new("main").with_constant("0", 2.0);
        let by_name = get(&module, &named, &layout).unwrap();
        let by_id = get(&module, &numbered, &layout).unwrap();
        assert_eq!(by_name, by_id);
        assert_eq!(module.cache().len(), 1);
        assert_eq!(device.stats().created, 1);

        let conflicting = ProgrammableStage::new("main")
            .with_constant("scale", 2.0)
            .with_constant("0", 3.0);
        let err = get(&module, &conflicting, &layout).unwrap_err();
        assert_eq!(err.diagnostic().unwrap().code.to_string(), "V207");
        assert_eq!(module.cache().len(), 1);
    }

    #[test]
    fn distinct_layout_objects_are_distinct_variants() {
        let device = device();
        let module = ShaderModule::new(&device, program()).unwrap();
        let stage = ProgrammableStage::new("main");
        let a = get(&module, &stage, &layout()).unwrap();
        let b = get(&module, &stage, &layout()).unwrap();
        assert_ne!(a.handle, b.handle);
        assert_eq!(a.binary, b.binary);
        assert_eq!(module.cache().len(), 2);
    }

    #[test]
    fn failures_do_not_touch_the_cache() {
        let device = device();
        let module = ShaderModule::new(&device, program()).unwrap();
        let err = get(&module, &ProgrammableStage::new("missing"), &layout()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(module.cache().is_empty());
        assert_eq!(device.stats().created, 0);
    }

    #[test]
    fn malformed_program_rejected() {
        let device = device();
        let mut bad = program();
        bad.entry_points[0].body.push(Stmt::Call {
            function: "nowhere".into(),
            args: vec![],
        });
        let err = ShaderModule::new(&device, bad).err().unwrap();
        assert_eq!(err.diagnostic().unwrap().code.to_string(), "V206");
    }

    #[test]
    fn point_size_variant_is_separate() {
        let device = device();
        let module = ShaderModule::new(&device, program()).unwrap();
        let layout = layout();
        let stage = ProgrammableStage::new("main");
        let plain = module
            .get_compiled_variant(ShaderStage::Vertex, &stage, &layout, false, false, None)
            .unwrap();
        let with_point_size = module
            .get_compiled_variant(ShaderStage::Vertex, &stage, &layout, false, true, None)
            .unwrap();
        assert_ne!(plain.binary, with_point_size.binary);
    }

    #[test]
    fn dropping_module_defers_all_modules() {
        let device = device();
        {
            let module = ShaderModule::new(&device, program()).unwrap();
            let layout = layout();
            for scale in [1.0, 2.0, 3.0] {
                let stage = ProgrammableStage::new("main").with_constant("scale", scale);
                get(&module, &stage, &layout).unwrap();
            }
        }
        assert_eq!(device.stats().pending_deletion, 3);
        assert_eq!(device.wait_idle(), 3);
        assert_eq!(device.stats().live, 0);
    }
}
