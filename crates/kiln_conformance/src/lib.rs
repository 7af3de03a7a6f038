//! Conformance test fixtures for the Kiln compilation cache.
//!
//! Provides sample programs and layouts that exercise the compiled-variant
//! cache end to end (binding remapping, override substitution, workgroup
//! validation, persistence), plus helpers for decoding what the cache hands
//! back, for assertion in integration tests.

#![warn(missing_docs)]

use kiln_codegen::{validate_binary, ShaderBinary};
use kiln_compile::{
    BindGroupLayoutEntry, CacheEntry, CompileError, PipelineLayout, ProgrammableStage,
    ShaderModule, SoftwareDevice,
};
use kiln_config::{KilnConfig, Limits, Toggles};
use kiln_ir::{
    BinaryOp, BindingKind, Builtin, BufferBindingType, EntryPoint, Expr, Override, OverrideId,
    Program, Resource, ScalarType, ShaderStage, Stmt, WorkgroupDim,
};

/// Uniform buffer binding kind.
pub const UNIFORM: BindingKind = BindingKind::Buffer(BufferBindingType::Uniform);

/// Storage buffer binding kind.
pub const STORAGE: BindingKind = BindingKind::Buffer(BufferBindingType::Storage);

/// A software device with default toggles and limits.
pub fn software_device() -> SoftwareDevice {
    SoftwareDevice::from_config(&KilnConfig::default())
}

/// A software device with the given toggles and default limits.
pub fn software_device_with(toggles: Toggles) -> SoftwareDevice {
    SoftwareDevice::new("conformance", toggles, Limits::default())
}

fn resource(name: &str, group: u32, binding: u32, kind: BindingKind) -> Resource {
    Resource {
        name: name.into(),
        group,
        binding,
        kind,
    }
}

fn layout_entry(binding: u32, kind: BindingKind) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry { binding, kind }
}

/// A vertex program whose `main` scales a uniform by the `scale` override
/// (id 0, default 1.0).
pub fn scaled_vertex_program() -> Program {
    Program {
        overrides: vec![Override {
            id: OverrideId::from_raw(0),
            name: "scale".into(),
            ty: ScalarType::F32,
            default: Some(1.0),
        }],
        resources: vec![resource("params", 0, 0, UNIFORM)],
        functions: vec![],
        entry_points: vec![EntryPoint {
            name: "main".into(),
            stage: ShaderStage::Vertex,
            workgroup_size: None,
            body: vec![Stmt::WriteBuiltin {
                builtin: Builtin::Position,
                value: Expr::binary(
                    BinaryOp::Mul,
                    Expr::load("params", Expr::u32(0)),
                    Expr::override_ref("scale"),
                ),
            }],
        }],
    }
}

/// Layout with a single uniform buffer at (0, 0).
pub fn uniform_layout() -> PipelineLayout {
    new_layout(vec![vec![layout_entry(0, UNIFORM)]])
}

/// A fragment program using a uniform at (0, 0), a sampler at (0, 1), and an
/// external texture at (1, 0).
pub fn external_texture_program() -> Program {
    Program {
        overrides: vec![],
        resources: vec![
            resource("params", 0, 0, UNIFORM),
            resource("samp", 0, 1, BindingKind::Sampler),
            resource("video", 1, 0, BindingKind::ExternalTexture),
        ],
        functions: vec![],
        entry_points: vec![EntryPoint {
            name: "main".into(),
            stage: ShaderStage::Fragment,
            workgroup_size: None,
            body: vec![Stmt::WriteBuiltin {
                builtin: Builtin::FragDepth,
                value: Expr::binary(
                    BinaryOp::Add,
                    Expr::binary(
                        BinaryOp::Mul,
                        Expr::load("params", Expr::u32(0)),
                        Expr::load("samp", Expr::u32(0)),
                    ),
                    Expr::load("video", Expr::u32(0)),
                ),
            }],
        }],
    }
}

/// Layout compacting group 0 to `[uniform@0, sampler@1]` and expanding the
/// external texture of group 1 to planes at 2 and 3 with metadata at 4.
pub fn external_texture_layout() -> PipelineLayout {
    new_layout(vec![
        vec![layout_entry(0, UNIFORM), layout_entry(1, BindingKind::Sampler)],
        vec![layout_entry(0, BindingKind::ExternalTexture)],
    ])
}

/// A compute program whose `main` writes the `scale` override into a
/// storage buffer, with workgroup size `(width, 1, 1)`.
pub fn compute_program(width: u32) -> Program {
    Program {
        overrides: vec![Override {
            id: OverrideId::from_raw(0),
            name: "scale".into(),
            ty: ScalarType::F32,
            default: Some(1.0),
        }],
        resources: vec![resource("out", 0, 0, STORAGE)],
        functions: vec![],
        entry_points: vec![EntryPoint {
            name: "main".into(),
            stage: ShaderStage::Compute,
            workgroup_size: Some([
                WorkgroupDim::Const(width),
                WorkgroupDim::Const(1),
                WorkgroupDim::Const(1),
            ]),
            body: vec![Stmt::Store {
                resource: "out".into(),
                index: Expr::Builtin(Builtin::GlobalInvocationIndex),
                value: Expr::override_ref("scale"),
            }],
        }],
    }
}

/// Layout with a single storage buffer at (0, 0).
pub fn storage_layout() -> PipelineLayout {
    new_layout(vec![vec![layout_entry(0, STORAGE)]])
}

fn new_layout(groups: Vec<Vec<BindGroupLayoutEntry>>) -> PipelineLayout {
    match PipelineLayout::new(groups) {
        Ok(layout) => layout,
        Err(e) => panic!("fixture layout is invalid: {e}"),
    }
}

/// `main` with a single override constant.
pub fn main_with(name: &str, value: f64) -> ProgrammableStage {
    ProgrammableStage::new("main").with_constant(name, value)
}

/// Requests a variant with no per-pipeline flags set.
pub fn compile_plain(
    module: &ShaderModule<'_>,
    stage: ShaderStage,
    programmable_stage: &ProgrammableStage,
    layout: &PipelineLayout,
) -> Result<CacheEntry, CompileError> {
    module.get_compiled_variant(stage, programmable_stage, layout, false, false, None)
}

/// Validates and decodes the binary of a cache entry.
pub fn decode(entry: &CacheEntry) -> ShaderBinary {
    match validate_binary(&entry.binary) {
        Ok(binary) => binary,
        Err(e) => panic!("cache returned an invalid binary: {e}"),
    }
}
