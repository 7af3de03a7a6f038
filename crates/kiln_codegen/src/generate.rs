//! Binary generation from a fully transformed program.

use crate::binary::{BoundResource, Code, CodegenFlags, ShaderBinary};
use crate::error::GenerateError;
use crate::lower::{lower, LowerOptions};
use crate::remap::{BindingRemap, RemapTarget};
use kiln_common::ContentHasher;
use kiln_ir::{BinaryOp, BindingKind, Builtin, Expr, Program, ShaderStage, Stmt, WorkgroupDim};

/// Options controlling [`generate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratorOptions {
    /// Destination slots for every resource the program uses.
    pub remap: BindingRemap,
    /// Clamp fragment depth writes to `[0, 1]`.
    pub clamp_frag_depth: bool,
    /// Write a point size of 1.0 at the start of vertex entry points.
    pub emit_point_size: bool,
    /// Bounds-check resource accesses.
    pub robust_buffer_access: bool,
    /// Zero workgroup memory before compute entry points run.
    pub zero_initialize_workgroup_memory: bool,
    /// Pass matrices by pointer.
    pub pass_matrix_by_pointer: bool,
    /// Require subgroup-uniform control flow.
    pub subgroup_uniform_control_flow: bool,
    /// Emit the lowered stack-machine form instead of structured code.
    pub use_lowered_ir: bool,
}

impl GeneratorOptions {
    /// Feeds every option into a fingerprint.
    pub fn hash_into(&self, hasher: &mut ContentHasher) {
        self.remap.hash_into(hasher);
        hasher
            .write_bool(self.clamp_frag_depth)
            .write_bool(self.emit_point_size)
            .write_bool(self.robust_buffer_access)
            .write_bool(self.zero_initialize_workgroup_memory)
            .write_bool(self.pass_matrix_by_pointer)
            .write_bool(self.subgroup_uniform_control_flow)
            .write_bool(self.use_lowered_ir);
    }
}

/// An encoded module and the entry point name inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedBinary {
    /// Container bytes.
    pub bytes: Vec<u8>,
    /// Entry point name as emitted.
    pub entry_point: String,
}

/// Generates a native binary.
///
/// The program must hold exactly one entry point and no overrides, and every
/// resource must have a remap entry of the right shape.
pub fn generate(
    program: &Program,
    options: &GeneratorOptions,
) -> Result<GeneratedBinary, GenerateError> {
    let [entry] = program.entry_points.as_slice() else {
        return Err(GenerateError::EntryPointCount(program.entry_points.len()));
    };
    if let Some(o) = program.overrides.first() {
        return Err(GenerateError::UnresolvedOverride(o.name.clone()));
    }

    let workgroup_size = match &entry.workgroup_size {
        None => None,
        Some(dims) => {
            let mut fixed = [0u32; 3];
            for (out, dim) in fixed.iter_mut().zip(dims) {
                *out = match dim {
                    WorkgroupDim::Const(v) => *v,
                    WorkgroupDim::Override(name) => {
                        return Err(GenerateError::UnresolvedOverride(name.clone()))
                    }
                };
            }
            Some(fixed)
        }
    };

    let bindings = program
        .resources
        .iter()
        .map(|r| {
            let target =
                options
                    .remap
                    .target(r.point())
                    .ok_or_else(|| GenerateError::MissingRemap {
                        name: r.name.clone(),
                        point: r.point(),
                    })?;
            let expanded = matches!(target, RemapTarget::External(_));
            if expanded != (r.kind == BindingKind::ExternalTexture) {
                return Err(GenerateError::RemapKindMismatch {
                    name: r.name.clone(),
                    kind: r.kind,
                });
            }
            Ok(BoundResource {
                name: r.name.clone(),
                kind: r.kind,
                slots: target.slots(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let clamp = options.clamp_frag_depth && entry.stage == ShaderStage::Fragment;
    let mut functions = program.functions.clone();
    let mut entry_body = entry.body.clone();
    if clamp {
        for body in functions
            .iter_mut()
            .map(|f| &mut f.body)
            .chain(std::iter::once(&mut entry_body))
        {
            clamp_frag_depth(body);
        }
    }
    let emit_point_size = options.emit_point_size && entry.stage == ShaderStage::Vertex;
    if emit_point_size {
        entry_body.insert(
            0,
            Stmt::WriteBuiltin {
                builtin: Builtin::PointSize,
                value: Expr::f32(1.0),
            },
        );
    }

    let zero_init =
        options.zero_initialize_workgroup_memory && entry.stage == ShaderStage::Compute;
    let code = if options.use_lowered_ir {
        let names: Vec<String> = bindings.iter().map(|b| b.name.clone()).collect();
        Code::Lowered(lower(
            &functions,
            &entry.name,
            &entry_body,
            &names,
            LowerOptions {
                robust_buffer_access: options.robust_buffer_access,
                zero_initialize_workgroup_memory: zero_init,
            },
        )?)
    } else {
        Code::Structured {
            functions,
            entry: entry_body,
        }
    };

    let binary = ShaderBinary {
        stage: entry.stage,
        entry_point: entry.name.clone(),
        workgroup_size,
        flags: CodegenFlags {
            robust_buffer_access: options.robust_buffer_access,
            zero_initialize_workgroup_memory: zero_init,
            pass_matrix_by_pointer: options.pass_matrix_by_pointer,
            subgroup_uniform_control_flow: options.subgroup_uniform_control_flow,
            clamp_frag_depth: clamp,
            emit_point_size,
        },
        bindings,
        code,
    };
    let bytes = binary.encode()?;
    tracing::trace!(
        entry_point = %entry.name,
        bytes = bytes.len(),
        lowered = options.use_lowered_ir,
        "generated binary"
    );
    Ok(GeneratedBinary {
        bytes,
        entry_point: entry.name.clone(),
    })
}

/// Wraps every fragment-depth write in `min(max(value, 0.0), 1.0)`.
fn clamp_frag_depth(body: &mut [Stmt]) {
    for stmt in body {
        match stmt {
            Stmt::WriteBuiltin {
                builtin: Builtin::FragDepth,
                value,
            } => {
                let original = std::mem::replace(value, Expr::f32(0.0));
                *value = Expr::binary(
                    BinaryOp::Min,
                    Expr::binary(BinaryOp::Max, original, Expr::f32(0.0)),
                    Expr::f32(1.0),
                );
            }
            Stmt::If {
                then_body,
                else_body,
                ..
            } => {
                clamp_frag_depth(then_body);
                clamp_frag_depth(else_body);
            }
            _ => {}
        }
    }
}
