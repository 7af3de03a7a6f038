//! Entry-point isolation.

use crate::errors::TransformError;
use crate::manager::{Transform, TransformOutputs};
use kiln_ir::{entry_point_metadata, IrError, Program};

/// Strips a program down to one entry point and what it reaches.
///
/// Other entry points, unreachable helper functions, and resources and
/// overrides the entry point never touches are removed. Declaration order of
/// the survivors is preserved.
pub struct SingleEntryPoint {
    entry_point: String,
}

impl SingleEntryPoint {
    /// Isolates the entry point named `entry_point`.
    pub fn new(entry_point: impl Into<String>) -> Self {
        Self {
            entry_point: entry_point.into(),
        }
    }
}

impl Transform for SingleEntryPoint {
    fn name(&self) -> &'static str {
        "SingleEntryPoint"
    }

    fn apply(&self, program: Program, _: &mut TransformOutputs) -> Result<Program, TransformError> {
        let meta = entry_point_metadata(&program, &self.entry_point).map_err(|err| match err {
            IrError::EntryPointNotFound(name) => TransformError::EntryPointNotFound(name),
            other => TransformError::Internal {
                transform: self.name(),
                message: other.to_string(),
            },
        })?;

        let Program {
            overrides,
            resources,
            functions,
            entry_points,
        } = program;

        Ok(Program {
            overrides: overrides
                .into_iter()
                .filter(|o| meta.overrides.iter().any(|kept| kept.id == o.id))
                .collect(),
            resources: resources
                .into_iter()
                .filter(|r| meta.bindings.iter().any(|kept| kept.name == r.name))
                .collect(),
            functions: functions
                .into_iter()
                .filter(|f| meta.functions.contains(&f.name))
                .collect(),
            entry_points: entry_points
                .into_iter()
                .filter(|e| e.name == self.entry_point)
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ir::{
        BindingKind, BufferBindingType, EntryPoint, Expr, Function, Override, OverrideId,
        Resource, ScalarType, ShaderStage, Stmt,
    };

    fn program() -> Program {
        Program {
            overrides: vec![
                Override {
                    id: OverrideId::from_raw(0),
                    name: "a".into(),
                    ty: ScalarType::F32,
                    default: None,
                },
                Override {
                    id: OverrideId::from_raw(1),
                    name: "b".into(),
                    ty: ScalarType::F32,
                    default: None,
                },
            ],
            resources: vec![
                Resource {
                    name: "buf_a".into(),
                    group: 0,
                    binding: 0,
                    kind: BindingKind::Buffer(BufferBindingType::Storage),
                },
                Resource {
                    name: "buf_b".into(),
                    group: 0,
                    binding: 1,
                    kind: BindingKind::Buffer(BufferBindingType::Storage),
                },
            ],
            functions: vec![
                Function {
                    name: "helper_a".into(),
                    params: vec![],
                    body: vec![Stmt::Store {
                        resource: "buf_a".into(),
                        index: Expr::u32(0),
                        value: Expr::override_ref("a"),
                    }],
                },
                Function {
                    name: "helper_b".into(),
                    params: vec![],
                    body: vec![Stmt::Store {
                        resource: "buf_b".into(),
                        index: Expr::u32(0),
                        value: Expr::override_ref("b"),
                    }],
                },
            ],
            entry_points: ["a", "b"]
                .into_iter()
                .map(|suffix| EntryPoint {
                    name: format!("main_{suffix}"),
                    stage: ShaderStage::Fragment,
                    workgroup_size: None,
                    body: vec![Stmt::Call {
                        function: format!("helper_{suffix}"),
                        args: vec![],
                    }],
                })
                .collect(),
        }
    }

    #[test]
    fn keeps_only_what_the_entry_point_reaches() {
        let mut outputs = TransformOutputs::default();
        let out = SingleEntryPoint::new("main_b")
            .apply(program(), &mut outputs)
            .unwrap();
        assert_eq!(out.entry_points.len(), 1);
        assert_eq!(out.entry_points[0].name, "main_b");
        assert_eq!(out.functions.len(), 1);
        assert_eq!(out.functions[0].name, "helper_b");
        assert_eq!(out.resources.len(), 1);
        assert_eq!(out.resources[0].name, "buf_b");
        assert_eq!(out.overrides.len(), 1);
        assert_eq!(out.overrides[0].name, "b");
        assert_eq!(out.validate(), Ok(()));
    }

    #[test]
    fn unknown_entry_point() {
        let err = SingleEntryPoint::new("nope")
            .apply(program(), &mut TransformOutputs::default())
            .unwrap_err();
        assert_eq!(err, TransformError::EntryPointNotFound("nope".into()));
    }
}
