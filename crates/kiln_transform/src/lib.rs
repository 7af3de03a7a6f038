//! Program-to-program transforms applied before binary generation.
//!
//! A [`Manager`] runs an ordered list of [`Transform`]s over a
//! [`Program`](kiln_ir::Program). Order matters: [`SingleEntryPoint`]
//! isolates the requested entry point first, [`Renamer`] then gives every
//! symbol a fresh name, and [`SubstituteOverride`] finally folds override
//! constants into literals by override id.
//!
//! ```ignore
//! let mut manager = Manager::new();
//! manager
//!     .add(SingleEntryPoint::new("main"))
//!     .add(Renamer)
//!     .add(SubstituteOverride::new(config));
//! let (program, outputs) = manager.run(program)?;
//! let entry = outputs.renamed("main");
//! ```

#![warn(missing_docs)]

pub mod errors;
pub mod manager;
pub mod renamer;
pub mod single_entry_point;
pub mod substitute_override;

pub use errors::TransformError;
pub use manager::{Manager, Transform, TransformOutputs};
pub use renamer::Renamer;
pub use single_entry_point::SingleEntryPoint;
pub use substitute_override::{SubstituteOverride, SubstituteOverrideConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_ir::{
        BinaryOp, EntryPoint, Expr, Function, Literal, Override, OverrideId, Program, ScalarType,
        ShaderStage, Stmt, WorkgroupDim,
    };

    fn program() -> Program {
        Program {
            overrides: vec![
                Override {
                    id: OverrideId::from_raw(0),
                    name: "bias".into(),
                    ty: ScalarType::F32,
                    default: None,
                },
                Override {
                    id: OverrideId::from_raw(1),
                    name: "other_bias".into(),
                    ty: ScalarType::F32,
                    default: None,
                },
            ],
            resources: vec![],
            functions: vec![Function {
                name: "shade".into(),
                params: vec!["x".into()],
                body: vec![Stmt::Return {
                    value: Some(Expr::binary(
                        BinaryOp::Add,
                        Expr::local("x"),
                        Expr::override_ref("bias"),
                    )),
                }],
            }],
            entry_points: vec![
                EntryPoint {
                    name: "main".into(),
                    stage: ShaderStage::Vertex,
                    workgroup_size: None,
                    body: vec![Stmt::WriteBuiltin {
                        builtin: kiln_ir::Builtin::Position,
                        value: Expr::call("shade", vec![Expr::f32(1.0)]),
                    }],
                },
                EntryPoint {
                    name: "other".into(),
                    stage: ShaderStage::Compute,
                    workgroup_size: Some([
                        WorkgroupDim::Const(8),
                        WorkgroupDim::Const(8),
                        WorkgroupDim::Const(1),
                    ]),
                    body: vec![Stmt::Let {
                        name: "b".into(),
                        value: Expr::override_ref("other_bias"),
                    }],
                },
            ],
        }
    }

    #[test]
    fn full_sequence_isolates_renames_and_substitutes() {
        let mut config = SubstituteOverrideConfig::default();
        config.values.insert(OverrideId::from_raw(0), 0.25);

        let mut manager = Manager::new();
        manager
            .add(SingleEntryPoint::new("main"))
            .add(Renamer)
            .add(SubstituteOverride::new(config));
        let (out, outputs) = manager.run(program()).unwrap();

        let renamed = outputs.renamed("main").unwrap();
        assert_eq!(out.entry_points.len(), 1);
        assert_eq!(out.entry_points[0].name, renamed);
        assert!(out.overrides.is_empty());
        assert_eq!(out.validate(), Ok(()));

        let Stmt::Return { value: Some(Expr::Binary { rhs, .. }) } = &out.functions[0].body[0]
        else {
            panic!("unexpected function body");
        };
        assert_eq!(**rhs, Expr::Literal(Literal::F32(0.25)));
    }

    #[test]
    fn isolation_drops_overrides_of_other_entry_points() {
        // `other_bias` has no value, but `main` never uses it.
        let mut config = SubstituteOverrideConfig::default();
        config.values.insert(OverrideId::from_raw(0), 1.0);
        let mut manager = Manager::new();
        manager
            .add(SingleEntryPoint::new("main"))
            .add(SubstituteOverride::new(config));
        assert!(manager.run(program()).is_ok());
    }
}
