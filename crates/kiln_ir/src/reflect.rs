//! Per-entry-point reflection.

use crate::callgraph::CallGraph;
use crate::error::IrError;
use crate::expr::Expr;
use crate::program::{Override, Program, WorkgroupDim};
use crate::resource::{BindingKind, Resource};
use crate::stmt::{walk_block_exprs, Stmt};
use crate::types::ShaderStage;
use std::collections::BTreeSet;

/// What an entry point touches, transitively through its callees.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPointMetadata {
    /// Entry point name.
    pub name: String,
    /// Pipeline stage.
    pub stage: ShaderStage,
    /// Declared workgroup size, for compute entry points.
    pub workgroup_size: Option<[WorkgroupDim; 3]>,
    /// Resources used, ordered by (group, binding).
    pub bindings: Vec<Resource>,
    /// Overrides used, ordered by id. Includes overrides that only size the
    /// workgroup.
    pub overrides: Vec<Override>,
    /// Helper functions reachable from the entry point, in name order.
    pub functions: Vec<String>,
}

impl EntryPointMetadata {
    /// Returns `true` if any override still needs a value.
    pub fn has_overrides(&self) -> bool {
        !self.overrides.is_empty()
    }

    /// Returns `true` if any binding is an input attachment.
    pub fn uses_input_attachment(&self) -> bool {
        self.bindings
            .iter()
            .any(|r| r.kind == BindingKind::InputAttachment)
    }
}

/// Reflects the entry point `name` of `program`.
pub fn entry_point_metadata(program: &Program, name: &str) -> Result<EntryPointMetadata, IrError> {
    let entry = program
        .entry_point(name)
        .ok_or_else(|| IrError::EntryPointNotFound(name.to_string()))?;

    let graph = CallGraph::build(program);
    let mut functions = BTreeSet::new();
    let mut resources = BTreeSet::new();
    let mut overrides = BTreeSet::new();

    let mut scan = |body: &[Stmt]| {
        walk_block_exprs(body, &mut |expr| match expr {
            Expr::Override(o) => {
                overrides.insert(o.clone());
            }
            Expr::Load { resource, .. } => {
                resources.insert(resource.clone());
            }
            _ => {}
        });
        for stmt in body {
            stmt.walk(&mut |s| {
                if let Stmt::Store { resource, .. } = s {
                    resources.insert(resource.clone());
                }
            });
        }
    };

    scan(&entry.body);
    for reached in graph.reachable(name) {
        if let Some(function) = program.function(reached) {
            functions.insert(function.name.clone());
            scan(&function.body);
        }
    }
    if let Some(dims) = &entry.workgroup_size {
        for dim in dims {
            if let WorkgroupDim::Override(o) = dim {
                overrides.insert(o.clone());
            }
        }
    }

    let mut bindings: Vec<Resource> = resources
        .iter()
        .filter_map(|r| program.resource(r).cloned())
        .collect();
    bindings.sort_by_key(Resource::point);
    let mut overrides: Vec<Override> = overrides
        .iter()
        .filter_map(|o| program.override_named(o).cloned())
        .collect();
    overrides.sort_by_key(|o| o.id);

    Ok(EntryPointMetadata {
        name: entry.name.clone(),
        stage: entry.stage,
        workgroup_size: entry.workgroup_size.clone(),
        bindings,
        overrides,
        functions: functions.into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{EntryPoint, Function, OverrideId};
    use crate::resource::BufferBindingType;
    use crate::types::ScalarType;

    fn program() -> Program {
        let resource = |name: &str, group, binding, kind| Resource {
            name: name.into(),
            group,
            binding,
            kind,
        };
        let over = |id, name: &str| Override {
            id: OverrideId::from_raw(id),
            name: name.into(),
            ty: ScalarType::U32,
            default: None,
        };
        Program {
            overrides: vec![over(3, "wg"), over(1, "gain"), over(2, "unused")],
            resources: vec![
                resource("tex", 1, 0, BindingKind::InputAttachment),
                resource("params", 0, 0, BindingKind::Buffer(BufferBindingType::Uniform)),
                resource("out", 0, 1, BindingKind::Buffer(BufferBindingType::Storage)),
                resource("other", 2, 0, BindingKind::Sampler),
            ],
            functions: vec![
                Function {
                    name: "apply".into(),
                    params: vec![],
                    body: vec![Stmt::Store {
                        resource: "out".into(),
                        index: Expr::u32(0),
                        value: Expr::override_ref("gain"),
                    }],
                },
                Function {
                    name: "dead".into(),
                    params: vec![],
                    body: vec![Stmt::Store {
                        resource: "out".into(),
                        index: Expr::load("other", Expr::u32(0)),
                        value: Expr::override_ref("unused"),
                    }],
                },
            ],
            entry_points: vec![
                EntryPoint {
                    name: "main".into(),
                    stage: ShaderStage::Compute,
                    workgroup_size: Some([
                        WorkgroupDim::Override("wg".into()),
                        WorkgroupDim::Const(1),
                        WorkgroupDim::Const(1),
                    ]),
                    body: vec![
                        Stmt::Let {
                            name: "p".into(),
                            value: Expr::load("params", Expr::u32(0)),
                        },
                        Stmt::Call {
                            function: "apply".into(),
                            args: vec![],
                        },
                    ],
                },
                EntryPoint {
                    name: "frag".into(),
                    stage: ShaderStage::Fragment,
                    workgroup_size: None,
                    body: vec![Stmt::Let {
                        name: "t".into(),
                        value: Expr::load("tex", Expr::u32(0)),
                    }],
                },
            ],
        }
    }

    #[test]
    fn collects_transitive_bindings_and_overrides() {
        let p = program();
        assert_eq!(p.validate(), Ok(()));
        let meta = entry_point_metadata(&p, "main").unwrap();
        let names: Vec<_> = meta.bindings.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["params", "out"]);
        let ids: Vec<_> = meta.overrides.iter().map(|o| o.id.as_raw()).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(meta.functions, vec!["apply".to_string()]);
        assert!(meta.has_overrides());
        assert!(!meta.uses_input_attachment());
    }

    #[test]
    fn input_attachment_detected() {
        let meta = entry_point_metadata(&program(), "frag").unwrap();
        assert!(meta.uses_input_attachment());
        assert!(!meta.has_overrides());
    }

    #[test]
    fn missing_entry_point() {
        let err = entry_point_metadata(&program(), "nope").unwrap_err();
        assert_eq!(err, IrError::EntryPointNotFound("nope".into()));
    }
}
