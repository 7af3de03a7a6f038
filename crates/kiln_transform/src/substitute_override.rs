//! Override-constant substitution.

use crate::errors::TransformError;
use crate::manager::{Transform, TransformOutputs};
use kiln_ir::{Expr, Literal, OverrideId, Program, WorkgroupDim};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Pipeline-supplied override values, keyed by override id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubstituteOverrideConfig {
    /// Values by id. Ids without an entry fall back to the declared default.
    pub values: BTreeMap<OverrideId, f64>,
}

/// Replaces every override reference with a typed literal.
///
/// Runs after renaming, so lookups go through override ids. Error messages
/// use the names the overrides had before renaming.
pub struct SubstituteOverride {
    config: SubstituteOverrideConfig,
}

impl SubstituteOverride {
    /// Creates the transform with the given values.
    pub fn new(config: SubstituteOverrideConfig) -> Self {
        Self { config }
    }
}

impl Transform for SubstituteOverride {
    fn name(&self) -> &'static str {
        "SubstituteOverride"
    }

    fn apply(
        &self,
        mut program: Program,
        outputs: &mut TransformOutputs,
    ) -> Result<Program, TransformError> {
        let mut literals: FxHashMap<String, (Literal, f64)> = FxHashMap::default();
        for o in &program.overrides {
            let original = outputs.original_name(&o.name).to_string();
            let value = self
                .config
                .values
                .get(&o.id)
                .copied()
                .or(o.default)
                .ok_or_else(|| TransformError::MissingOverride {
                    name: original.clone(),
                    id: o.id,
                })?;
            let literal =
                Literal::from_f64(o.ty, value).ok_or(TransformError::InvalidOverrideValue {
                    name: original,
                    ty: o.ty,
                    value,
                })?;
            literals.insert(o.name.clone(), (literal, value));
        }

        let substitute = |expr: &mut Expr| {
            expr.walk_mut(&mut |node| {
                if let Expr::Override(name) = node {
                    if let Some((literal, _)) = literals.get(name.as_str()) {
                        *node = Expr::Literal(*literal);
                    }
                }
            })
        };
        let bodies = program
            .functions
            .iter_mut()
            .map(|f| &mut f.body)
            .chain(program.entry_points.iter_mut().map(|e| &mut e.body));
        for body in bodies {
            for stmt in body.iter_mut() {
                stmt.for_each_expr_mut(&mut |expr| substitute(expr));
            }
        }

        for entry in &mut program.entry_points {
            let Some(dims) = &mut entry.workgroup_size else {
                continue;
            };
            for dim in dims.iter_mut() {
                let WorkgroupDim::Override(name) = dim else {
                    continue;
                };
                let Some((literal, value)) = literals.get(name.as_str()) else {
                    return Err(TransformError::Internal {
                        transform: "SubstituteOverride",
                        message: format!("workgroup override '{name}' is not declared"),
                    });
                };
                match literal.as_u32() {
                    Some(extent) if extent > 0 => *dim = WorkgroupDim::Const(extent),
                    _ => {
                        return Err(TransformError::InvalidWorkgroupOverride {
                            name: outputs.original_name(name).to_string(),
                            value: *value,
                        })
                    }
                }
            }
        }

        if let Some(leftover) = find_override_ref(&program) {
            return Err(TransformError::Internal {
                transform: "SubstituteOverride",
                message: format!("reference to undeclared override '{leftover}' remains"),
            });
        }
        program.overrides.clear();
        Ok(program)
    }
}

fn find_override_ref(program: &Program) -> Option<String> {
    let mut found = None;
    let bodies = program
        .functions
        .iter()
        .map(|f| f.body.as_slice())
        .chain(program.entry_points.iter().map(|e| e.body.as_slice()));
    for body in bodies {
        kiln_ir::stmt::walk_block_exprs(body, &mut |expr| {
            if found.is_none() {
                if let Expr::Override(name) = expr {
                    found = Some(name.clone());
                }
            }
        });
    }
    found
}
