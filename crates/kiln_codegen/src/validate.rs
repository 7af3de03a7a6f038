//! Post-generation binary validation.

use crate::binary::{Code, ShaderBinary};
use crate::error::BinaryValidationError;
use crate::lower::{Instr, LoweredModule};
use kiln_ir::{BindingKind, ShaderStage, Stmt};
use std::collections::HashSet;

/// Decodes `bytes` and checks the module for internal consistency.
///
/// Beyond the container header this checks the entry point name, the binding
/// table (slot counts and uniqueness), and every reference from code into the
/// binding table, the function list, and local slots, plus jump targets.
pub fn validate_binary(bytes: &[u8]) -> Result<ShaderBinary, BinaryValidationError> {
    let binary = ShaderBinary::decode(bytes)?;
    let invalid = |msg: String| Err(BinaryValidationError::Invalid(msg));

    if binary.entry_point.is_empty() {
        return invalid("empty entry point name".to_string());
    }
    if binary.workgroup_size.is_some() != (binary.stage == ShaderStage::Compute) {
        return invalid(format!(
            "workgroup size presence does not match {} stage",
            binary.stage
        ));
    }
    if let Some(size) = binary.workgroup_size {
        if size.contains(&0) {
            return invalid("zero workgroup dimension".to_string());
        }
    }

    let mut seen = HashSet::new();
    for bound in &binary.bindings {
        let expected = if bound.kind == BindingKind::ExternalTexture { 3 } else { 1 };
        if bound.slots.len() != expected {
            return invalid(format!(
                "'{}' has {} slots, expected {expected}",
                bound.name,
                bound.slots.len()
            ));
        }
        for slot in &bound.slots {
            if !seen.insert(*slot) {
                return invalid(format!("slot {slot} is bound twice"));
            }
        }
    }

    match &binary.code {
        Code::Lowered(module) => check_lowered(&binary, module)?,
        Code::Structured { functions, entry } => {
            let names: HashSet<&str> = functions.iter().map(|f| f.name.as_str()).collect();
            let resources: HashSet<&str> = binary.bindings.iter().map(|b| b.name.as_str()).collect();
            let bodies = functions.iter().map(|f| f.body.as_slice()).chain([entry.as_slice()]);
            for body in bodies {
                check_structured(body, &names, &resources)?;
            }
        }
    }
    Ok(binary)
}

fn check_structured(
    body: &[Stmt],
    functions: &HashSet<&str>,
    resources: &HashSet<&str>,
) -> Result<(), BinaryValidationError> {
    let mut problem = None;
    let mut note = |msg: String| {
        if problem.is_none() {
            problem = Some(msg);
        }
    };
    for stmt in body {
        stmt.walk(&mut |s| match s {
            Stmt::Store { resource, .. } if !resources.contains(resource.as_str()) => {
                note(format!("store to unbound resource '{resource}'"))
            }
            Stmt::Call { function, .. } if !functions.contains(function.as_str()) => {
                note(format!("call to unknown function '{function}'"))
            }
            _ => {}
        });
    }
    kiln_ir::stmt::walk_block_exprs(body, &mut |e| match e {
        kiln_ir::Expr::Load { resource, .. } if !resources.contains(resource.as_str()) => {
            note(format!("load from unbound resource '{resource}'"))
        }
        kiln_ir::Expr::Call { function, .. } if !functions.contains(function.as_str()) => {
            note(format!("call to unknown function '{function}'"))
        }
        kiln_ir::Expr::Override(name) => note(format!("unsubstituted override '{name}'")),
        _ => {}
    });
    match problem {
        Some(msg) => Err(BinaryValidationError::Invalid(msg)),
        None => Ok(()),
    }
}

fn check_lowered(binary: &ShaderBinary, module: &LoweredModule) -> Result<(), BinaryValidationError> {
    let invalid = |msg: String| Err(BinaryValidationError::Invalid(msg));
    let Some(entry) = module.functions.get(module.entry as usize) else {
        return invalid(format!("entry function index {} out of range", module.entry));
    };
    if entry.name != binary.entry_point {
        return invalid(format!(
            "entry function is '{}', header names '{}'",
            entry.name, binary.entry_point
        ));
    }

    for (index, function) in module.functions.iter().enumerate() {
        if function.params > function.locals {
            return invalid(format!("'{}' has more parameters than locals", function.name));
        }
        if !matches!(function.code.last(), Some(Instr::Return { .. })) {
            return invalid(format!("'{}' does not end in a return", function.name));
        }
        let len = function.code.len() as i64;
        for (pc, instr) in function.code.iter().enumerate() {
            let at = || format!("'{}' at {pc}", function.name);
            match *instr {
                Instr::LoadLocal(slot) | Instr::StoreLocal(slot) if slot >= function.locals => {
                    return invalid(format!("{}: local slot {slot} out of range", at()));
                }
                Instr::Load { binding, .. } | Instr::Store { binding, .. }
                    if binding as usize >= binary.bindings.len() =>
                {
                    return invalid(format!("{}: binding {binding} out of range", at()));
                }
                Instr::Call { function: callee, argc, .. } => {
                    let Some(target) = module.functions.get(callee as usize) else {
                        return invalid(format!("{}: function {callee} out of range", at()));
                    };
                    if callee == module.entry {
                        return invalid(format!("{}: call to the entry point", at()));
                    }
                    if target.params != argc {
                        return invalid(format!(
                            "{}: passes {argc} arguments to '{}' which takes {}",
                            at(),
                            target.name,
                            target.params
                        ));
                    }
                }
                Instr::JumpIfFalse(offset) | Instr::Jump(offset) => {
                    let target = pc as i64 + 1 + i64::from(offset);
                    if target <= pc as i64 || target >= len {
                        return invalid(format!("{}: jump target {target} out of range", at()));
                    }
                }
                Instr::ZeroWorkgroupMemory if index != module.entry as usize || pc != 0 => {
                    return invalid(format!("{}: misplaced workgroup zeroing", at()));
                }
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::{BoundResource, CodegenFlags};
    use crate::lower::LoweredFunction;
    use kiln_ir::Literal;

    fn lowered(code: Vec<Instr>, locals: u32) -> ShaderBinary {
        ShaderBinary {
            stage: ShaderStage::Compute,
            entry_point: "main".into(),
            workgroup_size: Some([64, 1, 1]),
            flags: CodegenFlags::default(),
            bindings: vec![BoundResource {
                name: "buf".into(),
                kind: BindingKind::Buffer(kiln_ir::BufferBindingType::Storage),
                slots: vec![0],
            }],
            code: Code::Lowered(LoweredModule {
                functions: vec![LoweredFunction {
                    name: "main".into(),
                    params: 0,
                    locals,
                    code,
                }],
                entry: 0,
            }),
        }
    }

    fn check(binary: &ShaderBinary) -> Result<ShaderBinary, BinaryValidationError> {
        validate_binary(&binary.encode().unwrap())
    }

    #[test]
    fn accepts_well_formed_module() {
        let binary = lowered(
            vec![
                Instr::Push(Literal::U32(0)),
                Instr::Push(Literal::F32(1.0)),
                Instr::Store {
                    binding: 0,
                    checked: true,
                },
                Instr::Return { has_value: false },
            ],
            0,
        );
        assert_eq!(check(&binary).unwrap(), binary);
    }

    #[test]
    fn rejects_out_of_range_binding() {
        let binary = lowered(
            vec![
                Instr::Push(Literal::U32(0)),
                Instr::Load {
                    binding: 4,
                    checked: false,
                },
                Instr::Return { has_value: false },
            ],
            0,
        );
        assert!(matches!(check(&binary), Err(BinaryValidationError::Invalid(m)) if m.contains("binding 4")));
    }

    #[test]
    fn rejects_wild_jump() {
        let binary = lowered(vec![Instr::Jump(10), Instr::Return { has_value: false }], 0);
        assert!(check(&binary).is_err());
    }

    #[test]
    fn rejects_bad_local_slot() {
        let binary = lowered(
            vec![Instr::LoadLocal(2), Instr::Return { has_value: false }],
            1,
        );
        assert!(check(&binary).is_err());
    }

    #[test]
    fn rejects_missing_return() {
        let binary = lowered(vec![Instr::Push(Literal::Bool(true))], 0);
        assert!(check(&binary).is_err());
    }

    #[test]
    fn rejects_duplicate_slots() {
        let mut binary = lowered(vec![Instr::Return { has_value: false }], 0);
        binary.bindings.push(BoundResource {
            name: "other".into(),
            kind: BindingKind::Sampler,
            slots: vec![0],
        });
        assert!(check(&binary).is_err());
    }

    #[test]
    fn rejects_entry_name_mismatch() {
        let mut binary = lowered(vec![Instr::Return { has_value: false }], 0);
        binary.entry_point = "other".into();
        assert!(check(&binary).is_err());
    }

    #[test]
    fn structured_unbound_resource() {
        let mut binary = lowered(vec![], 0);
        binary.code = Code::Structured {
            functions: vec![],
            entry: vec![Stmt::Store {
                resource: "ghost".into(),
                index: kiln_ir::Expr::u32(0),
                value: kiln_ir::Expr::u32(0),
            }],
        };
        assert!(check(&binary).is_err());
    }

    #[test]
    fn corrupt_container_is_reported() {
        let err = validate_binary(b"not a binary at all").unwrap_err();
        assert_eq!(err, BinaryValidationError::BadMagic);
    }
}
