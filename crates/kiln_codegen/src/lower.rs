//! Lowering of structured statements to a flat stack machine.
//!
//! Locals are resolved to numbered slots (parameters first) and control flow
//! to relative jumps. A jump offset is counted from the instruction after the
//! jump. Every function ends in a `Return`, so any forward jump out of a
//! block lands on a valid instruction.

use crate::error::GenerateError;
use kiln_ir::{BinaryOp, Builtin, Expr, Function, Literal, Stmt, UnaryOp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One stack-machine instruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    /// Pushes a constant.
    Push(Literal),
    /// Pushes the value of a local slot.
    LoadLocal(u32),
    /// Pops into a local slot.
    StoreLocal(u32),
    /// Pushes a builtin input.
    ReadBuiltin(Builtin),
    /// Pops into a builtin output.
    WriteBuiltin(Builtin),
    /// Pops an index, pushes the resource element.
    Load {
        /// Index into the binding table.
        binding: u32,
        /// Out-of-bounds indices are clamped.
        checked: bool,
    },
    /// Pops a value and an index, writes the resource element.
    Store {
        /// Index into the binding table.
        binding: u32,
        /// Out-of-bounds writes are discarded.
        checked: bool,
    },
    /// Pops one operand, pushes the result.
    Unary(UnaryOp),
    /// Pops two operands, pushes the result.
    Binary(BinaryOp),
    /// Pops `argc` arguments and calls a function.
    Call {
        /// Index into the module's function list.
        function: u32,
        /// Argument count.
        argc: u32,
        /// Drop the returned value.
        discard: bool,
    },
    /// Pops a condition; jumps by the offset when it is false.
    JumpIfFalse(i32),
    /// Jumps unconditionally by the offset.
    Jump(i32),
    /// Leaves the function, optionally returning the top of stack.
    Return {
        /// A value is on the stack.
        has_value: bool,
    },
    /// Zeroes workgroup memory. Only valid as the first entry-point instruction.
    ZeroWorkgroupMemory,
}

/// A lowered function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoweredFunction {
    /// Symbol name.
    pub name: String,
    /// Parameter count; parameters occupy the first slots.
    pub params: u32,
    /// Total local slots, parameters included.
    pub locals: u32,
    /// Instructions.
    pub code: Vec<Instr>,
}

/// A lowered module: helper functions followed by the entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoweredModule {
    /// All functions.
    pub functions: Vec<LoweredFunction>,
    /// Index of the entry point in `functions`.
    pub entry: u32,
}

/// Lowering switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowerOptions {
    /// Emit checked resource accesses.
    pub robust_buffer_access: bool,
    /// Emit a workgroup-memory zeroing prologue in the entry point.
    pub zero_initialize_workgroup_memory: bool,
}

/// Lowers helper functions and one entry body.
///
/// `bindings` lists resource names in binding-table order.
pub fn lower(
    functions: &[Function],
    entry_name: &str,
    entry_body: &[Stmt],
    bindings: &[String],
    options: LowerOptions,
) -> Result<LoweredModule, GenerateError> {
    let module = ModuleScope {
        functions: functions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.as_str(), (i as u32, f.params.len() as u32)))
            .collect(),
        bindings: bindings
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i as u32))
            .collect(),
        checked: options.robust_buffer_access,
    };

    let mut lowered = Vec::with_capacity(functions.len() + 1);
    for function in functions {
        let mut builder = FunctionBuilder::new(&module, &function.params);
        builder.block(&function.body)?;
        lowered.push(builder.finish(&function.name, function.params.len() as u32));
    }

    let mut builder = FunctionBuilder::new(&module, &[]);
    if options.zero_initialize_workgroup_memory {
        builder.code.push(Instr::ZeroWorkgroupMemory);
    }
    builder.block(entry_body)?;
    lowered.push(builder.finish(entry_name, 0));

    Ok(LoweredModule {
        entry: functions.len() as u32,
        functions: lowered,
    })
}

struct ModuleScope<'a> {
    functions: HashMap<&'a str, (u32, u32)>,
    bindings: HashMap<&'a str, u32>,
    checked: bool,
}

impl ModuleScope<'_> {
    fn binding(&self, name: &str) -> Result<u32, GenerateError> {
        self.bindings
            .get(name)
            .copied()
            .ok_or_else(|| GenerateError::Unresolved {
                kind: "resource",
                name: name.to_string(),
            })
    }

    fn function(&self, name: &str) -> Result<u32, GenerateError> {
        self.functions
            .get(name)
            .map(|&(index, _)| index)
            .ok_or_else(|| GenerateError::Unresolved {
                kind: "function",
                name: name.to_string(),
            })
    }
}

struct FunctionBuilder<'m, 'a> {
    module: &'m ModuleScope<'a>,
    scope: Vec<(String, u32)>,
    next_slot: u32,
    code: Vec<Instr>,
}

impl<'m, 'a> FunctionBuilder<'m, 'a> {
    fn new(module: &'m ModuleScope<'a>, params: &[String]) -> Self {
        let scope: Vec<(String, u32)> = params
            .iter()
            .enumerate()
            .map(|(i, p)| (p.clone(), i as u32))
            .collect();
        Self {
            module,
            next_slot: scope.len() as u32,
            scope,
            code: Vec::new(),
        }
    }

    fn finish(mut self, name: &str, params: u32) -> LoweredFunction {
        self.code.push(Instr::Return { has_value: false });
        LoweredFunction {
            name: name.to_string(),
            params,
            locals: self.next_slot,
            code: self.code,
        }
    }

    fn local(&self, name: &str) -> Result<u32, GenerateError> {
        self.scope
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|&(_, slot)| slot)
            .ok_or_else(|| GenerateError::Unresolved {
                kind: "local",
                name: name.to_string(),
            })
    }

    fn emit_jump_placeholder(&mut self, conditional: bool) -> usize {
        self.code.push(if conditional {
            Instr::JumpIfFalse(0)
        } else {
            Instr::Jump(0)
        });
        self.code.len() - 1
    }

    fn patch_jump_here(&mut self, at: usize) {
        let offset = (self.code.len() - (at + 1)) as i32;
        match &mut self.code[at] {
            Instr::JumpIfFalse(o) | Instr::Jump(o) => *o = offset,
            _ => {}
        }
    }

    fn block(&mut self, body: &[Stmt]) -> Result<(), GenerateError> {
        let mark = self.scope.len();
        for stmt in body {
            self.stmt(stmt)?;
        }
        self.scope.truncate(mark);
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), GenerateError> {
        match stmt {
            Stmt::Let { name, value } => {
                self.expr(value)?;
                let slot = self.next_slot;
                self.next_slot += 1;
                self.code.push(Instr::StoreLocal(slot));
                self.scope.push((name.clone(), slot));
            }
            Stmt::Assign { name, value } => {
                self.expr(value)?;
                let slot = self.local(name)?;
                self.code.push(Instr::StoreLocal(slot));
            }
            Stmt::Store {
                resource,
                index,
                value,
            } => {
                self.expr(index)?;
                self.expr(value)?;
                self.code.push(Instr::Store {
                    binding: self.module.binding(resource)?,
                    checked: self.module.checked,
                });
            }
            Stmt::WriteBuiltin { builtin, value } => {
                self.expr(value)?;
                self.code.push(Instr::WriteBuiltin(*builtin));
            }
            Stmt::Call { function, args } => self.call(function, args, true)?,
            Stmt::If {
                condition,
                then_body,
                else_body,
            } => {
                self.expr(condition)?;
                let to_else = self.emit_jump_placeholder(true);
                self.block(then_body)?;
                if else_body.is_empty() {
                    self.patch_jump_here(to_else);
                } else {
                    let to_end = self.emit_jump_placeholder(false);
                    self.patch_jump_here(to_else);
                    self.block(else_body)?;
                    self.patch_jump_here(to_end);
                }
            }
            Stmt::Return { value } => {
                if let Some(value) = value {
                    self.expr(value)?;
                }
                self.code.push(Instr::Return {
                    has_value: value.is_some(),
                });
            }
        }
        Ok(())
    }

    fn call(&mut self, function: &str, args: &[Expr], discard: bool) -> Result<(), GenerateError> {
        for arg in args {
            self.expr(arg)?;
        }
        self.code.push(Instr::Call {
            function: self.module.function(function)?,
            argc: args.len() as u32,
            discard,
        });
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), GenerateError> {
        match expr {
            Expr::Literal(literal) => self.code.push(Instr::Push(*literal)),
            Expr::Local(name) => {
                let slot = self.local(name)?;
                self.code.push(Instr::LoadLocal(slot));
            }
            Expr::Override(name) => return Err(GenerateError::UnresolvedOverride(name.clone())),
            Expr::Load { resource, index } => {
                self.expr(index)?;
                self.code.push(Instr::Load {
                    binding: self.module.binding(resource)?,
                    checked: self.module.checked,
                });
            }
            Expr::Builtin(builtin) => self.code.push(Instr::ReadBuiltin(*builtin)),
            Expr::Unary { op, operand } => {
                self.expr(operand)?;
                self.code.push(Instr::Unary(*op));
            }
            Expr::Binary { op, lhs, rhs } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                self.code.push(Instr::Binary(*op));
            }
            Expr::Call { function, args } => self.call(function, args, false)?,
        }
        Ok(())
    }
}
