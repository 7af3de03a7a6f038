//! Symbol renaming.

use crate::errors::TransformError;
use crate::manager::{Transform, TransformOutputs};
use kiln_ir::{Expr, Program, Stmt, WorkgroupDim};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;

/// Gives every user-declared symbol a fresh `sym_N` name.
///
/// Module-scope declarations are renamed consistently across the program
/// and the mapping is published in [`TransformOutputs::renamed`]. Parameters
/// and locals are renamed per scope, so shadowing survives. The `sym_`
/// prefix keeps generated names clear of language keywords and builtin
/// names; names already present in the program are skipped.
pub struct Renamer;

struct FreshNames {
    taken: FxHashSet<String>,
    next: usize,
}

impl FreshNames {
    fn new(program: &Program) -> Self {
        let mut taken: FxHashSet<String> =
            program.module_scope_names().map(str::to_string).collect();
        let bodies = program
            .functions
            .iter()
            .map(|f| f.body.as_slice())
            .chain(program.entry_points.iter().map(|e| e.body.as_slice()));
        for body in bodies {
            for stmt in body {
                stmt.walk(&mut |s| {
                    if let Stmt::Let { name, .. } = s {
                        taken.insert(name.clone());
                    }
                });
            }
        }
        for function in &program.functions {
            taken.extend(function.params.iter().cloned());
        }
        Self { taken, next: 0 }
    }

    fn fresh(&mut self) -> String {
        loop {
            let candidate = format!("sym_{}", self.next);
            self.next += 1;
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

struct Rewriter<'a> {
    module: &'a BTreeMap<String, String>,
    names: &'a mut FreshNames,
    locals: Vec<(String, String)>,
}

impl Rewriter<'_> {
    fn global(&self, name: &mut String) {
        if let Some(new) = self.module.get(name.as_str()) {
            *name = new.clone();
        }
    }

    fn bind(&mut self, name: &mut String) {
        let new = self.names.fresh();
        self.locals.push((std::mem::replace(name, new.clone()), new));
    }

    fn block(&mut self, body: &mut [Stmt]) {
        let mark = self.locals.len();
        for stmt in body {
            self.stmt(stmt);
        }
        self.locals.truncate(mark);
    }

    fn stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Let { name, value } => {
                self.expr(value);
                self.bind(name);
            }
            Stmt::Assign { name, value } => {
                self.expr(value);
                rename_local(&self.locals, name);
            }
            Stmt::Store {
                resource,
                index,
                value,
            } => {
                self.global(resource);
                self.expr(index);
                self.expr(value);
            }
            Stmt::WriteBuiltin { value, .. } => self.expr(value),
            Stmt::Call { function, args } => {
                self.global(function);
                for arg in args {
                    self.expr(arg);
                }
            }
            Stmt::If {
                condition,
                then_body,
                else_body,
            } => {
                self.expr(condition);
                self.block(then_body);
                self.block(else_body);
            }
            Stmt::Return { value } => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
        }
    }

    fn expr(&self, expr: &mut Expr) {
        expr.walk_mut(&mut |node| match node {
            Expr::Local(name) => rename_local(&self.locals, name),
            Expr::Override(name)
            | Expr::Load { resource: name, .. }
            | Expr::Call { function: name, .. } => self.global(name),
            Expr::Literal(_) | Expr::Builtin(_) | Expr::Unary { .. } | Expr::Binary { .. } => {}
        });
    }
}

fn rename_local(locals: &[(String, String)], name: &mut String) {
    if let Some((_, new)) = locals.iter().rev().find(|(old, _)| old == name) {
        *name = new.clone();
    }
}

impl Transform for Renamer {
    fn name(&self) -> &'static str {
        "Renamer"
    }

    fn apply(
        &self,
        mut program: Program,
        outputs: &mut TransformOutputs,
    ) -> Result<Program, TransformError> {
        let mut names = FreshNames::new(&program);
        let module: BTreeMap<String, String> = program
            .module_scope_names()
            .map(str::to_string)
            .collect::<Vec<_>>()
            .into_iter()
            .map(|old| (old, names.fresh()))
            .collect();

        let mut rewriter = Rewriter {
            module: &module,
            names: &mut names,
            locals: Vec::new(),
        };
        for o in &mut program.overrides {
            rewriter.global(&mut o.name);
        }
        for r in &mut program.resources {
            rewriter.global(&mut r.name);
        }
        for function in &mut program.functions {
            rewriter.global(&mut function.name);
            rewriter.locals.clear();
            for param in &mut function.params {
                rewriter.bind(param);
            }
            rewriter.block(&mut function.body);
        }
        for entry in &mut program.entry_points {
            rewriter.global(&mut entry.name);
            rewriter.locals.clear();
            if let Some(dims) = &mut entry.workgroup_size {
                for dim in dims.iter_mut() {
                    if let WorkgroupDim::Override(name) = dim {
                        rewriter.global(name);
                    }
                }
            }
            rewriter.block(&mut entry.body);
        }

        tracing::trace!(symbols = module.len(), "renamed module-scope symbols");
        outputs.renamed = module;
        Ok(program)
    }
}
