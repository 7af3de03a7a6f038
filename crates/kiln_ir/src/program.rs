//! The portable shader program and its module-scope declarations.

use crate::callgraph::CallGraph;
use crate::error::IrError;
use crate::expr::Expr;
use crate::resource::Resource;
use crate::stmt::Stmt;
use crate::types::{ScalarType, ShaderStage};
use kiln_common::{ContentHash, InternalError, KilnResult};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable numeric identity of an override constant.
///
/// Ids survive symbol renaming, so substitution tables are keyed by them
/// rather than by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverrideId(u32);

impl OverrideId {
    /// Creates an id from its raw value.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for OverrideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@id({})", self.0)
    }
}

/// A pipeline-overridable constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Override {
    /// Stable numeric id.
    pub id: OverrideId,
    /// Module-scope name.
    pub name: String,
    /// Scalar type of the constant.
    pub ty: ScalarType,
    /// Value used when the pipeline supplies none.
    #[serde(default)]
    pub default: Option<f64>,
}

/// A helper function callable from entry points and other functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// Module-scope name.
    pub name: String,
    /// Parameter names.
    #[serde(default)]
    pub params: Vec<String>,
    /// Function body.
    #[serde(default)]
    pub body: Vec<Stmt>,
}

/// One component of a compute workgroup size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkgroupDim {
    /// A fixed extent.
    Const(u32),
    /// An extent taken from the named override.
    Override(String),
}

impl WorkgroupDim {
    /// Returns the fixed extent, or `None` if it still depends on an override.
    pub fn as_const(&self) -> Option<u32> {
        match self {
            WorkgroupDim::Const(v) => Some(*v),
            WorkgroupDim::Override(_) => None,
        }
    }
}

/// A shader entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Module-scope name.
    pub name: String,
    /// Pipeline stage.
    pub stage: ShaderStage,
    /// Workgroup size; present exactly for compute entry points.
    #[serde(default)]
    pub workgroup_size: Option<[WorkgroupDim; 3]>,
    /// Entry point body.
    #[serde(default)]
    pub body: Vec<Stmt>,
}

/// A portable shader program.
///
/// Programs arrive already parsed. All cross-references are by module-scope
/// name, and every module-scope name is unique across overrides, resources,
/// functions, and entry points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Override constants.
    #[serde(default)]
    pub overrides: Vec<Override>,
    /// Resource bindings.
    #[serde(default)]
    pub resources: Vec<Resource>,
    /// Helper functions.
    #[serde(default)]
    pub functions: Vec<Function>,
    /// Entry points.
    #[serde(default)]
    pub entry_points: Vec<EntryPoint>,
}

impl Program {
    /// Looks up a helper function by name.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Looks up an entry point by name.
    pub fn entry_point(&self, name: &str) -> Option<&EntryPoint> {
        self.entry_points.iter().find(|e| e.name == name)
    }

    /// Looks up an override by name.
    pub fn override_named(&self, name: &str) -> Option<&Override> {
        self.overrides.iter().find(|o| o.name == name)
    }

    /// Looks up a resource by name.
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Returns an iterator over every module-scope name.
    pub fn module_scope_names(&self) -> impl Iterator<Item = &str> {
        self.overrides
            .iter()
            .map(|o| o.name.as_str())
            .chain(self.resources.iter().map(|r| r.name.as_str()))
            .chain(self.functions.iter().map(|f| f.name.as_str()))
            .chain(self.entry_points.iter().map(|e| e.name.as_str()))
    }

    /// Checks that the program is well formed.
    ///
    /// Module-scope names, override ids, and binding points must be unique;
    /// every reference must resolve; the call graph must be acyclic; and
    /// only compute entry points may carry a workgroup size.
    pub fn validate(&self) -> Result<(), IrError> {
        let mut names = FxHashSet::default();
        for name in self.module_scope_names() {
            if !names.insert(name) {
                return Err(IrError::DuplicateName(name.to_string()));
            }
        }
        let mut ids = FxHashSet::default();
        for o in &self.overrides {
            if !ids.insert(o.id) {
                return Err(IrError::DuplicateOverrideId(o.id.as_raw()));
            }
        }
        let mut points = FxHashSet::default();
        for r in &self.resources {
            if !points.insert(r.point()) {
                return Err(IrError::DuplicateBinding(r.point()));
            }
        }

        for function in &self.functions {
            Resolver::new(self, &function.name, function.params.clone()).block(&function.body)?;
        }
        for entry in &self.entry_points {
            self.check_workgroup_size(entry)?;
            Resolver::new(self, &entry.name, Vec::new()).block(&entry.body)?;
        }

        if let Some(name) = CallGraph::build(self).find_cycle() {
            return Err(IrError::Recursion(name.to_string()));
        }
        Ok(())
    }

    fn check_workgroup_size(&self, entry: &EntryPoint) -> Result<(), IrError> {
        let fail = |problem| IrError::WorkgroupSize {
            name: entry.name.clone(),
            stage: entry.stage,
            problem,
        };
        match (&entry.workgroup_size, entry.stage) {
            (None, ShaderStage::Compute) => Err(fail("has no workgroup size")),
            (Some(_), ShaderStage::Vertex | ShaderStage::Fragment) => {
                Err(fail("must not declare a workgroup size"))
            }
            (None, _) => Ok(()),
            (Some(dims), ShaderStage::Compute) => {
                for dim in dims {
                    match dim {
                        WorkgroupDim::Const(0) => return Err(fail("has a zero dimension")),
                        WorkgroupDim::Const(_) => {}
                        WorkgroupDim::Override(name) => {
                            if self.override_named(name).is_none() {
                                return Err(IrError::Unresolved {
                                    kind: "override",
                                    name: name.clone(),
                                    scope: entry.name.clone(),
                                });
                            }
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Returns a stable hash of the program's serialized form.
    pub fn content_hash(&self) -> KilnResult<ContentHash> {
        let bytes = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| InternalError::new(format!("failed to encode program: {e}")))?;
        Ok(ContentHash::from_bytes(&bytes))
    }
}

/// Name resolution for one function or entry-point body.
struct Resolver<'p> {
    program: &'p Program,
    scope: &'p str,
    locals: Vec<String>,
}

impl<'p> Resolver<'p> {
    fn new(program: &'p Program, scope: &'p str, params: Vec<String>) -> Self {
        Self {
            program,
            scope,
            locals: params,
        }
    }

    fn unresolved(&self, kind: &'static str, name: &str) -> IrError {
        IrError::Unresolved {
            kind,
            name: name.to_string(),
            scope: self.scope.to_string(),
        }
    }

    fn block(&mut self, body: &[Stmt]) -> Result<(), IrError> {
        let mark = self.locals.len();
        for stmt in body {
            self.stmt(stmt)?;
        }
        self.locals.truncate(mark);
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), IrError> {
        match stmt {
            Stmt::Let { name, value } => {
                self.expr(value)?;
                self.locals.push(name.clone());
            }
            Stmt::Assign { name, value } => {
                if !self.locals.contains(name) {
                    return Err(self.unresolved("local", name));
                }
                self.expr(value)?;
            }
            Stmt::Store {
                resource,
                index,
                value,
            } => {
                let r = self
                    .program
                    .resource(resource)
                    .ok_or_else(|| self.unresolved("resource", resource))?;
                if !r.kind.is_writable() {
                    return Err(IrError::NotWritable {
                        target: resource.clone(),
                        scope: self.scope.to_string(),
                    });
                }
                self.expr(index)?;
                self.expr(value)?;
            }
            Stmt::WriteBuiltin { builtin, value } => {
                if !builtin.is_output() {
                    return Err(IrError::NotWritable {
                        target: builtin.to_string(),
                        scope: self.scope.to_string(),
                    });
                }
                self.expr(value)?;
            }
            Stmt::Call { function, args } => self.call(function, args)?,
            Stmt::If {
                condition,
                then_body,
                else_body,
            } => {
                self.expr(condition)?;
                self.block(then_body)?;
                self.block(else_body)?;
            }
            Stmt::Return { value } => {
                if let Some(value) = value {
                    self.expr(value)?;
                }
            }
        }
        Ok(())
    }

    fn call(&mut self, function: &str, args: &[Expr]) -> Result<(), IrError> {
        let callee = self
            .program
            .function(function)
            .ok_or_else(|| self.unresolved("function", function))?;
        if callee.params.len() != args.len() {
            return Err(IrError::ArityMismatch {
                callee: function.to_string(),
                scope: self.scope.to_string(),
                expected: callee.params.len(),
                found: args.len(),
            });
        }
        for arg in args {
            self.expr(arg)?;
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), IrError> {
        match expr {
            Expr::Literal(_) | Expr::Builtin(_) => Ok(()),
            Expr::Local(name) => {
                if self.locals.contains(name) {
                    Ok(())
                } else {
                    Err(self.unresolved("local", name))
                }
            }
            Expr::Override(name) => match self.program.override_named(name) {
                Some(_) => Ok(()),
                None => Err(self.unresolved("override", name)),
            },
            Expr::Load { resource, index } => {
                if self.program.resource(resource).is_none() {
                    return Err(self.unresolved("resource", resource));
                }
                self.expr(index)
            }
            Expr::Unary { operand, .. } => self.expr(operand),
            Expr::Binary { lhs, rhs, .. } => {
                self.expr(lhs)?;
                self.expr(rhs)
            }
            Expr::Call { function, args } => self.call(function, args),
        }
    }
}
