//! Statements.

use crate::expr::{Builtin, Expr};
use serde::{Deserialize, Serialize};

/// A statement inside a function or entry-point body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stmt {
    /// Introduces a new local scoped to the enclosing block.
    Let {
        /// Local name.
        name: String,
        /// Initial value.
        value: Expr,
    },
    /// Reassigns an existing local.
    Assign {
        /// Local name.
        name: String,
        /// New value.
        value: Expr,
    },
    /// Writes element `index` of a writable resource.
    Store {
        /// Resource name.
        resource: String,
        /// Element index.
        index: Expr,
        /// Value written.
        value: Expr,
    },
    /// Writes a stage output builtin.
    WriteBuiltin {
        /// The builtin written.
        builtin: Builtin,
        /// Value written.
        value: Expr,
    },
    /// Calls a helper function for its effects, discarding any result.
    Call {
        /// Callee name.
        function: String,
        /// Arguments, in parameter order.
        args: Vec<Expr>,
    },
    /// Two-way conditional.
    If {
        /// The condition.
        condition: Expr,
        /// Statements run when the condition holds.
        then_body: Vec<Stmt>,
        /// Statements run otherwise.
        #[serde(default)]
        else_body: Vec<Stmt>,
    },
    /// Leaves the current function.
    Return {
        /// Returned value, if any.
        #[serde(default)]
        value: Option<Expr>,
    },
}

impl Stmt {
    /// Visits every top-level expression of this statement and of nested
    /// blocks, in program order. Sub-expressions are reached through
    /// [`Expr::walk`].
    pub fn for_each_expr(&self, f: &mut impl FnMut(&Expr)) {
        match self {
            Stmt::Let { value, .. }
            | Stmt::Assign { value, .. }
            | Stmt::WriteBuiltin { value, .. } => f(value),
            Stmt::Store { index, value, .. } => {
                f(index);
                f(value);
            }
            Stmt::Call { args, .. } => args.iter().for_each(|arg| f(arg)),
            Stmt::If {
                condition,
                then_body,
                else_body,
            } => {
                f(condition);
                for stmt in then_body.iter().chain(else_body) {
                    stmt.for_each_expr(f);
                }
            }
            Stmt::Return { value } => {
                if let Some(value) = value {
                    f(value);
                }
            }
        }
    }

    /// Mutable counterpart of [`Stmt::for_each_expr`].
    pub fn for_each_expr_mut(&mut self, f: &mut impl FnMut(&mut Expr)) {
        match self {
            Stmt::Let { value, .. }
            | Stmt::Assign { value, .. }
            | Stmt::WriteBuiltin { value, .. } => f(value),
            Stmt::Store { index, value, .. } => {
                f(index);
                f(value);
            }
            Stmt::Call { args, .. } => args.iter_mut().for_each(|arg| f(arg)),
            Stmt::If {
                condition,
                then_body,
                else_body,
            } => {
                f(condition);
                for stmt in then_body.iter_mut().chain(else_body.iter_mut()) {
                    stmt.for_each_expr_mut(f);
                }
            }
            Stmt::Return { value } => {
                if let Some(value) = value {
                    f(value);
                }
            }
        }
    }

    /// Visits this statement and every nested statement in pre-order.
    pub fn walk(&self, f: &mut impl FnMut(&Stmt)) {
        f(self);
        if let Stmt::If {
            then_body,
            else_body,
            ..
        } = self
        {
            for stmt in then_body.iter().chain(else_body) {
                stmt.walk(f);
            }
        }
    }
}

/// Visits every expression node in a block, including nested sub-expressions.
pub fn walk_block_exprs(body: &[Stmt], f: &mut impl FnMut(&Expr)) {
    for stmt in body {
        stmt.for_each_expr(&mut |expr| expr.walk(&mut *f));
    }
}

/// Collects the names of every function called from a block, in first-call
/// order without duplicates.
pub fn callees(body: &[Stmt]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    };
    for stmt in body {
        stmt.walk(&mut |s| {
            if let Stmt::Call { function, .. } = s {
                push(function.as_str());
            }
        });
        stmt.for_each_expr(&mut |expr| {
            expr.walk(&mut |e| {
                if let Expr::Call { function, .. } = e {
                    push(function.as_str());
                }
            })
        });
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinaryOp;

    fn body() -> Vec<Stmt> {
        vec![
            Stmt::Let {
                name: "v".into(),
                value: Expr::call("helper", vec![]),
            },
            Stmt::If {
                condition: Expr::binary(BinaryOp::Lt, Expr::local("v"), Expr::override_ref("limit")),
                then_body: vec![Stmt::Call {
                    function: "other".into(),
                    args: vec![Expr::local("v")],
                }],
                else_body: vec![Stmt::Return { value: None }],
            },
        ]
    }

    #[test]
    fn callees_are_deduplicated_and_nested() {
        let mut body = body();
        body.push(Stmt::Call {
            function: "helper".into(),
            args: vec![],
        });
        assert_eq!(callees(&body), vec!["helper".to_string(), "other".to_string()]);
    }

    #[test]
    fn walk_block_reaches_nested_overrides() {
        let mut seen = Vec::new();
        walk_block_exprs(&body(), &mut |e| {
            if let Expr::Override(name) = e {
                seen.push(name.clone());
            }
        });
        assert_eq!(seen, vec!["limit".to_string()]);
    }

    #[test]
    fn else_body_defaults_when_absent() {
        let json = r#"{"if":{"condition":{"local":"c"},"then_body":[]}}"#;
        let stmt: Stmt = serde_json::from_str(json).unwrap();
        assert!(matches!(stmt, Stmt::If { else_body, .. } if else_body.is_empty()));
    }
}
