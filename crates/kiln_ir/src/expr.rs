//! Expression trees.
//!
//! Expressions refer to locals, overrides, resources, and functions by name.
//! Names are resolved against the enclosing [`Program`](crate::Program) by
//! [`Program::validate`](crate::Program::validate).

use crate::types::Literal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Logical not.
    Not,
}

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Remainder.
    Rem,
    /// Minimum of both operands.
    Min,
    /// Maximum of both operands.
    Max,
    /// Equality.
    Eq,
    /// Less than.
    Lt,
    /// Logical and.
    And,
    /// Logical or.
    Or,
}

/// A stage builtin value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builtin {
    /// Vertex output position.
    Position,
    /// Vertex output point size.
    PointSize,
    /// Fragment output depth.
    FragDepth,
    /// Index of the current vertex.
    VertexIndex,
    /// Index of the current instance.
    InstanceIndex,
    /// Fragment coordinate.
    FragCoord,
    /// Flattened global invocation index.
    GlobalInvocationIndex,
    /// Flattened local invocation index.
    LocalInvocationIndex,
    /// Subgroup size the invocation runs with.
    SubgroupSize,
}

impl Builtin {
    /// Returns `true` if a shader may write this builtin.
    pub fn is_output(self) -> bool {
        matches!(self, Builtin::Position | Builtin::PointSize | Builtin::FragDepth)
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Builtin::Position => "position",
            Builtin::PointSize => "point_size",
            Builtin::FragDepth => "frag_depth",
            Builtin::VertexIndex => "vertex_index",
            Builtin::InstanceIndex => "instance_index",
            Builtin::FragCoord => "frag_coord",
            Builtin::GlobalInvocationIndex => "global_invocation_index",
            Builtin::LocalInvocationIndex => "local_invocation_index",
            Builtin::SubgroupSize => "subgroup_size",
        };
        f.write_str(text)
    }
}

/// An expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// A typed constant.
    Literal(Literal),
    /// A function parameter or `let` binding.
    Local(String),
    /// A reference to a module-scope override constant.
    Override(String),
    /// Reads element `index` of a resource.
    Load {
        /// Resource name.
        resource: String,
        /// Element index.
        index: Box<Expr>,
    },
    /// Reads a stage builtin.
    Builtin(Builtin),
    /// A unary operation.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        operand: Box<Expr>,
    },
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// A call to a helper function that returns a value.
    Call {
        /// Callee name.
        function: String,
        /// Arguments, in parameter order.
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Shorthand for a local reference.
    pub fn local(name: impl Into<String>) -> Self {
        Expr::Local(name.into())
    }

    /// Shorthand for an override reference.
    pub fn override_ref(name: impl Into<String>) -> Self {
        Expr::Override(name.into())
    }

    /// Shorthand for an `f32` literal.
    pub fn f32(value: f32) -> Self {
        Expr::Literal(Literal::F32(value))
    }

    /// Shorthand for a `u32` literal.
    pub fn u32(value: u32) -> Self {
        Expr::Literal(Literal::U32(value))
    }

    /// Shorthand for a resource load.
    pub fn load(resource: impl Into<String>, index: Expr) -> Self {
        Expr::Load {
            resource: resource.into(),
            index: Box::new(index),
        }
    }

    /// Shorthand for a binary operation.
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Shorthand for a call expression.
    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            function: function.into(),
            args,
        }
    }

    /// Visits this expression and all sub-expressions in pre-order.
    pub fn walk(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Literal(_) | Expr::Local(_) | Expr::Override(_) | Expr::Builtin(_) => {}
            Expr::Load { index, .. } => index.walk(f),
            Expr::Unary { operand, .. } => operand.walk(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk(f);
                rhs.walk(f);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.walk(f);
                }
            }
        }
    }

    /// Visits this expression and all sub-expressions mutably in post-order,
    /// so that `f` may replace a node after its children were rewritten.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Expr)) {
        match self {
            Expr::Literal(_) | Expr::Local(_) | Expr::Override(_) | Expr::Builtin(_) => {}
            Expr::Load { index, .. } => index.walk_mut(f),
            Expr::Unary { operand, .. } => operand.walk_mut(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk_mut(f);
                rhs.walk_mut(f);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.walk_mut(f);
                }
            }
        }
        f(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Expr {
        Expr::binary(
            BinaryOp::Mul,
            Expr::load("input", Expr::Builtin(Builtin::GlobalInvocationIndex)),
            Expr::call("scale", vec![Expr::override_ref("factor")]),
        )
    }

    #[test]
    fn walk_visits_every_node() {
        let mut count = 0;
        sample().walk(&mut |_| count += 1);
        assert_eq!(count, 5);
    }

    #[test]
    fn walk_collects_overrides() {
        let mut names = Vec::new();
        sample().walk(&mut |e| {
            if let Expr::Override(name) = e {
                names.push(name.clone());
            }
        });
        assert_eq!(names, vec!["factor".to_string()]);
    }

    #[test]
    fn walk_mut_replaces_leaves() {
        let mut expr = sample();
        expr.walk_mut(&mut |e| {
            if matches!(e, Expr::Override(_)) {
                *e = Expr::f32(2.0);
            }
        });
        let mut found = false;
        expr.walk(&mut |e| found |= matches!(e, Expr::Override(_)));
        assert!(!found);
    }

    #[test]
    fn only_outputs_are_writable() {
        assert!(Builtin::PointSize.is_output());
        assert!(!Builtin::VertexIndex.is_output());
    }

    #[test]
    fn json_shape() {
        let json = serde_json::to_string(&Expr::local("x")).unwrap();
        assert_eq!(json, r#"{"local":"x"}"#);
    }
}
