//! The portable shader program model.
//!
//! A [`Program`] is a pre-parsed shader module: override constants, resource
//! bindings, helper functions, and entry points, all cross-referenced by
//! name. This crate checks well-formedness ([`Program::validate`]) and answers
//! reflection queries ([`entry_point_metadata`]) for the compilation pipeline.

#![warn(missing_docs)]

pub mod callgraph;
pub mod error;
pub mod expr;
pub mod program;
pub mod reflect;
pub mod resource;
pub mod stmt;
pub mod types;

pub use callgraph::CallGraph;
pub use error::IrError;
pub use expr::{BinaryOp, Builtin, Expr, UnaryOp};
pub use program::{EntryPoint, Function, Override, OverrideId, Program, WorkgroupDim};
pub use reflect::{entry_point_metadata, EntryPointMetadata};
pub use resource::{BindingKind, BindingPoint, BufferBindingType, Resource};
pub use stmt::Stmt;
pub use types::{Literal, ScalarType, ShaderStage};
